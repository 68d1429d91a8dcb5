//! Pipeline configuration.
//!
//! Mirrors the compile-time tuning constants of the original `meteor_config.h`
//! as a runtime-loaded, validated settings struct. Layering follows the
//! `config` crate's usual precedence: built-in defaults, then an optional
//! TOML file, then `METEOR_*` environment variables, then CLI flags applied
//! by the caller last (see `main.rs`).
//!
//! ```toml
//! [detect]
//! width = 640
//! height = 480
//! sigma_k = 5
//!
//! [network]
//! server_ip = "192.168.1.245"
//! server_port = 8765
//! timeout_ms = 5000
//! ```

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// Detection-resolution and temporal-accumulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DetectSettings {
    /// Downsampled plane width fed to the temporal accumulator.
    pub width: u32,
    /// Downsampled plane height fed to the temporal accumulator.
    pub height: u32,
    /// Frames per block (RMS-standard value is 256; changing this breaks
    /// the `u8` frame index used as `maxframe`).
    pub block_frames: u32,
    /// Expected camera frame rate, stored as milli-fps for exact comparison.
    pub fps_milli: u32,
    /// Sigma factor `K`: a pixel is a candidate if
    /// `maxpixel - avgpixel > K * stdpixel`.
    pub sigma_k: u32,
    /// Maximum candidate pixels collected before a block is treated as
    /// saturated.
    pub max_candidates: usize,
    /// Minimum candidates required before running the Hough transform.
    pub min_candidates: usize,
    /// Minimum Hough votes for a peak to be considered a line.
    pub min_votes: u16,
    /// Minimum validated streak length in pixels.
    pub min_length_px: i32,
}

impl Default for DetectSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            block_frames: 256,
            fps_milli: 25_000,
            sigma_k: 5,
            max_candidates: 4096,
            min_candidates: 5,
            min_votes: 10,
            min_length_px: 15,
        }
    }
}

/// Hough accumulator parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HoughSettings {
    /// Angular resolution (number of theta buckets across 180 degrees).
    pub theta_steps: i32,
    /// Rho range is `[-rho_max, +rho_max]`.
    pub rho_max: i32,
    /// Minimum accumulator value to consider a cell a peak.
    pub peak_threshold: u16,
}

impl Default for HoughSettings {
    fn default() -> Self {
        Self {
            theta_steps: 180,
            rho_max: 900,
            peak_threshold: 8,
        }
    }
}

/// N100 receiver connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkSettings {
    /// Receiver IPv4 address.
    pub server_ip: String,
    /// Receiver TCP port.
    pub server_port: u16,
    /// Send/receive socket timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            server_ip: "192.168.1.245".to_string(),
            server_port: 8765,
            timeout_ms: 5000,
        }
    }
}

/// Full-resolution stack averager parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StackSettings {
    /// Seconds of full-resolution frames averaged into one stack.
    pub interval_secs: u32,
    /// JPEG quality passed to the image encoder, 1-100.
    pub jpeg_quality: u8,
    /// Optional path to a dark frame (Y plane then UV plane, raw bytes).
    pub dark_path: Option<String>,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            jpeg_quality: 85,
            dark_path: None,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// RMS station identifier, ASCII, at most 19 bytes.
    pub station_id: String,
    /// Numeric camera identifier embedded in the summary header.
    pub camera_id: u32,
    /// Directory where summary binaries are staged before upload.
    pub ff_tmp_dir: String,
    pub detect: DetectSettings,
    pub hough: HoughSettings,
    pub network: NetworkSettings,
    pub stack: StackSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            station_id: "XX0001".to_string(),
            camera_id: 1,
            ff_tmp_dir: "/tmp/meteor_ff_tmp".to_string(),
            detect: DetectSettings::default(),
            hough: HoughSettings::default(),
            network: NetworkSettings::default(),
            stack: StackSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration by layering defaults, an optional TOML file, and
    /// `METEOR_*` environment variables. `path` may point to a file that
    /// does not exist — that layer is then simply skipped.
    pub fn load(path: Option<&str>) -> PipelineResult<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("METEOR")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Semantic validation beyond what deserialization already guarantees.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.station_id.is_empty() || self.station_id.len() > 19 {
            return Err(PipelineError::Configuration(
                "station_id must be 1-19 ASCII bytes".to_string(),
            ));
        }
        if !self.station_id.is_ascii() {
            return Err(PipelineError::Configuration(
                "station_id must be ASCII".to_string(),
            ));
        }
        if self.detect.width == 0 || self.detect.height == 0 {
            return Err(PipelineError::Configuration(
                "detect.width and detect.height must be nonzero".to_string(),
            ));
        }
        if self.detect.block_frames == 0 || self.detect.block_frames > 256 {
            return Err(PipelineError::Configuration(
                "detect.block_frames must be in 1..=256".to_string(),
            ));
        }
        if self.hough.rho_max <= 0 || self.hough.theta_steps <= 0 {
            return Err(PipelineError::Configuration(
                "hough.rho_max and hough.theta_steps must be positive".to_string(),
            ));
        }
        let diag = ((self.detect.width * self.detect.width
            + self.detect.height * self.detect.height) as f64)
            .sqrt()
            .ceil() as i32;
        if self.hough.rho_max < diag {
            return Err(PipelineError::Configuration(format!(
                "hough.rho_max ({}) must be >= ceil(sqrt(w^2+h^2)) ({diag})",
                self.hough.rho_max
            )));
        }
        if self.stack.jpeg_quality == 0 || self.stack.jpeg_quality > 100 {
            return Err(PipelineError::Configuration(
                "stack.jpeg_quality must be in 1..=100".to_string(),
            ));
        }
        if self.network.server_port == 0 {
            return Err(PipelineError::Configuration(
                "network.server_port must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}
