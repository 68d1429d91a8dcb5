//! CLI entry point (grounded on `original_source/src/nightcam_main.c`'s
//! `main()` wiring order: config, collaborators, detector/stacker
//! construction, signal handling, producer loop, teardown).
//!
//! The frame source and image encoder are external collaborators (spec
//! §1); this binary wires the pipeline against [`MockFrameSource`] and
//! [`MockEncoder`] so the crate builds and runs standalone. A real
//! deployment links its own `FrameSource`/`ImageEncoder` implementations
//! in place of these.

use clap::Parser;
use log::info;
use meteor_watch::config::PipelineConfig;
use meteor_watch::detector::{Detector, DetectorParams};
use meteor_watch::encoder::MockEncoder;
use meteor_watch::event_pusher::{EventPusher, PushConfig};
use meteor_watch::frame_source::MockFrameSource;
use meteor_watch::motion::MotionCounters;
use meteor_watch::producer;
use meteor_watch::stacker::StackAverager;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Low-power embedded night-sky camera pipeline.
#[derive(Parser, Debug)]
#[command(name = "meteor-watch", version, about)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<String>,

    /// Receiver IPv4 address, overrides the config file.
    #[arg(long)]
    server_ip: Option<String>,

    /// Seconds of full-resolution frames averaged into one stack.
    #[arg(long)]
    stack_secs: Option<u32>,

    /// JPEG quality (1-100) for encoded stacks.
    #[arg(long)]
    jpeg_quality: Option<u8>,

    /// Sigma factor K for candidate thresholding.
    #[arg(long)]
    sigma_k: Option<u32>,

    /// RMS station identifier.
    #[arg(long)]
    station_id: Option<String>,

    /// Staging directory for summary binaries before upload.
    #[arg(long)]
    ff_tmp_dir: Option<String>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Number of synthetic frames to generate before exiting. Only
    /// meaningful while no real `FrameSource` is linked in; a production
    /// build replaces `MockFrameSource` with a hardware-backed source that
    /// runs until the shutdown signal instead.
    #[arg(long, default_value_t = 2560)]
    demo_frames: usize,
}

fn apply_cli_overrides(mut cfg: PipelineConfig, cli: &Cli) -> PipelineConfig {
    if let Some(ip) = &cli.server_ip {
        cfg.network.server_ip = ip.clone();
    }
    if let Some(secs) = cli.stack_secs {
        cfg.stack.interval_secs = secs;
    }
    if let Some(q) = cli.jpeg_quality {
        cfg.stack.jpeg_quality = q;
    }
    if let Some(k) = cli.sigma_k {
        cfg.detect.sigma_k = k;
    }
    if let Some(id) = &cli.station_id {
        cfg.station_id = id.clone();
    }
    if let Some(dir) = &cli.ff_tmp_dir {
        cfg.ff_tmp_dir = dir.clone();
    }
    cfg
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let cfg = PipelineConfig::load(cli.config.as_deref())?;
    let cfg = apply_cli_overrides(cfg, &cli);
    cfg.validate()?;

    info!(
        "meteor-watch starting: station={} camera={} receiver={}:{}",
        cfg.station_id, cfg.camera_id, cfg.network.server_ip, cfg.network.server_port
    );

    let pusher = Arc::new(EventPusher::new(PushConfig {
        server_ip: cfg.network.server_ip.clone(),
        server_port: cfg.network.server_port,
        timeout: Duration::from_millis(cfg.network.timeout_ms),
    }));

    let detector_params = DetectorParams {
        width: cfg.detect.width as i32,
        height: cfg.detect.height as i32,
        sigma_k: cfg.detect.sigma_k,
        max_candidates: cfg.detect.max_candidates,
        min_candidates: cfg.detect.min_candidates,
        min_votes: cfg.detect.min_votes,
        min_length_px: cfg.detect.min_length_px,
        peak_threshold: cfg.hough.peak_threshold,
        station_id: cfg.station_id.clone(),
        camera_id: cfg.camera_id,
        fps_milli: cfg.detect.fps_milli,
        ff_tmp_dir: cfg.ff_tmp_dir.clone(),
    };
    let detector = Detector::new(detector_params, Arc::clone(&pusher))?;

    let motion = Arc::new(MotionCounters::new());
    let fps = cfg.detect.fps_milli as f64 / 1000.0;
    let frames_per_stack = (cfg.stack.interval_secs as f64 * fps).round() as u32;
    let stacker = StackAverager::new(
        1920,
        1080,
        frames_per_stack.max(1),
        cfg.stack.jpeg_quality,
        cfg.stack.dark_path.as_deref(),
        cfg.station_id.clone(),
        Arc::clone(&motion),
        Arc::clone(&pusher),
        Box::new(MockEncoder::new()),
    )?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        info!("meteor-watch: shutdown signal received");
        stop_for_handler.store(true, std::sync::atomic::Ordering::SeqCst);
    })?;

    let source: Box<dyn meteor_watch::frame_source::FrameSource> =
        Box::new(MockFrameSource::blank(1920, 1080, cli.demo_frames, 0, (1000.0 / fps) as u64));

    producer::run(
        source,
        detector,
        stacker,
        cfg.detect.width as usize,
        cfg.detect.height as usize,
        stop,
    );

    info!("meteor-watch: shutdown complete");
    Ok(())
}
