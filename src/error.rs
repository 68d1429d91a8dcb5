//! Error types for the meteor detection pipeline.
//!
//! This module defines `PipelineError`, the primary error type used throughout
//! the detection core. Using the `thiserror` crate gives each variant a
//! readable message and lets `?` convert from the handful of underlying error
//! sources the pipeline actually touches (I/O, configuration parsing).
//!
//! Per the error-handling design, every variant here is recoverable locally:
//! nothing constructed after `Detector::new`/`StackAverager::new` succeeds is
//! allowed to abort the pipeline. Consumer- and encoder-thread errors are
//! logged at the call site and the loop continues; only construction-time
//! resource exhaustion is fatal.

use thiserror::Error;

/// Convenience alias for results using the pipeline's error type.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Allocation failure at construction time. Fatal — construction returns
    /// `Err` and the caller must not retry with the same parameters.
    #[error("resource exhausted during construction: {0}")]
    ResourceExhausted(String),

    /// Transient failure acquiring a frame from the frame source. The
    /// producer loop backs off and retries; this is never propagated.
    #[error("frame acquisition failed: {0}")]
    FrameAcquisition(String),

    /// A completed block was dropped because the consumer thread was still
    /// processing the previous one. Logged once per occurrence, not retried.
    #[error("consumer busy, block dropped")]
    ConsumerSaturated,

    /// The candidate buffer reached `MAX_CANDIDATES` before the block
    /// finished scanning — treated as "no detection this block".
    #[error("candidate buffer saturated ({0} candidates)")]
    CandidateFlood(usize),

    /// Summary-file write or HTTP POST failure. Logged at warn level; the
    /// pipeline continues with no retry.
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Line-endpoint computation found fewer than two distinct border
    /// intersections (degenerate trig). The candidate peak is skipped.
    #[error("degenerate line geometry, endpoints not found")]
    ProtocolEdge,

    /// Configuration failed to parse or load.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration parsed but failed semantic validation.
    #[error("configuration validation error: {0}")]
    Configuration(String),
}
