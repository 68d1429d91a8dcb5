//! Frame acquisition boundary (spec §[EXTERNAL]).
//!
//! `FrameSource` is the seam between the pipeline core and whatever camera
//! driver a deployment actually uses (V4L2, a vendor SDK, a test harness).
//! Grounded on the collaborator-trait shape of `hardware/mock.rs`'s
//! `MockCamera`, but synchronous rather than async: the producer loop that
//! drives it runs on a plain `std::thread`, not a tokio task (spec §5).

use crate::error::PipelineResult;

/// One acquired frame: a full-resolution NV12 buffer (Y plane followed by
/// interleaved UV) plus the metadata the pipeline needs to process it.
pub struct Frame {
    pub width: usize,
    pub height: usize,
    /// Row stride of the Y plane in bytes; may exceed `width`.
    pub y_stride: usize,
    pub timestamp_ms: u64,
    /// Y plane, `y_stride * height` bytes.
    pub y_plane: Vec<u8>,
    /// Interleaved UV plane, `y_stride * height / 2` bytes (4:2:0 subsampling).
    pub uv_plane: Vec<u8>,
}

/// A source of full-resolution camera frames.
///
/// Implementations must block in `get_frame` until a frame is available or
/// an error occurs; the producer loop treats `FrameAcquisition` errors as
/// transient and retries after a short backoff.
pub trait FrameSource: Send {
    /// Block until the next frame is available.
    fn get_frame(&mut self) -> PipelineResult<Frame>;

    /// Release any driver-side buffer associated with the most recently
    /// returned frame. Called after both the detector and stacker have
    /// finished consuming it.
    fn release_frame(&mut self);
}

/// A deterministic `FrameSource` for tests: replays a fixed queue of frames,
/// then reports `FrameAcquisition` exhaustion.
pub struct MockFrameSource {
    frames: std::collections::VecDeque<Frame>,
}

impl MockFrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    /// Build `count` blank (all-zero) frames of the given size, spaced
    /// `interval_ms` apart starting at `start_ms`.
    pub fn blank(width: usize, height: usize, count: usize, start_ms: u64, interval_ms: u64) -> Self {
        let frames = (0..count)
            .map(|i| Frame {
                width,
                height,
                y_stride: width,
                timestamp_ms: start_ms + i as u64 * interval_ms,
                y_plane: vec![0u8; width * height],
                uv_plane: vec![128u8; width * height / 2],
            })
            .collect::<Vec<_>>();
        Self::new(frames)
    }
}

impl FrameSource for MockFrameSource {
    fn get_frame(&mut self) -> PipelineResult<Frame> {
        self.frames
            .pop_front()
            .ok_or_else(|| crate::error::PipelineError::FrameAcquisition("mock source exhausted".to_string()))
    }

    fn release_frame(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_source_yields_frames_in_order() {
        let mut src = MockFrameSource::blank(4, 4, 3, 1000, 40);
        assert_eq!(src.get_frame().unwrap().timestamp_ms, 1000);
        assert_eq!(src.get_frame().unwrap().timestamp_ms, 1040);
        assert_eq!(src.get_frame().unwrap().timestamp_ms, 1080);
    }

    #[test]
    fn test_mock_source_errors_when_exhausted() {
        let mut src = MockFrameSource::blank(2, 2, 1, 0, 40);
        src.get_frame().unwrap();
        assert!(src.get_frame().is_err());
    }
}
