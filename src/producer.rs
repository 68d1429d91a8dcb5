//! Frame-acquisition producer loop (spec §4.8, C8; grounded on
//! `original_source/src/nightcam_main.c`'s main grab loop and its
//! `downsample_y` helper).

use crate::detector::Detector;
use crate::error::PipelineError;
use crate::frame_source::FrameSource;
use crate::stacker::StackAverager;
use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Nearest-neighbour downsample of a luma plane by an integer step in each
/// axis (`x_step = src_w/dst_w`, `y_step = src_h/dst_h`). Honours a source
/// stride larger than `src_w`.
pub fn downsample_y(src: &[u8], src_w: usize, src_h: usize, src_stride: usize, dst: &mut [u8], dst_w: usize, dst_h: usize) {
    let x_step = src_w / dst_w;
    let y_step = src_h / dst_h;
    for dy in 0..dst_h {
        let sy = dy * y_step;
        let src_row = &src[sy * src_stride..sy * src_stride + src_w];
        let dst_row = &mut dst[dy * dst_w..(dy + 1) * dst_w];
        for dx in 0..dst_w {
            dst_row[dx] = src_row[dx * x_step];
        }
    }
}

/// Repeatedly pulls frames from `source`, downsamples the luma plane, and
/// feeds both the detector and the stack averager, until `stop` is set.
/// Runs on the caller's thread — `main.rs` spawns this on a dedicated
/// `std::thread` alongside the detector's consumer thread and the stacker's
/// encoder thread.
pub fn run(
    mut source: Box<dyn FrameSource>,
    mut detector: Detector,
    mut stacker: StackAverager,
    detect_width: usize,
    detect_height: usize,
    stop: std::sync::Arc<AtomicBool>,
) {
    let mut detect_buf = vec![0u8; detect_width * detect_height];

    while !stop.load(Ordering::Relaxed) {
        let frame = match source.get_frame() {
            Ok(f) => f,
            Err(PipelineError::FrameAcquisition(msg)) => {
                warn!("producer: frame acquisition failed: {msg}");
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
            Err(e) => {
                warn!("producer: unexpected error acquiring frame: {e}");
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
        };

        downsample_y(
            &frame.y_plane,
            frame.width,
            frame.height,
            frame.y_stride,
            &mut detect_buf,
            detect_width,
            detect_height,
        );
        detector.push_frame(&detect_buf, detect_width, frame.timestamp_ms);
        stacker.on_frame(&frame.y_plane, &frame.uv_plane, frame.timestamp_ms);

        source.release_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downsample_identity_step_one() {
        let src = vec![1u8, 2, 3, 4, 5, 6, 7, 8, 9];
        let mut dst = vec![0u8; 9];
        downsample_y(&src, 3, 3, 3, &mut dst, 3, 3);
        assert_eq!(dst, src);
    }

    #[test]
    fn test_downsample_halves_each_axis() {
        #[rustfmt::skip]
        let src: Vec<u8> = vec![
            1, 2, 3, 4,
            5, 6, 7, 8,
            9, 10, 11, 12,
            13, 14, 15, 16,
        ];
        let mut dst = vec![0u8; 4];
        downsample_y(&src, 4, 4, 4, &mut dst, 2, 2);
        assert_eq!(dst, vec![1, 3, 9, 11]);
    }

    #[test]
    fn test_downsample_honours_padded_stride() {
        let src = vec![1u8, 2, 9, 9, 3, 4, 9, 9];
        let mut dst = vec![0u8; 4];
        downsample_y(&src, 2, 2, 4, &mut dst, 2, 2);
        assert_eq!(dst, vec![1, 2, 3, 4]);
    }
}
