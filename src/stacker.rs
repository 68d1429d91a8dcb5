//! Full-resolution stack averager (spec §4.4, C4; grounded on
//! `original_source/src/stacker.c`). Shares the producer thread with the
//! detector but owns its own encode thread and handoff rendezvous, mirroring
//! the detector's double-buffer / condvar design (spec §5, §9) rather than
//! the detector's own types directly — the two components hand off
//! different shapes of data (averaged NV12 planes vs. `TemporalBlock`s) but
//! the same backpressure policy: drop, don't queue.

use crate::encoder::ImageEncoder;
use crate::error::PipelineResult;
use crate::event_pusher::EventPusher;
use crate::motion::{MotionCounters, MotionSnapshot};
use chrono::{DateTime, Datelike, Timelike, Utc};
use log::{info, warn};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

fn clamp8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Y plane followed by a half-height interleaved UV plane, both read-only
/// after load.
struct DarkFrame {
    y: Vec<u8>,
    uv: Vec<u8>,
}

impl DarkFrame {
    fn load(path: &str, width: usize, height: usize) -> Option<Self> {
        let y_sz = width * height;
        let uv_sz = width * (height / 2);
        let bytes = std::fs::read(path).ok()?;
        if bytes.len() != y_sz + uv_sz {
            warn!(
                "stacker: dark frame {path} is {} bytes (expected {}) - skipping",
                bytes.len(),
                y_sz + uv_sz
            );
            return None;
        }
        Some(Self {
            y: bytes[..y_sz].to_vec(),
            uv: bytes[y_sz..].to_vec(),
        })
    }
}

/// Averaged NV12 planes plus the metadata handed to the encode thread.
struct PendingStack {
    y_avg: Vec<u8>,
    uv_avg: Vec<u8>,
    timestamp_ms: u64,
    motion: MotionSnapshot,
    stack_index: u32,
}

struct HandoffState {
    pending: Option<PendingStack>,
    running: bool,
}

struct Handoff {
    lock: Mutex<HandoffState>,
    cv: Condvar,
}

/// Accumulates full-resolution NV12 frames and averages every
/// `frames_per_stack` of them into one image for the encode thread.
pub struct StackAverager {
    width: usize,
    height: usize,
    frames_per_stack: u32,
    y_acc: Vec<u32>,
    uv_acc: Vec<u32>,
    frame_count: u32,
    dark: Option<DarkFrame>,
    stack_index: u32,
    motion: Arc<MotionCounters>,
    handoff: Arc<Handoff>,
    thread: Option<JoinHandle<()>>,
}

impl StackAverager {
    /// Construct and start the encode thread. `station_id` is embedded in
    /// the stack filename and the companion JSON event.
    pub fn new(
        width: usize,
        height: usize,
        frames_per_stack: u32,
        jpeg_quality: u8,
        dark_path: Option<&str>,
        station_id: String,
        motion: Arc<MotionCounters>,
        pusher: Arc<EventPusher>,
        mut encoder: Box<dyn ImageEncoder>,
    ) -> PipelineResult<Self> {
        let y_sz = width * height;
        let uv_sz = width * (height / 2);
        let dark = dark_path.and_then(|p| DarkFrame::load(p, width, height));
        if dark.is_some() {
            info!("stacker: dark frame loaded from {:?}", dark_path);
        } else {
            info!("stacker: no dark frame configured");
        }

        let handoff = Arc::new(Handoff {
            lock: Mutex::new(HandoffState {
                pending: None,
                running: true,
            }),
            cv: Condvar::new(),
        });

        let thread_handoff = Arc::clone(&handoff);
        let thread = std::thread::spawn(move || {
            encode_loop(thread_handoff, pusher, encoder.as_mut(), station_id, jpeg_quality, width, height);
        });

        Ok(Self {
            width,
            height,
            frames_per_stack,
            y_acc: vec![0u32; y_sz],
            uv_acc: vec![0u32; uv_sz],
            frame_count: 0,
            dark,
            stack_index: 0,
            motion,
            handoff,
            thread: Some(thread),
        })
    }

    /// Accumulate one NV12 frame (producer-side; non-blocking). `y` is the
    /// luma plane (`width*height` bytes) and `uv` the interleaved chroma
    /// plane (`width*height/2` bytes); callers pass the frame's own planes
    /// directly so no per-frame concatenation buffer is needed.
    pub fn on_frame(&mut self, y: &[u8], uv: &[u8], timestamp_ms: u64) {
        for (acc, &v) in self.y_acc.iter_mut().zip(y.iter()) {
            *acc += v as u32;
        }
        for (acc, &v) in self.uv_acc.iter_mut().zip(uv.iter()) {
            *acc += v as u32;
        }

        self.frame_count += 1;
        if self.frame_count < self.frames_per_stack {
            return;
        }

        let n = self.frame_count;
        let mut y_avg: Vec<u8> = self.y_acc.iter().map(|&s| (s / n) as u8).collect();
        let mut uv_avg: Vec<u8> = self.uv_acc.iter().map(|&s| (s / n) as u8).collect();

        self.y_acc.iter_mut().for_each(|v| *v = 0);
        self.uv_acc.iter_mut().for_each(|v| *v = 0);
        self.frame_count = 0;

        if let Some(dark) = &self.dark {
            for (p, &d) in y_avg.iter_mut().zip(dark.y.iter()) {
                *p = p.saturating_sub(d);
            }
            for (p, &d) in uv_avg.iter_mut().zip(dark.uv.iter()) {
                *p = clamp8(*p as i32 - d as i32 + 128);
            }
        }

        let mut state = self.handoff.lock.lock().unwrap_or_else(|e| e.into_inner());
        if state.pending.is_some() {
            warn!("stacker: encode busy, dropping stack {}", self.stack_index);
            return;
        }
        let motion = self.motion.snapshot_and_reset();
        self.stack_index += 1;
        state.pending = Some(PendingStack {
            y_avg,
            uv_avg,
            timestamp_ms,
            motion,
            stack_index: self.stack_index,
        });
        self.handoff.cv.notify_one();
    }
}

impl Drop for StackAverager {
    fn drop(&mut self) {
        {
            let mut state = self.handoff.lock.lock().unwrap_or_else(|e| e.into_inner());
            state.running = false;
        }
        self.handoff.cv.notify_all();
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

fn encode_loop(
    handoff: Arc<Handoff>,
    pusher: Arc<EventPusher>,
    encoder: &mut dyn ImageEncoder,
    station_id: String,
    jpeg_quality: u8,
    width: usize,
    height: usize,
) {
    loop {
        let stack = {
            let mut state = handoff.lock.lock().unwrap_or_else(|e| e.into_inner());
            loop {
                if state.pending.is_some() {
                    break;
                }
                if !state.running {
                    return;
                }
                state = handoff.cv.wait(state).unwrap_or_else(|e| e.into_inner());
            }
            state.pending.take().expect("checked Some above")
        };

        let rgb = nv12_to_rgb(&stack.y_avg, &stack.uv_avg, width, height);
        let encoded = match encoder.encode_rgb(&rgb, width, height, jpeg_quality) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("stacker: JPEG encode failed: {e}");
                continue;
            }
        };

        let filename = stack_filename(&station_id, stack.timestamp_ms);
        if !pusher.post_bytes("/stack", "image/jpeg", &encoded, &filename) {
            warn!("stacker: push /stack failed for {filename}");
        } else {
            info!("stacker: pushed {filename}");
        }

        let json = format!(
            "{{\"camera_id\":\"{}\",\"type\":\"stack\",\"timestamp_ms\":{},\"filename\":\"{}\",\"ivs_polls\":{},\"ivs_active_polls\":{},\"ivs_total_rois\":{},\"ivs_last_rois\":{}}}",
            station_id,
            stack.timestamp_ms,
            filename,
            stack.motion.polls,
            stack.motion.active_polls,
            stack.motion.total_rois,
            stack.motion.last_rois,
        );
        if !pusher.post_json("/event", &json) {
            warn!("stacker: push /event failed for stack {}", stack.stack_index);
        }
    }
}

/// Fixed-point NV12 -> interleaved RGB conversion, matching the spec's
/// exact coefficients (`R = y + (v*1436>>10)`, `G = y - (u*352+v*731)>>10`,
/// `B = y + (u*1815>>10)`), scanline by scanline.
fn nv12_to_rgb(y_plane: &[u8], uv_plane: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut rgb = vec![0u8; width * height * 3];
    for row in 0..height {
        for col in 0..width {
            let yi = row * width + col;
            let uvi = (row / 2) * width + (col & !1);
            let yv = y_plane[yi] as i32;
            let u = uv_plane[uvi] as i32 - 128;
            let v = uv_plane[uvi + 1] as i32 - 128;

            let r = clamp8(yv + ((v * 1436) >> 10));
            let g = clamp8(yv - ((u * 352 + v * 731) >> 10));
            let b = clamp8(yv + ((u * 1815) >> 10));

            let o = yi * 3;
            rgb[o] = r;
            rgb[o + 1] = g;
            rgb[o + 2] = b;
        }
    }
    rgb
}

fn stack_filename(station_id: &str, timestamp_ms: u64) -> String {
    let dt: DateTime<Utc> = DateTime::from_timestamp_millis(timestamp_ms as i64).unwrap_or_else(Utc::now);
    format!(
        "STACK_{}_{:04}{:02}{:02}_{:02}{:02}{:02}_{:03}.jpg",
        station_id,
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        dt.timestamp_subsec_millis(),
    )
}
