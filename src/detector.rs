//! Detection orchestrator (spec §4.3, C3; grounded on
//! `original_source/src/detector.c`'s `process_block`/`proc_thread_func`/
//! `detector_push_frame`).
//!
//! The original keeps two fixed block slots and an index-valued `pending`,
//! relying on timing for mutual exclusion between the producer and the
//! processing thread. Rust can't accept that on faith: ownership of each
//! `TemporalBlock` is moved between two single-slot mailboxes (`pending`,
//! handed to the consumer; `spare`, handed back once reset) so the type
//! system — not scheduling luck — guarantees only one side ever touches a
//! block at a time. This is the "exactly one of {producer, consumer, empty}
//! owns each block" encoding its design notes call for.

use crate::block::TemporalBlock;
use crate::error::{PipelineError, PipelineResult};
use crate::event_pusher::EventPusher;
use crate::hough::HoughAccumulator;
use crate::summary::{SummaryHeader, SummaryPlanes, SummaryWriter};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// Maximum Hough peaks examined per block before giving up on finding a
/// validated detection.
const MAX_LINES: usize = 16;

/// Tuning knobs for candidate extraction and line validation.
#[derive(Debug, Clone)]
pub struct DetectorParams {
    pub width: i32,
    pub height: i32,
    pub sigma_k: u32,
    pub max_candidates: usize,
    pub min_candidates: usize,
    pub min_votes: u16,
    pub min_length_px: i32,
    pub peak_threshold: u16,
    pub station_id: String,
    pub camera_id: u32,
    pub fps_milli: u32,
    pub ff_tmp_dir: String,
}

struct HandoffState {
    /// A filled block awaiting the consumer, plus the timestamp of the
    /// frame that completed it.
    pending: Option<(TemporalBlock, u64)>,
    /// An emptied block returned by the consumer, available for the
    /// producer's next swap.
    spare: Option<TemporalBlock>,
    running: bool,
}

struct Handoff {
    lock: Mutex<HandoffState>,
    cv: Condvar,
}

/// Owns the producer-side active block and the consumer thread; exposes
/// `push_frame` as the sole producer-facing API.
pub struct Detector {
    active: TemporalBlock,
    handoff: Arc<Handoff>,
    blocks_dropped: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl Detector {
    pub fn new(params: DetectorParams, pusher: Arc<EventPusher>) -> PipelineResult<Self> {
        let a = TemporalBlock::new(params.width as usize, params.height as usize);
        let b = TemporalBlock::new(params.width as usize, params.height as usize);

        let handoff = Arc::new(Handoff {
            lock: Mutex::new(HandoffState {
                pending: None,
                spare: Some(b),
                running: true,
            }),
            cv: Condvar::new(),
        });
        let blocks_dropped = Arc::new(AtomicU64::new(0));

        std::fs::create_dir_all(&params.ff_tmp_dir)
            .map_err(|e| PipelineError::ResourceExhausted(format!("could not create ff_tmp_dir: {e}")))?;

        let thread_handoff = Arc::clone(&handoff);
        let thread = std::thread::spawn(move || {
            consumer_loop(thread_handoff, params, pusher);
        });

        Ok(Self {
            active: a,
            handoff,
            blocks_dropped,
            thread: Some(thread),
        })
    }

    /// Number of blocks dropped so far because the consumer was still busy.
    pub fn blocks_dropped(&self) -> u64 {
        self.blocks_dropped.load(Ordering::Relaxed)
    }

    /// Feed one downsampled luma frame to the accumulator (producer-side,
    /// non-blocking).
    pub fn push_frame(&mut self, luma: &[u8], stride: usize, timestamp_ms: u64) {
        if self.active.frame_count() == 0 {
            self.active.reset(timestamp_ms);
        }
        self.active.update(luma, stride, self.active.frame_count() as u8);

        if self.active.frame_count() != 256 {
            return;
        }

        let mut state = self.handoff.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(replacement) = state.spare.take() {
            let filled = std::mem::replace(&mut self.active, replacement);
            state.pending = Some((filled, timestamp_ms));
            self.handoff.cv.notify_one();
        } else {
            warn!("detector: processing thread busy, dropping block");
            self.blocks_dropped.fetch_add(1, Ordering::Relaxed);
            self.active.reset(0);
        }
    }
}

impl Drop for Detector {
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

fn consumer_loop(handoff: Arc<Handoff>, params: DetectorParams, pusher: Arc<EventPusher>) {
    let mut hough = HoughAccumulator::new(params.width, params.height);
    let plane_len = (params.width * params.height) as usize;
    let mut maxpixel = vec![0u8; plane_len];
    let mut maxframe = vec![0u8; plane_len];
    let mut avgpixel = vec![0u8; plane_len];
    let mut stdpixel = vec![0u8; plane_len];
    let mut candidates: Vec<(i32, i32)> = Vec::with_capacity(params.max_candidates);

    loop {
        let (mut block, block_end_ms) = {
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

        block.finalize(&mut maxpixel, &mut maxframe, &mut avgpixel, &mut stdpixel);

        candidates.clear();
        for i in 0..plane_len {
            let diff = maxpixel[i] as i32 - avgpixel[i] as i32;
            if diff > 0 && (diff as u32) > params.sigma_k * stdpixel[i] as u32 {
                candidates.push(((i % params.width as usize) as i32, (i / params.width as usize) as i32));
                if candidates.len() >= params.max_candidates {
                    break;
                }
            }
        }

        debug!("detector: block {} - {} candidates", block.block_index(), candidates.len());

        if candidates.len() >= params.max_candidates {
            debug!("detector: block saturated - skipping (raise sigma_k)");
            return_and_reset(&handoff, block);
            continue;
        }
        if candidates.len() < params.min_candidates {
            return_and_reset(&handoff, block);
            continue;
        }

        hough.reset();
        for &(x, y) in &candidates {
            hough.vote(x, y);
        }
        let peaks = hough.find_peaks(params.peak_threshold, MAX_LINES);
        debug!("detector: {} Hough peaks", peaks.len());

        for peak in &peaks {
            if peak.votes < params.min_votes {
                continue;
            }
            let length = peak.length_px();
            if length < params.min_length_px {
                continue;
            }

            info!(
                "detector: meteor candidate rho={} theta={} votes={} len={}px",
                peak.rho, peak.theta_deg, peak.votes, length
            );

            let header = SummaryHeader {
                station_id: params.station_id.clone(),
                width: params.width as u32,
                height: params.height as u32,
                camera_id: params.camera_id,
                fps_milli: params.fps_milli,
                block_start_ms: block.block_start_ms(),
            };
            let planes = SummaryPlanes {
                maxpixel: &maxpixel,
                maxframe: &maxframe,
                avgpixel: &avgpixel,
                stdpixel: &stdpixel,
            };

            let path = match SummaryWriter::write_to_dir(&params.ff_tmp_dir, &header, &planes) {
                Ok(p) => p,
                Err(e) => {
                    warn!("detector: ff_write failed: {e}");
                    continue;
                }
            };
            let basename = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

            let json = format!(
                "{{\"camera_id\":\"{}\",\"type\":\"meteor\",\"timestamp_ms\":{},\"block_start_ms\":{},\
                  \"candidate\":{{\"rho\":{},\"theta\":{},\"x1\":{},\"y1\":{},\"x2\":{},\"y2\":{},\"length_px\":{},\"votes\":{}}}}}",
                params.station_id,
                block_end_ms,
                block.block_start_ms(),
                peak.rho,
                peak.theta_deg,
                peak.x1,
                peak.y1,
                peak.x2,
                peak.y2,
                length,
                peak.votes,
            );
            if !pusher.post_json("/event", &json) {
                warn!("detector: event_push_json failed");
            }
            if !pusher.post_file("/ff", "application/octet-stream", &path, &basename) {
                warn!("detector: event_push_ff failed");
            }
            let _ = std::fs::remove_file(&path);
            break; // one detection per block
        }

        return_and_reset(&handoff, block);
    }
}

fn return_and_reset(handoff: &Handoff, mut block: TemporalBlock) {
    block.reset(0);
    let mut state = handoff.lock.lock().unwrap_or_else(|e| e.into_inner());
    state.spare = Some(block);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_pusher::PushConfig;
    use std::time::Duration;

    fn test_params(w: i32, h: i32, dir: &std::path::Path) -> DetectorParams {
        DetectorParams {
            width: w,
            height: h,
            sigma_k: 5,
            max_candidates: 4096,
            min_candidates: 5,
            min_votes: 10,
            min_length_px: 15,
            peak_threshold: 8,
            station_id: "XX0001".to_string(),
            camera_id: 1,
            fps_milli: 25_000,
            ff_tmp_dir: dir.to_string_lossy().to_string(),
        }
    }

    fn test_pusher() -> Arc<EventPusher> {
        Arc::new(EventPusher::new(PushConfig {
            server_ip: "127.0.0.1".to_string(),
            server_port: 1,
            timeout: Duration::from_millis(50),
        }))
    }

    #[test]
    fn test_empty_sky_emits_no_detection_and_clears_staging_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut det = Detector::new(test_params(640, 480, dir.path()), test_pusher()).unwrap();

        let frame = vec![16u8; 640 * 480];
        for f in 0..256u32 {
            det.push_frame(&frame, 640, 1000 + f as u64 * 40);
        }
        drop(det); // joins the consumer thread, guaranteeing processing finished

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(entries.is_empty());
    }

    /// Accepts two connections on a loopback listener (the `/event` POST
    /// then the `/ff` POST the detector sends for one validated
    /// detection) and hands back each request's header block and body so
    /// the test can assert on the detection actually reported, not just on
    /// the staging directory being swept afterward.
    fn spawn_recording_server() -> (u16, std::thread::JoinHandle<Vec<(String, Vec<u8>)>>) {
        use std::io::{BufRead, Read};
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            let mut received = Vec::new();
            for _ in 0..2 {
                let (stream, _) = match listener.accept() {
                    Ok(s) => s,
                    Err(_) => break,
                };
                let mut reader = std::io::BufReader::new(stream);
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
                    break;
                }
                let mut headers = String::new();
                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if line == "\r\n" {
                        break;
                    }
                    if let Some(v) = line.strip_prefix("Content-Length: ") {
                        content_length = v.trim().parse().unwrap_or(0);
                    }
                    headers.push_str(&line);
                }
                let mut body = vec![0u8; content_length];
                reader.read_exact(&mut body).unwrap();
                received.push((request_line + &headers, body));
            }
            received
        });
        (port, handle)
    }

    #[test]
    fn test_straight_streak_emits_one_detection() {
        let dir = tempfile::tempdir().unwrap();
        let (port, server) = spawn_recording_server();
        let pusher = Arc::new(EventPusher::new(PushConfig {
            server_ip: "127.0.0.1".to_string(),
            server_port: port,
            timeout: Duration::from_secs(2),
        }));
        let mut det = Detector::new(test_params(640, 480, dir.path()), pusher).unwrap();

        let black = vec![0u8; 640 * 480];
        for f in 0..255u32 {
            det.push_frame(&black, 640, 1000 + f as u64 * 40);
        }

        let mut streak = black.clone();
        for k in 0..30i32 {
            let (x, y) = (100 + k, 100 + k);
            streak[(y * 640 + x) as usize] = 255;
        }
        det.push_frame(&streak, 640, 1000 + 255 * 40);
        drop(det); // joins the consumer thread, guaranteeing the POSTs were sent

        let received = server.join().unwrap();
        assert_eq!(received.len(), 2, "expected one /event POST and one /ff POST");

        let (event_headers, event_body) = &received[0];
        assert!(event_headers.starts_with("POST /event HTTP/1.0\r\n"));
        let event_json = String::from_utf8(event_body.clone()).unwrap();
        assert!(event_json.contains("\"type\":\"meteor\""));
        assert!(event_json.contains("\"length_px\":"));

        let (ff_headers, ff_body) = &received[1];
        assert!(ff_headers.starts_with("POST /ff HTTP/1.0\r\n"));
        assert!(ff_headers.contains("X-Filename: F_XX0001_"));
        assert!(!ff_body.is_empty());

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(entries.is_empty(), "summary file must be unlinked after upload");
    }

    /// No injected streak: uniform-noise frames around a fixed background
    /// must not produce a detection. Uses a small fixed-seed xorshift
    /// generator rather than a dependency so the test is reproducible
    /// without pulling in a randomness crate.
    #[test]
    fn test_pure_noise_produces_no_detection() {
        struct Xorshift(u32);
        impl Xorshift {
            fn next_u8(&mut self) -> u8 {
                self.0 ^= self.0 << 13;
                self.0 ^= self.0 >> 17;
                self.0 ^= self.0 << 5;
                (self.0 & 0x0F) as u8 + 10 // low-amplitude noise around 10..25
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let mut det = Detector::new(test_params(64, 64, dir.path()), test_pusher()).unwrap();
        let mut rng = Xorshift(0x1234_5678);

        for f in 0..256u32 {
            let frame: Vec<u8> = (0..64 * 64).map(|_| rng.next_u8()).collect();
            det.push_frame(&frame, 64, 1000 + f as u64 * 40);
        }
        drop(det);

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(entries.is_empty(), "pure noise must not leave a staged detection");
    }

    #[test]
    fn test_flood_produces_no_detection() {
        let dir = tempfile::tempdir().unwrap();
        let mut det = Detector::new(test_params(64, 64, dir.path()), test_pusher()).unwrap();

        let mut frame = vec![16u8; 64 * 64];
        for f in 0..255u32 {
            det.push_frame(&frame, 64, 1000 + f as u64 * 40);
        }
        frame.iter_mut().for_each(|v| *v = 255);
        det.push_frame(&frame, 64, 1000 + 255 * 40);
        drop(det);

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_blocks_dropped_counter_increments_under_backpressure() {
        let dir = tempfile::tempdir().unwrap();
        let mut det = Detector::new(test_params(32, 32, dir.path()), test_pusher()).unwrap();
        let frame = vec![16u8; 32 * 32];

        // Fill enough blocks back-to-back that the consumer can plausibly
        // fall behind at least once; the counter must never decrease and
        // must remain consistent with successful processing continuing.
        for f in 0..256u32 * 4 {
            det.push_frame(&frame, 32, 1000 + f as u64);
        }
        let dropped_before = det.blocks_dropped();
        drop(det);
        assert!(dropped_before <= 3);
    }
}
