//! Binary summary file serialization (spec §4.5; grounded on
//! `original_source/include/meteor/ff_writer.h` and `src/ff_writer.c`).
//!
//! The format is bit-exact: little-endian, packed, no padding, matching an
//! established downstream reduction format so the summary file can be
//! consumed without a pipeline-specific reader.

use crate::error::PipelineResult;
use chrono::{DateTime, Datelike, Timelike, Utc};

/// Fixed fields carried in every summary file, independent of the block's
/// pixel planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryHeader {
    pub station_id: String,
    pub width: u32,
    pub height: u32,
    pub camera_id: u32,
    pub fps_milli: u32,
    pub block_start_ms: u64,
}

/// The four finalized summary planes for one block.
pub struct SummaryPlanes<'a> {
    pub maxpixel: &'a [u8],
    pub maxframe: &'a [u8],
    pub avgpixel: &'a [u8],
    pub stdpixel: &'a [u8],
}

const NFRAMES: u32 = 256;
const FIRST: u32 = 0;
const DECIMATION: u32 = 1;
const INTERLEAVE: u32 = 0;

/// Serializes a header and its planes to the exact byte layout of §4.5, and
/// names the file canonically.
pub struct SummaryWriter;

impl SummaryWriter {
    /// Build the packed byte buffer: 36-byte fixed header followed by the
    /// four `height*width` planes in max/maxframe/avg/std order.
    pub fn serialize(header: &SummaryHeader, planes: &SummaryPlanes) -> Vec<u8> {
        let plane_len = (header.width * header.height) as usize;
        let mut buf = Vec::with_capacity(36 + 4 * plane_len);

        buf.extend_from_slice(&(-1i32).to_le_bytes());
        buf.extend_from_slice(&header.height.to_le_bytes());
        buf.extend_from_slice(&header.width.to_le_bytes());
        buf.extend_from_slice(&NFRAMES.to_le_bytes());
        buf.extend_from_slice(&FIRST.to_le_bytes());
        buf.extend_from_slice(&header.camera_id.to_le_bytes());
        buf.extend_from_slice(&DECIMATION.to_le_bytes());
        buf.extend_from_slice(&INTERLEAVE.to_le_bytes());
        buf.extend_from_slice(&header.fps_milli.to_le_bytes());

        buf.extend_from_slice(planes.maxpixel);
        buf.extend_from_slice(planes.maxframe);
        buf.extend_from_slice(planes.avgpixel);
        buf.extend_from_slice(planes.stdpixel);

        buf
    }

    /// Write the serialized summary to `dir`, returning the full path of the
    /// written file. The filename is canonical: `F_<station>_<YYYYMMDD>_<HHMMSS>_<mmm>_000000.bin`.
    pub fn write_to_dir(dir: &str, header: &SummaryHeader, planes: &SummaryPlanes) -> PipelineResult<std::path::PathBuf> {
        std::fs::create_dir_all(dir)?;
        let bytes = Self::serialize(header, planes);
        let path = std::path::Path::new(dir).join(canonical_filename(header));
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

/// Canonical filename for a summary file, derived from the block's
/// millisecond timestamp decomposed as UTC.
pub fn canonical_filename(header: &SummaryHeader) -> String {
    let dt: DateTime<Utc> = DateTime::from_timestamp_millis(header.block_start_ms as i64).unwrap_or_else(|| Utc::now());
    format!(
        "F_{}_{:04}{:02}{:02}_{:02}{:02}{:02}_{:03}_000000.bin",
        header.station_id,
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        dt.timestamp_subsec_millis(),
    )
}
