//! Image encoding boundary for the full-resolution stack averager (spec
//! §[EXTERNAL]). Grounded on `original_source/src/stacker.c`'s libjpeg
//! encode call, abstracted behind a trait so the pipeline core doesn't
//! depend on a concrete JPEG crate.

use crate::error::PipelineResult;

/// Encodes an RGB image into a compressed byte buffer.
pub trait ImageEncoder: Send {
    /// Encode `width x height` interleaved RGB rows (`3 * width * height`
    /// bytes, no padding) at the given quality (1-100), returning the
    /// encoded file bytes.
    fn encode_rgb(&mut self, rgb: &[u8], width: usize, height: usize, quality: u8) -> PipelineResult<Vec<u8>>;
}

/// A deterministic encoder for tests: "encodes" by prepending a small fixed
/// header to the raw RGB bytes so callers can assert on shape without a real
/// JPEG codec.
pub struct MockEncoder {
    pub calls: usize,
}

impl MockEncoder {
    pub fn new() -> Self {
        Self { calls: 0 }
    }
}

impl Default for MockEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageEncoder for MockEncoder {
    fn encode_rgb(&mut self, rgb: &[u8], width: usize, height: usize, quality: u8) -> PipelineResult<Vec<u8>> {
        self.calls += 1;
        let mut out = Vec::with_capacity(rgb.len() + 8);
        out.extend_from_slice(b"MOCKJPG");
        out.push(quality);
        out.extend_from_slice(&(width as u32).to_le_bytes());
        out.extend_from_slice(&(height as u32).to_le_bytes());
        out.extend_from_slice(rgb);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_encoder_counts_calls_and_embeds_dims() {
        let mut enc = MockEncoder::new();
        let rgb = vec![0u8; 3 * 4 * 4];
        let out = enc.encode_rgb(&rgb, 4, 4, 85).unwrap();
        assert_eq!(enc.calls, 1);
        assert!(out.starts_with(b"MOCKJPG"));
    }
}
