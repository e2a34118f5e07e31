//! Frame compression
//!
//! The send worker hands every captured BGRX image to a [`FrameCompressor`].
//! One compressor instance is shared by all sessions of a process.

use crate::config::JpegSettings;
use common::{Error, Result};
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Bytes per BGRX pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// A borrowed captured image, rows `row_pitch` bytes apart
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub row_pitch: u32,
    pub height: u32,
}

impl FrameView<'_> {
    /// Tightly packed pixel rows, copying only when rows are padded
    fn packed(&self) -> Cow<'_, [u8]> {
        let row_len = self.width as usize * BYTES_PER_PIXEL;
        let pitch = self.row_pitch as usize;
        let height = self.height as usize;

        if pitch == row_len {
            return Cow::Borrowed(&self.pixels[..row_len * height]);
        }

        let mut packed = Vec::with_capacity(row_len * height);
        for row in self.pixels.chunks(pitch).take(height) {
            packed.extend_from_slice(&row[..row_len]);
        }
        Cow::Owned(packed)
    }
}

/// Image compressor used by the send worker
pub trait FrameCompressor: Send + Sync {
    /// Compress `frame` into `out`, replacing its contents
    fn compress(&self, frame: &FrameView<'_>, out: &mut Vec<u8>) -> Result<()>;
}

/// Chroma subsampling of the encoded stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChromaSubsampling {
    #[serde(rename = "444")]
    Yuv444,
    #[serde(rename = "422")]
    Yuv422,
    #[default]
    #[serde(rename = "420")]
    Yuv420,
}

impl ChromaSubsampling {
    fn sampling_factor(self) -> SamplingFactor {
        match self {
            ChromaSubsampling::Yuv444 => SamplingFactor::R_4_4_4,
            ChromaSubsampling::Yuv422 => SamplingFactor::R_4_2_2,
            ChromaSubsampling::Yuv420 => SamplingFactor::R_4_2_0,
        }
    }
}

/// Baseline JPEG encoder for BGRX frames
#[derive(Debug, Clone)]
pub struct JpegCompressor {
    quality: u8,
    subsampling: ChromaSubsampling,
}

impl JpegCompressor {
    pub fn new(settings: &JpegSettings) -> Self {
        Self {
            quality: settings.quality.clamp(1, 100),
            subsampling: settings.subsampling,
        }
    }
}

impl Default for JpegCompressor {
    fn default() -> Self {
        Self::new(&JpegSettings::default())
    }
}

impl FrameCompressor for JpegCompressor {
    fn compress(&self, frame: &FrameView<'_>, out: &mut Vec<u8>) -> Result<()> {
        let (Ok(width), Ok(height)) = (u16::try_from(frame.width), u16::try_from(frame.height))
        else {
            return Err(Error::Compression(format!(
                "{}x{} exceeds the JPEG size limit of {}x{}",
                frame.width,
                frame.height,
                u16::MAX,
                u16::MAX
            )));
        };

        out.clear();
        let mut encoder = Encoder::new(&mut *out, self.quality);
        encoder.set_sampling_factor(self.subsampling.sampling_factor());
        encoder
            .encode(&frame.packed(), width, height, ColorType::Bgra)
            .map_err(|e| Error::Compression(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::create_mock_pixels;

    const SOI: [u8; 2] = [0xFF, 0xD8];
    const EOI: [u8; 2] = [0xFF, 0xD9];

    #[test]
    fn test_compress_packed_frame() {
        let pixels = create_mock_pixels(32, 16);
        let frame = FrameView {
            pixels: &pixels,
            width: 32,
            row_pitch: 32 * 4,
            height: 16,
        };

        let mut out = Vec::new();
        JpegCompressor::default().compress(&frame, &mut out).unwrap();
        assert_eq!(out[..2], SOI);
        assert_eq!(out[out.len() - 2..], EOI);
    }

    #[test]
    fn test_compress_padded_rows() {
        // 10 px wide, rows padded to 64 bytes
        let packed = create_mock_pixels(10, 4);
        let mut padded = vec![0xEE; 64 * 4];
        for (row, src) in packed.chunks(40).enumerate() {
            padded[row * 64..row * 64 + 40].copy_from_slice(src);
        }

        let view = FrameView {
            pixels: &padded,
            width: 10,
            row_pitch: 64,
            height: 4,
        };
        assert_eq!(view.packed().as_ref(), packed.as_slice());

        let mut out = vec![1, 2, 3];
        JpegCompressor::default().compress(&view, &mut out).unwrap();
        assert_eq!(out[..2], SOI);
    }

    #[test]
    fn test_oversized_dimensions_rejected() {
        let pixels = [0u8; 4];
        let frame = FrameView {
            pixels: &pixels,
            width: 70_000,
            row_pitch: 280_000,
            height: 1,
        };
        let err = JpegCompressor::default()
            .compress(&frame, &mut Vec::new())
            .unwrap_err();
        assert_eq!(err.code(), common::error::COMPRESSION_CODE);
    }

    #[test]
    fn test_subsampling_serde_names() {
        let settings: JpegSettings = toml::from_str("quality = 80\nsubsampling = \"444\"").unwrap();
        assert_eq!(settings.subsampling, ChromaSubsampling::Yuv444);
        assert_eq!(JpegCompressor::new(&settings).quality, 80);
    }
}
