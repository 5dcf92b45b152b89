//! Image compression for version 3 records
//!
//! Compressed images are stored as `[tag: u8][len: u64][bytes]`. The tag
//! names the codec so readers can pick the matching decoder; the only codec
//! written today is JPEG (`'J'`).

use crate::core::raster::DenseImage;
use crate::error::{ArchiveError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};

/// Default JPEG quality (1-100)
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// Codec tag stored ahead of a compressed image blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionMethod {
    /// Baseline JPEG
    Jpeg = b'J',
}

impl CompressionMethod {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            b'J' => Some(CompressionMethod::Jpeg),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Turns a dense image into a compressed byte blob
///
/// Implementations must return a freshly allocated buffer on every call.
pub trait ImageCompressor: Send {
    fn method(&self) -> CompressionMethod;

    fn compress(&self, image: &DenseImage) -> Result<Vec<u8>>;
}

/// JPEG compressor backed by the `image` crate
#[derive(Debug, Clone)]
pub struct JpegCompressor {
    quality: u8,
}

impl JpegCompressor {
    pub fn new(quality: u8) -> Self {
        JpegCompressor {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl ImageCompressor for JpegCompressor {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Jpeg
    }

    fn compress(&self, image: &DenseImage) -> Result<Vec<u8>> {
        let color = match image.depth {
            1 => ExtendedColorType::L8,
            3 => ExtendedColorType::Rgb8,
            d => {
                return Err(ArchiveError::Compression(format!(
                    "JPEG supports 1 or 3 planes, image has {}",
                    d
                )))
            }
        };
        if image.width == 0 || image.height == 0 {
            return Err(ArchiveError::Compression(format!(
                "cannot compress empty {}x{} image",
                image.width, image.height
            )));
        }
        let width = u32::try_from(image.width)
            .map_err(|_| ArchiveError::Compression("image width exceeds u32".into()))?;
        let height = u32::try_from(image.height)
            .map_err(|_| ArchiveError::Compression("image height exceeds u32".into()))?;

        let mut out = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
            encoder
                .encode(&image.pixels, width, height, color)
                .map_err(|e| ArchiveError::Compression(format!("JPEG encoding failed: {}", e)))?;
        }
        Ok(out)
    }
}

/// Decode a compressed image blob back into a dense image
pub fn decompress(method: CompressionMethod, data: &[u8]) -> Result<DenseImage> {
    match method {
        CompressionMethod::Jpeg => {
            let decoded = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
                .map_err(|e| ArchiveError::Corrupt(format!("JPEG decoding failed: {}", e)))?;

            if decoded.color().channel_count() == 1 {
                let grey = decoded.to_luma8();
                let (w, h) = grey.dimensions();
                DenseImage::new(w as usize, h as usize, 1, grey.into_raw())
            } else {
                let rgb = decoded.to_rgb8();
                let (w, h) = rgb.dimensions();
                DenseImage::new(w as usize, h as usize, 3, rgb.into_raw())
            }
        }
    }
}
