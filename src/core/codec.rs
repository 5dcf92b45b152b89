//! Frame record codec
//!
//! One record, fields in this order:
//!
//! ```text
//! timestamp_us          i64
//! [image]               only when images are included:
//!                         v3: tag u8 ('J') | blob
//!                         v2: format i64 | width i64 | height i64 | planes i64
//!                             | i_step i64 | j_step i64 | plane_step i64 | blob
//! homography            3x3 f64, row-major
//! corners               sequence of 4 x [lon f64, lat f64]  (UL, UR, LR, LL)
//! gsd                   f64
//! frame_number          i64
//! reference_frame       i64
//! width                 i64
//! height                i64
//! ```
//!
//! Width and height close every record, including meta records that carry
//! no pixels.

use crate::core::compression::{self, CompressionMethod, ImageCompressor};
use crate::core::frame::{FrameRecord, GeoPoint};
use crate::core::header::DataVersion;
use crate::core::raster::{DenseImage, ImageView, PixelFormat};
use crate::core::stream::{BinaryStreamReader, BinaryStreamWriter};
use crate::error::{ArchiveError, Result};
use serde::Serialize;
use std::io::{Read, Write};

/// Image field, fully materialized before any byte of the record is written
enum ImagePayload {
    Raw(DenseImage),
    Compressed {
        method: CompressionMethod,
        bytes: Vec<u8>,
    },
}

/// Serializes [`FrameRecord`]s onto a [`BinaryStreamWriter`]
pub struct FrameRecordEncoder<'c> {
    compressor: &'c dyn ImageCompressor,
}

impl<'c> FrameRecordEncoder<'c> {
    pub fn new(compressor: &'c dyn ImageCompressor) -> Self {
        FrameRecordEncoder { compressor }
    }

    /// Write one record
    ///
    /// `data_version` only matters when `include_image` is set: 3 stores a
    /// compressed blob, 2 the raw pixels, anything else fails with
    /// [`ArchiveError::UnsupportedVersion`]. All encoding failures are raised
    /// before the first byte reaches `stream`.
    pub fn encode<W: Write>(
        &self,
        stream: &mut BinaryStreamWriter<W>,
        record: &FrameRecord<'_>,
        include_image: bool,
        data_version: i64,
    ) -> Result<()> {
        let timestamp_us = record.timestamp.micros()?;
        let width = dimension(record.image.width(), "width")?;
        let height = dimension(record.image.height(), "height")?;

        let payload = if include_image {
            Some(self.prepare_image(&record.image, data_version)?)
        } else {
            None
        };

        stream.reset_record();
        stream.write_i64(timestamp_us)?;

        match payload {
            Some(ImagePayload::Compressed { method, bytes }) => {
                stream.write_u8(method.tag())?;
                stream.write_bytes(&bytes)?;
            }
            Some(ImagePayload::Raw(image)) => write_raw_image(stream, &image)?,
            None => {}
        }

        stream.write_matrix(&record.homography.matrix)?;
        stream.write_sequence(&record.corners.to_pairs())?;
        stream.write_f64(record.gsd)?;
        stream.write_i64(record.timestamp.frame)?;
        stream.write_i64(record.homography.to_id)?;
        stream.write_i64(width)?;
        stream.write_i64(height)?;

        Ok(())
    }

    /// Encode one record into a fresh buffer
    pub fn encode_to_vec(
        &self,
        record: &FrameRecord<'_>,
        include_image: bool,
        data_version: i64,
    ) -> Result<Vec<u8>> {
        let mut stream = BinaryStreamWriter::new(Vec::new());
        self.encode(&mut stream, record, include_image, data_version)?;
        Ok(stream.into_inner())
    }

    fn prepare_image(&self, view: &ImageView<'_>, data_version: i64) -> Result<ImagePayload> {
        match DataVersion::from_i64(data_version)? {
            DataVersion::Compressed => {
                let dense = DenseImage::from_view(view);
                let bytes = self.compressor.compress(&dense)?;
                Ok(ImagePayload::Compressed {
                    method: self.compressor.method(),
                    bytes,
                })
            }
            DataVersion::Raw => Ok(ImagePayload::Raw(DenseImage::from_view(view))),
        }
    }
}

fn dimension(value: usize, name: &str) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| ArchiveError::InvalidImage(format!("image {} {} exceeds i64", name, value)))
}

fn write_raw_image<W: Write>(stream: &mut BinaryStreamWriter<W>, image: &DenseImage) -> Result<()> {
    let (i_step, j_step, plane_step) = image.steps();
    stream.write_i64(PixelFormat::Byte as i64)?;
    stream.write_i64(dimension(image.width, "width")?)?;
    stream.write_i64(dimension(image.height, "height")?)?;
    stream.write_i64(dimension(image.depth, "depth")?)?;
    stream.write_i64(i_step as i64)?;
    stream.write_i64(j_step as i64)?;
    stream.write_i64(plane_step as i64)?;
    stream.write_bytes(&image.pixels)?;
    Ok(())
}

/// Image field as found in a data record
#[derive(Debug, Clone, PartialEq)]
pub enum StoredImage {
    Raw(DenseImage),
    Compressed {
        method: CompressionMethod,
        bytes: Vec<u8>,
    },
}

impl StoredImage {
    /// Pixels of the stored image, decompressing if needed
    pub fn to_dense(&self) -> Result<DenseImage> {
        match self {
            StoredImage::Raw(image) => Ok(image.clone()),
            StoredImage::Compressed { method, bytes } => compression::decompress(*method, bytes),
        }
    }

    /// Bytes the image field occupies on disk, excluding framing
    pub fn stored_len(&self) -> usize {
        match self {
            StoredImage::Raw(image) => image.pixels.len(),
            StoredImage::Compressed { bytes, .. } => bytes.len(),
        }
    }
}

/// One decoded record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedFrame {
    pub timestamp_us: i64,
    #[serde(skip)]
    pub image: Option<StoredImage>,
    pub homography: [[f64; 3]; 3],
    pub corners: [GeoPoint; 4],
    pub gsd: f64,
    pub frame_number: i64,
    pub reference_frame: i64,
    pub width: i64,
    pub height: i64,
}

/// Reads records written by [`FrameRecordEncoder`]
pub struct FrameRecordDecoder;

impl FrameRecordDecoder {
    pub fn decode<R: Read>(
        stream: &mut BinaryStreamReader<R>,
        include_image: bool,
        data_version: DataVersion,
    ) -> Result<DecodedFrame> {
        let timestamp_us = stream.read_i64()?;

        let image = if include_image {
            Some(match data_version {
                DataVersion::Compressed => {
                    let tag = stream.read_u8()?;
                    let method = CompressionMethod::from_u8(tag).ok_or_else(|| {
                        ArchiveError::Corrupt(format!("unknown image codec tag 0x{:02x}", tag))
                    })?;
                    StoredImage::Compressed {
                        method,
                        bytes: stream.read_bytes()?,
                    }
                }
                DataVersion::Raw => StoredImage::Raw(read_raw_image(stream)?),
            })
        } else {
            None
        };

        let homography = stream.read_matrix::<3, 3>()?;
        let pairs = stream.read_sequence::<[f64; 2]>()?;
        if pairs.len() != 4 {
            return Err(ArchiveError::Corrupt(format!(
                "expected 4 corner points, found {}",
                pairs.len()
            )));
        }
        let mut corners = [GeoPoint::new(0.0, 0.0); 4];
        for (corner, [lon, lat]) in corners.iter_mut().zip(pairs) {
            *corner = GeoPoint::new(lon, lat);
        }

        Ok(DecodedFrame {
            timestamp_us,
            image,
            homography,
            corners,
            gsd: stream.read_f64()?,
            frame_number: stream.read_i64()?,
            reference_frame: stream.read_i64()?,
            width: stream.read_i64()?,
            height: stream.read_i64()?,
        })
    }
}

fn read_raw_image<R: Read>(stream: &mut BinaryStreamReader<R>) -> Result<DenseImage> {
    let format = stream.read_i64()?;
    if PixelFormat::from_i64(format).is_none() {
        return Err(ArchiveError::Corrupt(format!("unknown pixel format {}", format)));
    }
    let width = read_usize(stream, "width")?;
    let height = read_usize(stream, "height")?;
    let depth = read_usize(stream, "planes")?;
    let i_step = stream.read_i64()? as isize;
    let j_step = stream.read_i64()? as isize;
    let plane_step = stream.read_i64()? as isize;
    let pixels = stream.read_bytes()?;

    let view = ImageView::with_steps(&pixels, 0, width, height, depth, i_step, j_step, plane_step)
        .map_err(|e| ArchiveError::Corrupt(format!("raw image layout: {}", e)))?;
    if view.is_packed() && pixels.len() == width * height * depth {
        return DenseImage::new(width, height, depth, pixels);
    }
    Ok(DenseImage::from_view(&view))
}

fn read_usize<R: Read>(stream: &mut BinaryStreamReader<R>, name: &str) -> Result<usize> {
    let value = stream.read_i64()?;
    usize::try_from(value)
        .map_err(|_| ArchiveError::Corrupt(format!("negative image {} {}", name, value)))
}
