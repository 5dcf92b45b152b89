//! # KWA - Frame Archive Writer
//!
//! `kwa-archive` persists per-frame video analytics records into a replayable
//! three-file archive:
//!
//! - `<base>.index` - text header plus one `<timestamp_us> <offset>` line per frame
//! - `<base>.data` - binary records with imagery (raw pixels or JPEG)
//! - `<base>.meta` - optional binary records without imagery
//!
//! Each record carries the frame timestamp, the image, a frame-to-reference
//! homography, the four-corner ground footprint and the ground sample
//! distance.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kwa_archive::{
//!     ArchiveConfig, ArchiveSession, FrameRecord, GeoPoint, GeoPolygon, Homography,
//!     ImageView, Result, Timestamp,
//! };
//!
//! # fn main() -> Result<()> {
//! let config = ArchiveConfig::new("run1")
//!     .with_output_directory("/data/kwa")
//!     .with_mission_id("M-2041");
//! let mut session = ArchiveSession::open(config)?;
//!
//! let pixels = vec![0u8; 640 * 480 * 3];
//! let record = FrameRecord {
//!     timestamp: Timestamp::new(0.0, 0),
//!     image: ImageView::packed(&pixels, 640, 480, 3)?,
//!     homography: Homography::identity(0),
//!     corners: GeoPolygon::new(
//!         GeoPoint::new(-77.01, 38.90),
//!         GeoPoint::new(-77.00, 38.90),
//!         GeoPoint::new(-77.00, 38.89),
//!         GeoPoint::new(-77.01, 38.89),
//!     ),
//!     gsd: 0.5,
//! };
//! session.write_frame(&record)?;
//! session.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Reading back
//!
//! ```rust,no_run
//! use kwa_archive::{ArchiveReader, Result};
//!
//! # fn main() -> Result<()> {
//! let reader = ArchiveReader::open("/data/kwa/run1.index")?;
//! for frame in reader.frames() {
//!     let frame = frame?;
//!     println!("{}us frame {}", frame.timestamp_us, frame.frame_number);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod reader;
pub mod session;

pub use crate::config::{ArchiveConfig, ArchivePaths};
pub use crate::core::{
    codec::{DecodedFrame, FrameRecordDecoder, FrameRecordEncoder, StoredImage},
    compression::{CompressionMethod, ImageCompressor, JpegCompressor},
    frame::{FrameRecord, GeoPoint, GeoPolygon, Homography, Timestamp},
    header::{DataVersion, INDEX_VERSION, META_VERSION},
    index::{ArchiveIndex, IndexEntry, IndexHeader, IndexWriter},
    raster::{DenseImage, ImageView, PixelFormat},
    stream::{BinaryStreamReader, BinaryStreamWriter},
};
pub use crate::error::{ArchiveError, Result};
pub use crate::reader::ArchiveReader;
pub use crate::session::ArchiveSession;
