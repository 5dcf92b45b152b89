//! Archive building blocks
//!
//! - [`stream`] - little-endian primitive writer/reader
//! - [`codec`] - frame record layout for both data versions
//! - [`index`] - text offset index
//! - [`header`] - format versions and file extensions
//! - [`io`] - append-only binary files
//! - [`raster`] - strided image views and dense copies
//! - [`compression`] - image compressor seam and JPEG codec
//! - [`frame`] - per-frame input types

pub mod codec;
pub mod compression;
pub mod frame;
pub mod header;
pub mod index;
pub mod io;
pub mod raster;
pub mod stream;
