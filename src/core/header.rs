//! Format versions written at the head of each archive file

use crate::error::{ArchiveError, Result};
use serde::{Deserialize, Serialize};

/// First line of every `.index` file
pub const INDEX_VERSION: u32 = 4;

/// Leading version of the `.meta` file; meta records never carry imagery
pub const META_VERSION: i64 = 2;

pub const INDEX_EXTENSION: &str = "index";
pub const META_EXTENSION: &str = "meta";
pub const DATA_EXTENSION: &str = "data";

/// Leading version of the `.data` file, selecting how imagery is stored
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataVersion {
    /// Raw pixel buffer with layout
    Raw = 2,
    /// Tagged compressed blob
    Compressed = 3,
}

impl DataVersion {
    pub fn for_compression(compress_image: bool) -> Self {
        if compress_image {
            DataVersion::Compressed
        } else {
            DataVersion::Raw
        }
    }

    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            2 => Ok(DataVersion::Raw),
            3 => Ok(DataVersion::Compressed),
            v => Err(ArchiveError::UnsupportedVersion(v)),
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }
}
