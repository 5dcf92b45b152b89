//! Archive session configuration
//!
//! Mirrors the writer's configuration keys. Can be parsed from TOML:
//!
//! ```toml
//! output_directory = "/data/kwa"
//! base_filename = "run1"
//! separate_meta = true
//! mission_id = "M-2041"
//! stream_id = "EO"
//! compress_image = true
//! ```

use crate::core::compression::DEFAULT_JPEG_QUALITY;
use crate::core::header::{DATA_EXTENSION, INDEX_EXTENSION, META_EXTENSION};
use crate::error::{ArchiveError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for one archive session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Directory the archive files are written to; created if missing
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,

    /// File name shared by all archive files, without extension
    pub base_filename: String,

    /// Whether to write the imagery-free `.meta` file
    #[serde(default = "default_true")]
    pub separate_meta: bool,

    #[serde(default)]
    pub mission_id: String,

    #[serde(default)]
    pub stream_id: String,

    /// Compress imagery (data version 3) instead of storing raw pixels (version 2)
    #[serde(default = "default_true")]
    pub compress_image: bool,

    /// JPEG quality for compressed imagery, 1-100
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_output_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

/// Locations of the three archive files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePaths {
    pub index: PathBuf,
    pub meta: Option<PathBuf>,
    pub data: PathBuf,
}

impl ArchiveConfig {
    /// Config with defaults for everything but the base filename
    pub fn new(base_filename: impl Into<String>) -> Self {
        ArchiveConfig {
            output_directory: default_output_directory(),
            base_filename: base_filename.into(),
            separate_meta: true,
            mission_id: String::new(),
            stream_id: String::new(),
            compress_image: true,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ArchiveConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn with_output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = dir.into();
        self
    }

    pub fn with_separate_meta(mut self, separate_meta: bool) -> Self {
        self.separate_meta = separate_meta;
        self
    }

    pub fn with_mission_id(mut self, mission_id: impl Into<String>) -> Self {
        self.mission_id = mission_id.into();
        self
    }

    pub fn with_stream_id(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = stream_id.into();
        self
    }

    pub fn with_compress_image(mut self, compress_image: bool) -> Self {
        self.compress_image = compress_image;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Check values that would produce an unusable archive
    ///
    /// - base filename must be non-empty and a bare file name
    /// - mission and stream ids must fit on one index line
    /// - JPEG quality must be within 1-100
    pub fn validate(&self) -> Result<()> {
        if self.base_filename.is_empty() {
            return Err(ArchiveError::InvalidConfig(
                "base_filename must be set".to_string(),
            ));
        }
        if self.base_filename.contains(['/', '\\'])
            || self.base_filename == "."
            || self.base_filename == ".."
        {
            return Err(ArchiveError::InvalidConfig(format!(
                "base_filename {:?} must be a file name, not a path",
                self.base_filename
            )));
        }
        for (key, value) in [
            ("base_filename", &self.base_filename),
            ("mission_id", &self.mission_id),
            ("stream_id", &self.stream_id),
        ] {
            if value.contains(['\n', '\r']) {
                return Err(ArchiveError::InvalidConfig(format!(
                    "{} must not contain line breaks",
                    key
                )));
            }
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ArchiveError::InvalidConfig(format!(
                "jpeg_quality {} outside 1-100",
                self.jpeg_quality
            )));
        }
        Ok(())
    }

    /// `{output_directory}/{base_filename}.{index,meta,data}`
    pub fn paths(&self) -> ArchivePaths {
        let base = self.output_directory.join(&self.base_filename);
        let with_ext = |ext: &str| {
            let mut name = base.clone().into_os_string();
            name.push(".");
            name.push(ext);
            PathBuf::from(name)
        };
        ArchivePaths {
            index: with_ext(INDEX_EXTENSION),
            meta: self.separate_meta.then(|| with_ext(META_EXTENSION)),
            data: with_ext(DATA_EXTENSION),
        }
    }
}
