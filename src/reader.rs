//! Read-side access to a written archive
//!
//! Loads the `.index` into memory on open and decodes `.data` records on
//! demand by seeking to their indexed offsets. The `.meta` file has no index
//! of its own and is decoded front to back.

use crate::core::codec::{DecodedFrame, FrameRecordDecoder};
use crate::core::header::{DataVersion, META_VERSION};
use crate::core::index::{ArchiveIndex, IndexEntry};
use crate::core::stream::BinaryStreamReader;
use crate::error::{ArchiveError, Result};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reader over one archive
pub struct ArchiveReader {
    index: ArchiveIndex,
    data_version: DataVersion,
    data_file: File,
    data_len: u64,
    data_path: PathBuf,
    meta_path: Option<PathBuf>,
}

impl ArchiveReader {
    /// Open the archive described by an `.index` file
    ///
    /// Data and meta files are looked up next to the index under the names
    /// recorded in its header.
    pub fn open<P: AsRef<Path>>(index_path: P) -> Result<Self> {
        let index_path = index_path.as_ref();
        let index = ArchiveIndex::parse(BufReader::new(File::open(index_path)?))?;
        let dir = index_path.parent().unwrap_or_else(|| Path::new("."));

        let data_path = dir.join(&index.header.data_file);
        let meta_path = index.header.meta_file.as_ref().map(|m| dir.join(m));

        let data_file = File::open(&data_path)?;
        let data_len = data_file.metadata()?.len();
        let data_version = {
            let mut stream = BinaryStreamReader::new(BufReader::new(&data_file));
            DataVersion::from_i64(stream.read_i64()?)?
        };

        if let Some(last) = index.entries.last() {
            if last.offset >= data_len {
                return Err(ArchiveError::Corrupt(format!(
                    "index offset {} beyond end of {:?} ({} bytes)",
                    last.offset, data_path, data_len
                )));
            }
        }

        debug!(
            "Opened archive {:?}: {} frames, data version {}",
            index_path,
            index.len(),
            data_version.as_i64()
        );

        Ok(ArchiveReader {
            index,
            data_version,
            data_file,
            data_len,
            data_path,
            meta_path,
        })
    }

    pub fn index(&self) -> &ArchiveIndex {
        &self.index
    }

    pub fn data_version(&self) -> DataVersion {
        self.data_version
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn meta_path(&self) -> Option<&Path> {
        self.meta_path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Decode the `n`th indexed frame
    ///
    /// The record must carry the indexed timestamp and end exactly where the
    /// next record begins.
    pub fn read_frame(&self, n: usize) -> Result<DecodedFrame> {
        let entry = *self.index.entries.get(n).ok_or_else(|| {
            ArchiveError::Corrupt(format!(
                "frame {} requested, archive has {}",
                n,
                self.index.len()
            ))
        })?;
        let end = self
            .index
            .entries
            .get(n + 1)
            .map(|next| next.offset)
            .unwrap_or(self.data_len);

        let mut file = &self.data_file;
        file.seek(SeekFrom::Start(entry.offset))?;
        let mut stream = BinaryStreamReader::new(BufReader::new(file));
        let frame = FrameRecordDecoder::decode(&mut stream, true, self.data_version)?;

        check_entry(&entry, &frame, stream.position(), end)?;
        Ok(frame)
    }

    /// Decode every indexed frame in order
    pub fn frames(&self) -> impl Iterator<Item = Result<DecodedFrame>> + '_ {
        (0..self.len()).map(move |n| self.read_frame(n))
    }

    /// Decode the whole `.meta` file, if the archive has one
    pub fn read_meta(&self) -> Result<Option<Vec<DecodedFrame>>> {
        let Some(path) = &self.meta_path else {
            return Ok(None);
        };
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut stream = BinaryStreamReader::new(BufReader::new(file));

        let version = stream.read_i64()?;
        if version != META_VERSION {
            return Err(ArchiveError::UnsupportedVersion(version));
        }

        let mut frames = Vec::with_capacity(self.len());
        while stream.position() < len {
            frames.push(FrameRecordDecoder::decode(
                &mut stream,
                false,
                DataVersion::Raw,
            )?);
        }
        Ok(Some(frames))
    }
}

fn check_entry(entry: &IndexEntry, frame: &DecodedFrame, consumed: u64, end: u64) -> Result<()> {
    if frame.timestamp_us != entry.timestamp_us {
        return Err(ArchiveError::Corrupt(format!(
            "record at offset {} has timestamp {}us, index says {}us",
            entry.offset, frame.timestamp_us, entry.timestamp_us
        )));
    }
    if entry.offset + consumed != end {
        return Err(ArchiveError::Corrupt(format!(
            "record at offset {} is {} bytes, index leaves {}",
            entry.offset,
            consumed,
            end - entry.offset
        )));
    }
    Ok(())
}
