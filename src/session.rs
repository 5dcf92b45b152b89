//! Archive writing session
//!
//! One [`ArchiveSession`] owns the `.index`, `.data` and optional `.meta`
//! files from [`open`](ArchiveSession::open) to [`close`](ArchiveSession::close).
//! Each [`write_frame`](ArchiveSession::write_frame) either lands completely
//! (data record, meta record, index line) or leaves the files as they were;
//! any failure stops the session.

use crate::config::{ArchiveConfig, ArchivePaths};
use crate::core::codec::FrameRecordEncoder;
use crate::core::compression::{ImageCompressor, JpegCompressor};
use crate::core::frame::FrameRecord;
use crate::core::header::{DataVersion, META_VERSION};
use crate::core::index::{IndexEntry, IndexHeader, IndexWriter};
use crate::core::io::BinaryFile;
use crate::core::stream::BinaryStreamWriter;
use crate::error::{ArchiveError, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Poisoned,
    Closed,
}

struct OpenStreams {
    index: IndexWriter<BinaryFile>,
    meta: Option<BinaryFile>,
    data: BinaryFile,
}

/// Writer for one archive
pub struct ArchiveSession {
    label: String,
    config: ArchiveConfig,
    paths: ArchivePaths,
    data_version: DataVersion,
    compressor: Box<dyn ImageCompressor>,
    streams: Option<OpenStreams>,
    state: SessionState,
    frames_written: u64,
    last_timestamp_us: Option<i64>,
}

impl ArchiveSession {
    /// Open an archive, compressing imagery with JPEG when enabled
    pub fn open(config: ArchiveConfig) -> Result<Self> {
        let compressor = Box::new(JpegCompressor::new(config.jpeg_quality));
        Self::open_with_compressor(config, compressor)
    }

    /// Open an archive with a caller-supplied image compressor
    ///
    /// Creates the output directory, truncates the three files and writes
    /// their headers. Files opened before a failure are closed again before
    /// the error is returned.
    pub fn open_with_compressor(
        config: ArchiveConfig,
        compressor: Box<dyn ImageCompressor>,
    ) -> Result<Self> {
        config.validate()?;
        let label = config.base_filename.clone();
        let paths = config.paths();
        let data_version = DataVersion::for_compression(config.compress_image);

        info!(
            "Opening archive '{}' in {:?} (data version {}, separate meta: {})",
            label,
            config.output_directory,
            data_version.as_i64(),
            config.separate_meta
        );

        fs::create_dir_all(&config.output_directory).map_err(|source| {
            ArchiveError::Configuration {
                session: label.clone(),
                path: config.output_directory.clone(),
                source,
            }
        })?;

        let open_err = |path: &Path| {
            let session = label.clone();
            let path = path.to_path_buf();
            move |source: io::Error| ArchiveError::Configuration {
                session,
                path,
                source,
            }
        };

        let index_file =
            BinaryFile::create(&paths.index).map_err(open_err(paths.index.as_path()))?;
        let mut index = IndexWriter::new(index_file);
        let mut data = BinaryFile::create(&paths.data).map_err(open_err(paths.data.as_path()))?;
        let mut meta = match &paths.meta {
            Some(path) => Some(BinaryFile::create(path).map_err(open_err(path.as_path()))?),
            None => None,
        };

        let header_err = |path: &Path| {
            let session = label.clone();
            let path = path.to_path_buf();
            move |source: io::Error| ArchiveError::HeaderWrite {
                session,
                path,
                source,
            }
        };

        let header = IndexHeader::new(
            file_name(&paths.data),
            paths.meta.as_deref().map(file_name),
            config.mission_id.clone(),
            config.stream_id.clone(),
        );
        index
            .write_header(&header)
            .and_then(|_| index.flush())
            .map_err(header_err(paths.index.as_path()))?;

        write_version(&mut data, data_version.as_i64()).map_err(header_err(paths.data.as_path()))?;
        if let (Some(file), Some(path)) = (meta.as_mut(), paths.meta.as_deref()) {
            write_version(file, META_VERSION).map_err(header_err(path))?;
        }

        debug!("Archive '{}' headers written", label);

        Ok(ArchiveSession {
            label,
            config,
            paths,
            data_version,
            compressor,
            streams: Some(OpenStreams { index, meta, data }),
            state: SessionState::Open,
            frames_written: 0,
            last_timestamp_us: None,
        })
    }

    /// Append one frame to the archive
    ///
    /// Returns the index entry written for it. On any error nothing of this
    /// frame remains in the files and the session refuses further frames.
    pub fn write_frame(&mut self, record: &FrameRecord<'_>) -> Result<IndexEntry> {
        match self.state {
            SessionState::Open => {}
            SessionState::Poisoned => return Err(ArchiveError::SessionPoisoned),
            SessionState::Closed => return Err(ArchiveError::SessionClosed),
        }

        let (timestamp_us, data_buf, meta_buf) = match self.encode_frame(record) {
            Ok(encoded) => encoded,
            Err(e) => return Err(self.poison(e)),
        };

        let streams = self.streams.as_mut().ok_or(ArchiveError::SessionClosed)?;
        let entry = IndexEntry {
            timestamp_us,
            offset: streams.data.len(),
        };

        if let Err(e) = append_frame(streams, &self.paths, entry, &data_buf, meta_buf.as_deref()) {
            return Err(self.poison(e));
        }

        if let Some(last) = self.last_timestamp_us {
            if timestamp_us < last {
                warn!(
                    "Archive '{}': frame {} timestamp {}us is earlier than previous {}us",
                    self.label, record.timestamp.frame, timestamp_us, last
                );
            }
        }
        self.last_timestamp_us = Some(timestamp_us);
        self.frames_written += 1;

        debug!(
            "Archive '{}': frame {} at {}us -> offset {} ({} bytes)",
            self.label,
            record.timestamp.frame,
            timestamp_us,
            entry.offset,
            data_buf.len()
        );

        Ok(entry)
    }

    fn encode_frame(&self, record: &FrameRecord<'_>) -> Result<(i64, Vec<u8>, Option<Vec<u8>>)> {
        let timestamp_us = record.timestamp.micros()?;
        let encoder = FrameRecordEncoder::new(self.compressor.as_ref());
        let data = encoder.encode_to_vec(record, true, self.data_version.as_i64())?;
        let meta = if self.paths.meta.is_some() {
            Some(encoder.encode_to_vec(record, false, META_VERSION)?)
        } else {
            None
        };
        Ok((timestamp_us, data, meta))
    }

    fn poison(&mut self, err: ArchiveError) -> ArchiveError {
        warn!(
            "Archive '{}' stopped after {} frames: {}",
            self.label, self.frames_written, err
        );
        self.state = SessionState::Poisoned;
        err
    }

    /// Flush and release all files (data, meta, then index)
    ///
    /// Calling this again is a no-op. The first flush error is returned, but
    /// every file is released regardless.
    pub fn close(&mut self) -> Result<()> {
        let Some(OpenStreams {
            mut index,
            meta,
            mut data,
        }) = self.streams.take()
        else {
            return Ok(());
        };
        self.state = SessionState::Closed;

        let mut first_err: Option<ArchiveError> = None;
        let mut record = |path: &Path, result: io::Result<()>| {
            if let Err(source) = result {
                if first_err.is_none() {
                    first_err = Some(ArchiveError::RuntimeWrite {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
        };

        record(&self.paths.data, data.sync());
        drop(data);
        if let Some(mut meta) = meta {
            let path = meta.path().to_path_buf();
            let result = meta.sync();
            record(&path, result);
        }
        let mut index = index.into_inner();
        record(&self.paths.index, index.sync());
        drop(index);

        info!(
            "Closed archive '{}' after {} frames",
            self.label, self.frames_written
        );

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn paths(&self) -> &ArchivePaths {
        &self.paths
    }

    pub fn data_version(&self) -> DataVersion {
        self.data_version
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Offset the next frame's data record will start at
    pub fn data_offset(&self) -> Option<u64> {
        self.streams.as_ref().map(|s| s.data.len())
    }

    /// True until `close()` or a fatal write error
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }
}

impl Drop for ArchiveSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Archive '{}' failed to close cleanly: {}", self.label, e);
        }
    }
}

/// Data record, meta record, then index line
///
/// On failure all three files are cut back to their pre-frame lengths, so no
/// partial record or line survives to be flushed later.
fn append_frame(
    streams: &mut OpenStreams,
    paths: &ArchivePaths,
    entry: IndexEntry,
    data: &[u8],
    meta: Option<&[u8]>,
) -> Result<()> {
    let data_len = entry.offset;
    let meta_len = streams.meta.as_ref().map(BinaryFile::len);
    let index_len = streams.index.get_ref().len();

    let result = (|| -> Result<()> {
        streams
            .data
            .append(data)
            .map_err(|source| runtime_write(&paths.data, source))?;
        if let (Some(file), Some(bytes)) = (streams.meta.as_mut(), meta) {
            file.append(bytes)
                .map_err(|source| runtime_write(file.path(), source))?;
        }
        streams
            .index
            .append(entry)
            .map_err(|source| runtime_write(&paths.index, source))
    })();

    if result.is_err() {
        let index = streams.index.get_mut();
        if let Err(e) = index.truncate(index_len) {
            warn!("Failed to roll back {:?} to {} bytes: {}", paths.index, index_len, e);
        }
        if let Err(e) = streams.data.truncate(data_len) {
            warn!("Failed to roll back {:?} to {} bytes: {}", paths.data, data_len, e);
        }
        if let (Some(file), Some(len)) = (streams.meta.as_mut(), meta_len) {
            if let Err(e) = file.truncate(len) {
                warn!("Failed to roll back {:?} to {} bytes: {}", file.path(), len, e);
            }
        }
    }

    result
}

fn runtime_write(path: &Path, source: io::Error) -> ArchiveError {
    ArchiveError::RuntimeWrite {
        path: path.to_path_buf(),
        source,
    }
}

fn write_version(file: &mut BinaryFile, version: i64) -> io::Result<()> {
    let mut header = BinaryStreamWriter::new(Vec::with_capacity(8));
    header.write_i64(version)?;
    file.append(&header.into_inner())?;
    file.flush()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame::{GeoPoint, GeoPolygon, Homography, Timestamp};
    use crate::core::io::Storage;
    use crate::core::raster::ImageView;
    use crate::reader::ArchiveReader;
    use std::fs::{File, OpenOptions};
    use std::io::{Seek, SeekFrom};
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> ArchiveConfig {
        ArchiveConfig::new("unit")
            .with_output_directory(dir.path())
            .with_compress_image(false)
    }

    fn frame(pixels: &[u8], time: f64, number: i64) -> FrameRecord<'_> {
        let p = GeoPoint::new(0.0, 0.0);
        FrameRecord {
            timestamp: Timestamp::new(time, number),
            image: ImageView::packed(pixels, 2, 2, 1).unwrap(),
            homography: Homography::identity(number),
            corners: GeoPolygon::new(p, p, p, p),
            gsd: 1.0,
        }
    }

    #[test]
    fn test_open_writes_headers() -> Result<()> {
        let dir = TempDir::new()?;
        let session = ArchiveSession::open(config(&dir))?;

        assert_eq!(session.data_version(), DataVersion::Raw);
        assert_eq!(session.data_offset(), Some(8));
        assert_eq!(fs::read(&session.paths().data)?, 2i64.to_le_bytes());
        let meta = session.paths().meta.clone().unwrap();
        assert_eq!(fs::read(meta)?, 2i64.to_le_bytes());
        Ok(())
    }

    #[test]
    fn test_close_twice_is_noop() -> Result<()> {
        let dir = TempDir::new()?;
        let mut session = ArchiveSession::open(config(&dir))?;
        let pixels = [0u8; 4];
        session.write_frame(&frame(&pixels, 0.0, 0))?;

        session.close()?;
        let data_len = fs::metadata(&session.paths().data)?.len();
        session.close()?;

        assert!(!session.is_open());
        assert_eq!(session.data_offset(), None);
        assert_eq!(fs::metadata(&session.paths().data)?.len(), data_len);
        Ok(())
    }

    #[test]
    fn test_write_after_close_fails() -> Result<()> {
        let dir = TempDir::new()?;
        let mut session = ArchiveSession::open(config(&dir))?;
        session.close()?;

        let pixels = [0u8; 4];
        assert!(matches!(
            session.write_frame(&frame(&pixels, 0.0, 0)),
            Err(ArchiveError::SessionClosed)
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_timestamp_poisons_session() -> Result<()> {
        let dir = TempDir::new()?;
        let mut session = ArchiveSession::open(config(&dir))?;
        let pixels = [0u8; 4];

        let err = session.write_frame(&frame(&pixels, f64::NAN, 0)).unwrap_err();
        assert!(err.is_encoding());
        assert!(!session.is_open());
        assert!(matches!(
            session.write_frame(&frame(&pixels, 0.0, 1)),
            Err(ArchiveError::SessionPoisoned)
        ));
        assert_eq!(session.data_offset(), Some(8));
        Ok(())
    }

    #[test]
    fn test_entries_track_data_offset() -> Result<()> {
        let dir = TempDir::new()?;
        let mut session = ArchiveSession::open(config(&dir).with_separate_meta(false))?;
        let pixels = [0u8; 4];

        let first = session.write_frame(&frame(&pixels, 0.0, 0))?;
        let second = session.write_frame(&frame(&pixels, 0.1, 1))?;
        assert_eq!(first.offset, 8);
        let record_len = second.offset - first.offset;
        assert_eq!(session.data_offset(), Some(second.offset + record_len));
        assert_eq!(session.frames_written(), 2);
        Ok(())
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Fault {
        Partial,
        Fail,
        Healthy,
    }

    /// Real file whose next append lands half-way and then fails once,
    /// like a transient ENOSPC
    struct FlakyFile {
        file: File,
        fault: Fault,
    }

    impl Write for FlakyFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.fault {
                Fault::Partial if buf.len() > 1 => {
                    self.fault = Fault::Fail;
                    self.file.write(&buf[..buf.len() / 2])
                }
                Fault::Partial | Fault::Fail => {
                    self.fault = Fault::Healthy;
                    Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
                }
                Fault::Healthy => self.file.write(buf),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    impl Storage for FlakyFile {
        fn set_len(&mut self, len: u64) -> io::Result<()> {
            Storage::set_len(&mut self.file, len)
        }

        fn sync(&mut self) -> io::Result<()> {
            self.file.sync_all()
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum Target {
        Data,
        Meta,
        Index,
    }

    fn inject_fault(session: &mut ArchiveSession, target: Target) {
        let streams = session.streams.as_mut().unwrap();
        let slot = match target {
            Target::Data => &mut streams.data,
            Target::Meta => streams.meta.as_mut().unwrap(),
            Target::Index => streams.index.get_mut(),
        };
        let path = slot.path().to_path_buf();
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        let len = file.seek(SeekFrom::End(0)).unwrap();
        assert_eq!(len, slot.len());
        let flaky = FlakyFile {
            file,
            fault: Fault::Partial,
        };
        *slot = BinaryFile::from_storage(path, Box::new(flaky), len);
    }

    fn check_failed_append_rolls_back(target: Target) -> Result<()> {
        let dir = TempDir::new()?;
        let mut session = ArchiveSession::open(config(&dir))?;
        let pixels = [5u8; 4];
        session.write_frame(&frame(&pixels, 0.0, 0))?;

        let paths = session.paths().clone();
        let meta_path = paths.meta.clone().unwrap();
        let data_len = fs::metadata(&paths.data)?.len();
        let meta_len = fs::metadata(&meta_path)?.len();
        let index_len = fs::metadata(&paths.index)?.len();

        inject_fault(&mut session, target);
        let err = session.write_frame(&frame(&pixels, 0.5, 1)).unwrap_err();
        let failed_path = match target {
            Target::Data => &paths.data,
            Target::Meta => &meta_path,
            Target::Index => &paths.index,
        };
        match &err {
            ArchiveError::RuntimeWrite { path, .. } => assert_eq!(path, failed_path),
            other => panic!("expected RuntimeWrite, got {:?}", other),
        }
        assert!(!session.is_open());
        assert_eq!(session.data_offset(), Some(data_len));
        assert!(matches!(
            session.write_frame(&frame(&pixels, 1.0, 2)),
            Err(ArchiveError::SessionPoisoned)
        ));

        // the fault has cleared, so close must not resurrect the failed frame
        session.close()?;
        assert_eq!(fs::metadata(&paths.data)?.len(), data_len);
        assert_eq!(fs::metadata(&meta_path)?.len(), meta_len);
        assert_eq!(fs::metadata(&paths.index)?.len(), index_len);

        let reader = ArchiveReader::open(&paths.index)?;
        assert_eq!(reader.len(), 1);
        assert_eq!(reader.read_frame(0)?.frame_number, 0);
        assert_eq!(reader.read_meta()?.map(|m| m.len()), Some(1));
        Ok(())
    }

    #[test]
    fn test_failed_data_append_rolls_back() -> Result<()> {
        check_failed_append_rolls_back(Target::Data)
    }

    #[test]
    fn test_failed_meta_append_rolls_back() -> Result<()> {
        check_failed_append_rolls_back(Target::Meta)
    }

    #[test]
    fn test_failed_index_append_rolls_back() -> Result<()> {
        check_failed_append_rolls_back(Target::Index)
    }
}
