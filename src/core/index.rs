//! Text offset index
//!
//! ```text
//! 4
//! <data-file basename>
//! <meta-file basename, or empty line>
//! <mission id>
//! <stream id>
//! <timestamp_us> <offset>
//! ...
//! ```

use crate::core::header::INDEX_VERSION;
use crate::error::{ArchiveError, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};

/// Fixed five-line head of an index file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHeader {
    pub version: u32,
    pub data_file: String,
    pub meta_file: Option<String>,
    pub mission_id: String,
    pub stream_id: String,
}

impl IndexHeader {
    pub fn new(
        data_file: impl Into<String>,
        meta_file: Option<String>,
        mission_id: impl Into<String>,
        stream_id: impl Into<String>,
    ) -> Self {
        IndexHeader {
            version: INDEX_VERSION,
            data_file: data_file.into(),
            meta_file,
            mission_id: mission_id.into(),
            stream_id: stream_id.into(),
        }
    }
}

/// One frame's position in the data file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub timestamp_us: i64,
    pub offset: u64,
}

/// Writes the index header and one line per frame
pub struct IndexWriter<W: Write> {
    inner: W,
    entries: u64,
}

impl<W: Write> IndexWriter<W> {
    pub fn new(inner: W) -> Self {
        IndexWriter { inner, entries: 0 }
    }

    /// Write the five header lines in one call
    pub fn write_header(&mut self, header: &IndexHeader) -> io::Result<()> {
        for field in [&header.data_file, &header.mission_id, &header.stream_id] {
            check_single_line(field)?;
        }
        if let Some(meta) = &header.meta_file {
            check_single_line(meta)?;
        }

        let text = format!(
            "{}\n{}\n{}\n{}\n{}\n",
            header.version,
            header.data_file,
            header.meta_file.as_deref().unwrap_or(""),
            header.mission_id,
            header.stream_id
        );
        self.inner.write_all(text.as_bytes())
    }

    /// Write one `<timestamp_us> <offset>` line
    ///
    /// The line is handed to the sink in a single `write_all`. With an
    /// unbuffered sink a failed append leaves nothing pending for a later
    /// flush; at most a prefix of the line reaches the sink.
    pub fn append(&mut self, entry: IndexEntry) -> io::Result<()> {
        let line = format!("{} {}\n", entry.timestamp_us, entry.offset);
        self.inner.write_all(line.as_bytes())?;
        self.entries += 1;
        Ok(())
    }

    /// Lines appended after the header
    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn check_single_line(field: &str) -> io::Result<()> {
    if field.contains('\n') || field.contains('\r') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("index header field {:?} spans multiple lines", field),
        ));
    }
    Ok(())
}

/// Parsed index file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveIndex {
    pub header: IndexHeader,
    pub entries: Vec<IndexEntry>,
}

impl ArchiveIndex {
    /// Parse an index, checking entry offsets strictly increase
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader.lines();
        let mut line_no = 0usize;
        let mut next_header_line = |what: &str| -> Result<String> {
            line_no += 1;
            match lines.next() {
                Some(line) => Ok(line?),
                None => Err(ArchiveError::InvalidIndex {
                    line: line_no,
                    reason: format!("missing {}", what),
                }),
            }
        };

        let version_line = next_header_line("version")?;
        let version: u32 = version_line
            .trim()
            .parse()
            .map_err(|_| ArchiveError::InvalidIndex {
                line: 1,
                reason: format!("bad version {:?}", version_line),
            })?;
        if version != INDEX_VERSION {
            return Err(ArchiveError::InvalidIndex {
                line: 1,
                reason: format!("unsupported index version {}", version),
            });
        }

        let data_file = next_header_line("data file name")?;
        let meta_file = next_header_line("meta file name")?;
        let mission_id = next_header_line("mission id")?;
        let stream_id = next_header_line("stream id")?;

        let header = IndexHeader {
            version,
            data_file,
            meta_file: if meta_file.is_empty() {
                None
            } else {
                Some(meta_file)
            },
            mission_id,
            stream_id,
        };

        let mut entries: Vec<IndexEntry> = Vec::new();
        for (i, line) in lines.enumerate() {
            let line_no = i + 6;
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let entry = parse_entry(&line).ok_or_else(|| ArchiveError::InvalidIndex {
                line: line_no,
                reason: format!("expected '<timestamp_us> <offset>', got {:?}", line),
            })?;
            if let Some(prev) = entries.last() {
                if entry.offset <= prev.offset {
                    return Err(ArchiveError::InvalidIndex {
                        line: line_no,
                        reason: format!(
                            "offset {} does not follow previous offset {}",
                            entry.offset, prev.offset
                        ),
                    });
                }
            }
            entries.push(entry);
        }

        Ok(ArchiveIndex { header, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry with the latest timestamp not after `timestamp_us`
    pub fn seek(&self, timestamp_us: i64) -> Option<&IndexEntry> {
        let pos = self
            .entries
            .partition_point(|e| e.timestamp_us <= timestamp_us);
        pos.checked_sub(1).map(|i| &self.entries[i])
    }
}

fn parse_entry(line: &str) -> Option<IndexEntry> {
    let mut parts = line.split_whitespace();
    let timestamp_us = parts.next()?.parse().ok()?;
    let offset = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(IndexEntry {
        timestamp_us,
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(meta: Option<&str>, entries: &[(i64, u64)]) -> String {
        let mut w = IndexWriter::new(Vec::new());
        w.write_header(&IndexHeader::new(
            "run1.data",
            meta.map(str::to_string),
            "mission-7",
            "eo-1",
        ))
        .unwrap();
        for &(timestamp_us, offset) in entries {
            w.append(IndexEntry {
                timestamp_us,
                offset,
            })
            .unwrap();
        }
        assert_eq!(w.entries(), entries.len() as u64);
        String::from_utf8(w.into_inner()).unwrap()
    }

    #[test]
    fn test_header_grammar_with_meta() {
        let text = written(Some("run1.meta"), &[(0, 8), (500000, 320)]);
        assert_eq!(
            text,
            "4\nrun1.data\nrun1.meta\nmission-7\neo-1\n0 8\n500000 320\n"
        );
    }

    #[test]
    fn test_header_grammar_without_meta() {
        let text = written(None, &[]);
        assert_eq!(text, "4\nrun1.data\n\nmission-7\neo-1\n");
    }

    #[test]
    fn test_multiline_field_rejected() {
        let mut w = IndexWriter::new(Vec::new());
        let header = IndexHeader::new("a.data", None, "bad\nmission", "");
        assert!(w.write_header(&header).is_err());
        assert!(w.into_inner().is_empty());
    }

    /// Sink whose next write fails, then recovers
    struct FlakySink {
        written: Vec<u8>,
        fail_next: bool,
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_next {
                self.fail_next = false;
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_append_leaves_nothing_to_flush() {
        let mut w = IndexWriter::new(FlakySink {
            written: Vec::new(),
            fail_next: true,
        });
        assert!(w
            .append(IndexEntry {
                timestamp_us: 500000,
                offset: 8,
            })
            .is_err());
        assert_eq!(w.entries(), 0);

        w.flush().unwrap();
        assert!(w.get_ref().written.is_empty());

        w.append(IndexEntry {
            timestamp_us: 600000,
            offset: 8,
        })
        .unwrap();
        assert_eq!(w.into_inner().written, b"600000 8\n");
    }

    #[test]
    fn test_parse_round_trip() -> Result<()> {
        let text = written(Some("run1.meta"), &[(0, 8), (500000, 320), (1000000, 632)]);
        let index = ArchiveIndex::parse(text.as_bytes())?;
        assert_eq!(index.header.meta_file.as_deref(), Some("run1.meta"));
        assert_eq!(index.header.stream_id, "eo-1");
        assert_eq!(index.len(), 3);
        assert_eq!(index.entries[1].timestamp_us, 500000);
        Ok(())
    }

    #[test]
    fn test_parse_empty_meta_line() -> Result<()> {
        let index = ArchiveIndex::parse(written(None, &[(1, 8)]).as_bytes())?;
        assert_eq!(index.header.meta_file, None);
        Ok(())
    }

    #[test]
    fn test_parse_rejects_wrong_version() {
        let err = ArchiveIndex::parse("3\na.data\n\n\n\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidIndex { line: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_truncated_header() {
        let err = ArchiveIndex::parse("4\na.data\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidIndex { line: 3, .. }));
    }

    #[test]
    fn test_parse_rejects_non_increasing_offsets() {
        let text = written(None, &[(0, 8), (1, 8)]);
        let err = ArchiveIndex::parse(text.as_bytes()).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidIndex { line: 7, .. }));
    }

    #[test]
    fn test_parse_rejects_garbage_entry() {
        let text = format!("{}12 abc\n", written(None, &[]));
        assert!(ArchiveIndex::parse(text.as_bytes()).is_err());
    }

    #[test]
    fn test_seek_by_timestamp() -> Result<()> {
        let text = written(None, &[(0, 8), (500000, 100), (1000000, 200)]);
        let index = ArchiveIndex::parse(text.as_bytes())?;
        assert_eq!(index.seek(-1), None);
        assert_eq!(index.seek(0).unwrap().offset, 8);
        assert_eq!(index.seek(999_999).unwrap().offset, 100);
        assert_eq!(index.seek(5_000_000).unwrap().offset, 200);
        Ok(())
    }
}
