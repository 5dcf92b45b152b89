//! Disk I/O for the archive files

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Byte sink behind a [`BinaryFile`]
///
/// Writes are unbuffered: whatever `write` accepted is in the file, and
/// nothing is held back for a later flush.
pub trait Storage: Write + Send {
    /// Cut the sink to `len` bytes; the next write lands at `len`
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Flush to durable storage
    fn sync(&mut self) -> io::Result<()>;
}

impl Storage for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)?;
        // set_len leaves the cursor where it was
        self.seek(SeekFrom::Start(len))?;
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Append-only file that knows its own length
///
/// Appends are whole buffers; a failed append can be rolled back with
/// [`truncate`](BinaryFile::truncate). The length counts every byte the
/// storage accepted, including the accepted prefix of a failed append.
pub struct BinaryFile {
    storage: Box<dyn Storage>,
    path: PathBuf,
    len: u64,
}

impl BinaryFile {
    /// Create or truncate the file at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        Ok(Self::from_storage(path.as_ref(), Box::new(file), 0))
    }

    /// Wrap an already positioned sink holding `len` bytes
    pub fn from_storage(path: impl Into<PathBuf>, storage: Box<dyn Storage>, len: u64) -> Self {
        BinaryFile {
            storage,
            path: path.into(),
            len,
        }
    }

    /// Current length, i.e. the offset the next append lands at
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data)
    }

    /// Cut the file back to `len` bytes
    pub fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.storage.set_len(len)?;
        self.len = len;
        Ok(())
    }

    /// Flush and fsync
    pub fn sync(&mut self) -> io::Result<()> {
        self.storage.flush()?;
        self.storage.sync()
    }
}

impl Write for BinaryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.storage.write(buf)?;
        self.len += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.storage.flush()
    }
}
