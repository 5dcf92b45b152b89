//! Primitive binary streams shared by the data and meta files
//!
//! All values are little-endian:
//!
//! ```text
//! integer   i64 (8 bytes)
//! double    IEEE-754 f64 (8 bytes)
//! tag       u8
//! matrix    R*C f64, row-major, no dimension prefix
//! sequence  count: u64 | element...
//! blob      len: u64   | bytes...
//! ```

use crate::error::{ArchiveError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Upper bound accepted for a sequence count or blob length when reading
const MAX_LENGTH_PREFIX: u64 = 1 << 32;

/// Value that knows how to put itself on a [`BinaryStreamWriter`]
pub trait WriteBinary {
    fn write_binary<W: Write>(&self, stream: &mut BinaryStreamWriter<W>) -> io::Result<()>;
}

/// Value that knows how to read itself back from a [`BinaryStreamReader`]
pub trait ReadBinary: Sized {
    fn read_binary<R: Read>(stream: &mut BinaryStreamReader<R>) -> Result<Self>;
}

/// Writer for fixed-width primitives over any byte sink
///
/// Tracks the total number of bytes written and the number written since
/// the last [`reset_record`](BinaryStreamWriter::reset_record).
pub struct BinaryStreamWriter<W: Write> {
    inner: W,
    pos: u64,
    record_start: u64,
}

impl<W: Write> BinaryStreamWriter<W> {
    pub fn new(inner: W) -> Self {
        BinaryStreamWriter {
            inner,
            pos: 0,
            record_start: 0,
        }
    }

    /// Total bytes written through this writer
    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Bytes written since the last record reset
    #[inline]
    pub fn record_len(&self) -> u64 {
        self.pos - self.record_start
    }

    /// Start a new record. Nothing written before this point is shared with
    /// what follows.
    pub fn reset_record(&mut self) {
        self.record_start = self.pos;
    }

    pub fn write_u8(&mut self, value: u8) -> io::Result<()> {
        self.inner.write_u8(value)?;
        self.pos += 1;
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> io::Result<()> {
        self.inner.write_i64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> io::Result<()> {
        self.inner.write_f64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    /// Write a fixed-size matrix row by row
    pub fn write_matrix<const R: usize, const C: usize>(
        &mut self,
        matrix: &[[f64; C]; R],
    ) -> io::Result<()> {
        for row in matrix {
            for value in row {
                self.write_f64(*value)?;
            }
        }
        Ok(())
    }

    /// Write a count-prefixed sequence of homogeneous values
    pub fn write_sequence<T: WriteBinary>(&mut self, items: &[T]) -> io::Result<()> {
        self.write_length(items.len())?;
        for item in items {
            item.write_binary(self)?;
        }
        Ok(())
    }

    /// Write a length-prefixed byte blob
    pub fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_length(data.len())?;
        self.inner.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    fn write_length(&mut self, len: usize) -> io::Result<()> {
        self.inner.write_u64::<LittleEndian>(len as u64)?;
        self.pos += 8;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl WriteBinary for i64 {
    fn write_binary<W: Write>(&self, stream: &mut BinaryStreamWriter<W>) -> io::Result<()> {
        stream.write_i64(*self)
    }
}

impl WriteBinary for f64 {
    fn write_binary<W: Write>(&self, stream: &mut BinaryStreamWriter<W>) -> io::Result<()> {
        stream.write_f64(*self)
    }
}

impl<const N: usize> WriteBinary for [f64; N] {
    fn write_binary<W: Write>(&self, stream: &mut BinaryStreamWriter<W>) -> io::Result<()> {
        for value in self {
            stream.write_f64(*value)?;
        }
        Ok(())
    }
}

/// Reader mirroring [`BinaryStreamWriter`]
pub struct BinaryStreamReader<R: Read> {
    inner: R,
    pos: u64,
}

impl<R: Read> BinaryStreamReader<R> {
    pub fn new(inner: R) -> Self {
        BinaryStreamReader { inner, pos: 0 }
    }

    /// Bytes consumed so far
    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let v = self.inner.read_u8()?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let v = self.inner.read_i64::<LittleEndian>()?;
        self.pos += 8;
        Ok(v)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let v = self.inner.read_f64::<LittleEndian>()?;
        self.pos += 8;
        Ok(v)
    }

    pub fn read_matrix<const ROWS: usize, const COLS: usize>(
        &mut self,
    ) -> Result<[[f64; COLS]; ROWS]> {
        let mut matrix = [[0.0; COLS]; ROWS];
        for row in matrix.iter_mut() {
            for value in row.iter_mut() {
                *value = self.read_f64()?;
            }
        }
        Ok(matrix)
    }

    pub fn read_sequence<T: ReadBinary>(&mut self) -> Result<Vec<T>> {
        let count = self.read_length()?;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(T::read_binary(self)?);
        }
        Ok(items)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_length()?;
        let mut data = vec![0u8; len];
        self.inner.read_exact(&mut data)?;
        self.pos += len as u64;
        Ok(data)
    }

    fn read_length(&mut self) -> Result<usize> {
        let len = self.inner.read_u64::<LittleEndian>()?;
        self.pos += 8;
        if len > MAX_LENGTH_PREFIX {
            return Err(ArchiveError::Corrupt(format!(
                "length prefix {} at offset {} exceeds limit",
                len,
                self.pos - 8
            )));
        }
        Ok(len as usize)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl ReadBinary for i64 {
    fn read_binary<R: Read>(stream: &mut BinaryStreamReader<R>) -> Result<Self> {
        stream.read_i64()
    }
}

impl ReadBinary for f64 {
    fn read_binary<R: Read>(stream: &mut BinaryStreamReader<R>) -> Result<Self> {
        stream.read_f64()
    }
}

impl<const N: usize> ReadBinary for [f64; N] {
    fn read_binary<R: Read>(stream: &mut BinaryStreamReader<R>) -> Result<Self> {
        let mut values = [0.0; N];
        for value in values.iter_mut() {
            *value = stream.read_f64()?;
        }
        Ok(values)
    }
}
