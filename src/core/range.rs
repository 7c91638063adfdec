// Byte-range reads from either end of a file, with explicit truncation reporting.
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind};

/// Bytes read for one request. `start` is absolute; `requested` is the length
/// the caller asked for, which exceeds `bytes.len()` when the range was clamped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ByteRange {
    pub start: u64,
    pub requested: u64,
    pub bytes: Vec<u8>,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.len() < self.requested
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[derive(Debug)]
pub struct RangeReader {
    path: PathBuf,
    file: File,
    file_size: u64,
}

impl RangeReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to open file")
                    .with_path(&path)
                    .with_source(err)
            })?;
        let file_size = file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;
        Ok(Self {
            path,
            file,
            file_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Reads up to `length` bytes. With `from_end`, the range ends `offset`
    /// bytes before EOF; otherwise it starts at `offset`. Ranges that fall
    /// outside the file are clamped, never padded.
    pub fn read_range(
        &mut self,
        length: u64,
        offset: u64,
        from_end: bool,
    ) -> Result<ByteRange, Error> {
        let (start, end) = clamp_range(self.file_size, length, offset, from_end);
        let len = end - start;
        if len < length {
            tracing::warn!(
                path = %self.path.display(),
                requested = length,
                available = len,
                from_end,
                "byte range clamped to file bounds"
            );
        }

        let mut bytes = vec![0u8; len as usize];
        if len > 0 {
            self.file
                .seek(SeekFrom::Start(start))
                .map_err(|err| self.io_error(start, err))?;
            self.file
                .read_exact(&mut bytes)
                .map_err(|err| self.io_error(start, err))?;
        }
        Ok(ByteRange {
            start,
            requested: length,
            bytes,
        })
    }

    /// Like `read_range`, but a clamped range is a `TruncatedRead` error.
    pub fn read_exact_range(
        &mut self,
        length: u64,
        offset: u64,
        from_end: bool,
    ) -> Result<Vec<u8>, Error> {
        let range = self.read_range(length, offset, from_end)?;
        if range.is_truncated() {
            let claimed_start = if from_end {
                self.file_size.saturating_sub(offset).saturating_sub(length)
            } else {
                offset
            };
            return Err(Error::new(ErrorKind::TruncatedRead)
                .with_message(format!(
                    "needed {length} bytes but only {} are available",
                    range.len()
                ))
                .with_path(&self.path)
                .with_offset(claimed_start)
                .with_expected_len(length));
        }
        Ok(range.into_bytes())
    }

    fn io_error(&self, offset: u64, err: std::io::Error) -> Error {
        Error::new(ErrorKind::Io)
            .with_path(&self.path)
            .with_offset(offset)
            .with_source(err)
    }
}

/// One-shot read that opens `path`, reads the range, and closes the file.
pub fn read_range(
    path: impl AsRef<Path>,
    length: u64,
    offset: u64,
    from_end: bool,
) -> Result<ByteRange, Error> {
    RangeReader::open(path)?.read_range(length, offset, from_end)
}

fn clamp_range(file_size: u64, length: u64, offset: u64, from_end: bool) -> (u64, u64) {
    if from_end {
        let end = file_size.saturating_sub(offset);
        let start = end.saturating_sub(length);
        (start, end)
    } else {
        let start = offset.min(file_size);
        let end = offset.saturating_add(length).min(file_size);
        (start, end)
    }
}
