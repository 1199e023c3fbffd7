//! Lazy longitude-column reads with reopen-on-demand file handles.
//!
//! Each data record holds one longitude line of posts, south to north:
//!
//! ```text
//! +----------+-------------+-----------+-----------+------------------+----------+
//! | 0xAA (1) | block # (3) | lon # (2) | lat # (2) | posts (2 × n)    | sum (4)  |
//! +----------+-------------+-----------+-----------+------------------+----------+
//! ```
//!
//! Posts are big-endian signed-magnitude 16-bit meters. The checksum is the
//! unsigned byte sum of everything before it.

use crate::header::{FrameHeader, DATA_OFFSET};
use crate::Result;
use dted_metrics::metric_defs;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Record bytes that are not elevation posts (8-byte prefix + checksum).
pub const RECORD_OVERHEAD: u64 = 12;

/// First byte of every data record.
pub const RECORD_SENTINEL: u8 = 0xAA;

/// Size of the record prefix before the first post.
const RECORD_PREFIX: usize = 8;

/// A file handle that may be released and transparently reopened.
///
/// The owner of many frames can call [`MaybeOpenFile::release`] to give back
/// descriptors; the next read reopens the file by its stored path.
#[derive(Debug)]
pub struct MaybeOpenFile {
    path: PathBuf,
    file: Option<File>,
    reopens: u64,
}

impl MaybeOpenFile {
    /// Open the file now.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            file: Some(file),
            reopens: 0,
        })
    }

    /// Path the handle reopens from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a descriptor is currently held.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Number of times the handle was reacquired after a release.
    pub fn reopen_count(&self) -> u64 {
        self.reopens
    }

    /// Close the descriptor. Safe to call repeatedly.
    pub fn release(&mut self) {
        if self.file.take().is_some() {
            debug!("released handle for {}", self.path.display());
        }
    }

    /// Borrow the open handle, reopening it first if it was released.
    pub fn handle(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            let file = File::open(&self.path)?;
            self.reopens += 1;
            metrics::counter!(metric_defs::FILE_REOPENS.name).increment(1);
            debug!("reopened {}", self.path.display());
            self.file = Some(file);
        }
        // The branch above guarantees a handle.
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file handle unavailable"))
    }
}

/// Byte offset of the record for `column`.
pub fn record_offset(header: &FrameHeader, column: usize) -> u64 {
    DATA_OFFSET + column as u64 * header.record_size()
}

/// Read one longitude column of posts.
///
/// The whole record is fetched in a single read. A bad sentinel or short
/// read is an error; a checksum mismatch is only logged.
pub fn read_column(file: &mut MaybeOpenFile, header: &FrameHeader, column: usize) -> io::Result<Vec<i16>> {
    let offset = record_offset(header, column);
    let mut record = vec![0u8; header.record_size() as usize];

    let handle = file.handle()?;
    handle.seek(SeekFrom::Start(offset))?;
    handle.read_exact(&mut record)?;

    if record[0] != RECORD_SENTINEL {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("record {} has sentinel {:#04x}", column, record[0]),
        ));
    }

    let sum_at = record.len() - 4;
    let stored = u32::from_be_bytes([record[sum_at], record[sum_at + 1], record[sum_at + 2], record[sum_at + 3]]);
    let computed = checksum(&record[..sum_at]);
    if stored != computed {
        metrics::counter!(metric_defs::CHECKSUM_MISMATCHES.name).increment(1);
        warn!(
            "{}: record {} checksum mismatch (stored {}, computed {})",
            file.path().display(),
            column,
            stored,
            computed
        );
    }

    let posts = record[RECORD_PREFIX..sum_at]
        .chunks_exact(2)
        .map(|pair| decode_post([pair[0], pair[1]]))
        .collect();
    metrics::counter!(metric_defs::COLUMN_READS.name).increment(1);
    Ok(posts)
}

/// Unsigned byte sum used as the record checksum.
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |sum, b| sum.wrapping_add(*b as u32))
}

/// Decode a signed-magnitude post.
pub fn decode_post(bytes: [u8; 2]) -> i16 {
    let raw = u16::from_be_bytes(bytes);
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Encode a post as signed magnitude. `i16::MIN` saturates to -32767.
pub fn encode_post(value: i16) -> [u8; 2] {
    let raw = if value < 0 {
        0x8000 | value.unsigned_abs().min(0x7FFF)
    } else {
        value as u16
    };
    raw.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_magnitude() {
        assert_eq!(decode_post([0x00, 0x64]), 100);
        assert_eq!(decode_post([0x80, 0x64]), -100);
        assert_eq!(decode_post([0xFF, 0xFF]), -32767);
        assert_eq!(decode_post([0x80, 0x00]), 0);

        for value in [-32767i16, -1, 0, 1, 8848, 32767] {
            assert_eq!(decode_post(encode_post(value)), value);
        }
        assert_eq!(decode_post(encode_post(i16::MIN)), -32767);
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(&[0xAA, 0x01, 0x02]), 0xAA + 3);
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_release_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handle.bin");
        std::fs::write(&path, b"abcdef").unwrap();

        let mut file = MaybeOpenFile::open(&path).unwrap();
        assert!(file.is_open());
        file.release();
        file.release();
        assert!(!file.is_open());

        let mut buf = [0u8; 3];
        file.handle().unwrap().read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
        assert!(file.is_open());
        assert_eq!(file.reopen_count(), 1);
    }

    #[test]
    fn test_reopen_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.bin");
        std::fs::write(&path, b"abc").unwrap();

        let mut file = MaybeOpenFile::open(&path).unwrap();
        file.release();
        std::fs::remove_file(&path).unwrap();
        assert!(file.handle().is_err());
        assert!(!file.is_open());
    }
}
