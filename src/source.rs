//! Random-access byte sources backing an archive.
//!
//! The reader consumes bytes through the minimal [`ArchiveSource`] contract
//! so that files, memory maps and in-memory buffers are interchangeable.
//! Reads must be callable concurrently from multiple threads; if an exotic
//! source cannot provide that, the caller wraps it.

use std::ops::Deref;
use std::sync::Arc;

#[cfg(feature = "mmap")]
use std::fs::File;
use std::path::Path;

#[cfg(feature = "mmap")]
use memmap2::Mmap;

use crate::error::Result;

/// Contract required of a byte source by the archive reader.
///
/// `read` returns `false` on any failure (short read, out-of-range offset,
/// device error); the reader maps that to an I/O error with context.
pub trait ArchiveSource: Send + Sync {
    /// Total size of the source in bytes.
    fn size(&self) -> u64;

    /// Reads `dest.len()` bytes starting at `offset`. Must be safe to call
    /// concurrently with other reads.
    fn read(&self, offset: u64, dest: &mut [u8]) -> bool;
}

/// Default [`ArchiveSource`]: a memory-mapped file or an owned buffer.
///
/// Cheap to clone (`Arc`-based) and safe to share across threads. The file
/// behind a map must not be modified while the source is alive; archives are
/// written once and read many times, so this holds by convention.
#[derive(Debug, Clone)]
pub enum DataSource {
    /// Memory-mapped file contents.
    #[cfg(feature = "mmap")]
    Mmap(Arc<Mmap>),
    /// Owned in-memory bytes.
    Memory(Arc<Vec<u8>>),
}

impl Deref for DataSource {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        match self {
            #[cfg(feature = "mmap")]
            Self::Mmap(mmap) => mmap.as_ref(),
            Self::Memory(vec) => vec.as_slice(),
        }
    }
}

impl DataSource {
    /// Opens a file as an archive source.
    ///
    /// With the `mmap` feature (default) the file is memory-mapped;
    /// otherwise it is read into RAM.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        #[cfg(feature = "mmap")]
        {
            let file = File::open(path)?;
            #[allow(unsafe_code)]
            // SAFETY: archives are immutable once written; the map is never
            // observed concurrently with writes to the file.
            let mmap = unsafe { Mmap::map(&file)? };
            Ok(Self::Mmap(Arc::new(mmap)))
        }

        #[cfg(not(feature = "mmap"))]
        {
            let bytes = std::fs::read(path)?;
            Ok(Self::Memory(Arc::new(bytes)))
        }
    }

    /// Wraps an in-memory buffer, the entry point for tests and for
    /// platforms without file access.
    pub fn from_bytes(data: impl Into<Arc<Vec<u8>>>) -> Self {
        Self::Memory(data.into())
    }
}

impl ArchiveSource for DataSource {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read(&self, offset: u64, dest: &mut [u8]) -> bool {
        let Ok(start) = usize::try_from(offset) else {
            return false;
        };
        let Some(end) = start.checked_add(dest.len()) else {
            return false;
        };
        match self.get(start..end) {
            Some(src) => {
                dest.copy_from_slice(src);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_reads_in_bounds() {
        let source = DataSource::from_bytes(vec![10, 20, 30, 40]);
        assert_eq!(source.size(), 4);

        let mut buf = [0u8; 2];
        assert!(source.read(1, &mut buf));
        assert_eq!(buf, [20, 30]);
    }

    #[test]
    fn out_of_range_read_fails() {
        let source = DataSource::from_bytes(vec![1, 2, 3]);
        let mut buf = [0u8; 2];
        assert!(!source.read(2, &mut buf));
        assert!(!source.read(u64::MAX, &mut buf));
    }
}
