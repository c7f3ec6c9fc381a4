//! Loader serving zero-copy windows of a memory-mapped file

use std::{
    collections::HashMap,
    fs::File,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use memmap2::{Mmap, MmapOptions};

use crate::{
    buffers::FreeableBuffer,
    error::{BlobMapError, Result},
};

use super::{
    config::MlockConfig,
    traits::{checked_range, DataLoader, SegmentInfo},
};

/// Lock count per page address, shared by every buffer the loader pinned
type PageLocks = Arc<Mutex<HashMap<usize, usize>>>;

/// Maps a container file read-only and hands out slices of the mapping.
///
/// Every returned buffer keeps the mapping alive, so buffers may outlive the
/// loader itself. Kernel page locks do not nest, so locked pages are counted
/// here and a page is only unlocked once the last buffer covering it is freed.
#[derive(Debug)]
pub struct MmapDataLoader {
    mmap: Arc<Mmap>,
    path: PathBuf,
    mlock: MlockConfig,
    page_locks: PageLocks,
}

impl MmapDataLoader {
    /// Map `path` read-only
    pub fn from_path(path: impl AsRef<Path>, mlock: MlockConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| BlobMapError::from_io(e, "Failed to open container file"))?;

        // The file is opened read-only and the mapping is never written through
        let mmap = unsafe {
            MmapOptions::new()
                .map(&file)
                .map_err(|e| BlobMapError::from_io(e, "Failed to create memory mapping"))?
        };

        Ok(Self {
            mmap: Arc::new(mmap),
            path: path.to_path_buf(),
            mlock,
            page_locks: PageLocks::default(),
        })
    }

    /// Get the path this loader maps
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the page locking policy
    pub fn mlock(&self) -> MlockConfig {
        self.mlock
    }

    /// Number of distinct pages currently pinned by live buffers
    pub fn locked_pages(&self) -> usize {
        lock_counts(&self.page_locks).len()
    }

    /// Lock the pages backing `buffer` and attach the matching unlock step
    fn lock_range(&self, buffer: FreeableBuffer) -> Result<FreeableBuffer> {
        let page_size = page_size();
        let addr = buffer.data().as_ptr() as usize;
        let start = addr & !(page_size - 1);
        let len = addr + buffer.size() - start;

        // Counts stay locked from mlock until they cover the new pages
        let mut counts = lock_counts(&self.page_locks);
        let rc = unsafe { libc::mlock(start as *const libc::c_void, len) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            return match self.mlock {
                MlockConfig::UseMlockIgnoreErrors => {
                    log::warn!("Ignoring mlock failure for {} bytes: {}", len, err);
                    Ok(buffer)
                }
                _ => Err(BlobMapError::memory(format!(
                    "mlock of {} bytes failed: {}",
                    len, err
                ))),
            };
        }

        let pages: Vec<usize> = (start..start + len).step_by(page_size).collect();
        for page in &pages {
            *counts.entry(*page).or_insert(0) += 1;
        }
        drop(counts);

        let mapping = self.mmap.clone();
        let page_locks = self.page_locks.clone();
        Ok(buffer.with_release(move || {
            let mut counts = lock_counts(&page_locks);
            let mut released = Vec::new();
            for page in pages {
                let count = counts.entry(page).or_insert(1);
                *count -= 1;
                if *count == 0 {
                    counts.remove(&page);
                    released.push(page);
                }
            }

            for (run_start, run_len) in page_runs(&released, page_size) {
                let rc = unsafe { libc::munlock(run_start as *const libc::c_void, run_len) };
                if rc != 0 {
                    log::warn!(
                        "Failed to munlock {} bytes: {}",
                        run_len,
                        std::io::Error::last_os_error()
                    );
                }
            }
            drop(counts);
            drop(mapping);
        }))
    }
}

fn lock_counts(locks: &Mutex<HashMap<usize, usize>>) -> MutexGuard<'_, HashMap<usize, usize>> {
    locks.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Merge ascending page addresses into contiguous `(start, len)` runs
fn page_runs(pages: &[usize], page_size: usize) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for &page in pages {
        match runs.last_mut() {
            Some((start, len)) if *start + *len == page => *len += page_size,
            _ => runs.push((page, page_size)),
        }
    }
    runs
}

impl DataLoader for MmapDataLoader {
    fn load(&self, offset: u64, size: u64, _info: SegmentInfo) -> Result<FreeableBuffer> {
        let range = checked_range(offset, size, self.mmap.len() as u64)?;
        if range.is_empty() {
            return Ok(FreeableBuffer::empty());
        }

        let buffer = FreeableBuffer::from_mapped(self.mmap.clone(), range)?;
        match self.mlock {
            MlockConfig::NoMlock => Ok(buffer),
            MlockConfig::UseMlock | MlockConfig::UseMlockIgnoreErrors => self.lock_range(buffer),
        }
    }

    fn size(&self) -> Result<u64> {
        Ok(self.mmap.len() as u64)
    }
}

fn page_size() -> usize {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        size if size > 0 => size as usize,
        _ => 4096,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file_with(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_mapped_window() {
        let file = temp_file_with(b"metadata..weights");
        let loader = MmapDataLoader::from_path(file.path(), MlockConfig::NoMlock).unwrap();
        assert_eq!(loader.size().unwrap(), 17);

        let buffer = loader.load(10, 7, SegmentInfo::external(0)).unwrap();
        assert_eq!(buffer.data(), b"weights");
    }

    #[test]
    fn test_buffer_outlives_loader() {
        let file = temp_file_with(b"persistent bytes");
        let loader = MmapDataLoader::from_path(file.path(), MlockConfig::NoMlock).unwrap();
        let buffer = loader.load(0, 10, SegmentInfo::external(0)).unwrap();
        drop(loader);
        assert_eq!(buffer.data(), b"persistent");
    }

    #[test]
    fn test_mlock_ignore_errors_always_loads() {
        let file = temp_file_with(&[7u8; 8192]);
        let loader =
            MmapDataLoader::from_path(file.path(), MlockConfig::UseMlockIgnoreErrors).unwrap();
        let mut buffer = loader.load(100, 5000, SegmentInfo::external(2)).unwrap();
        assert_eq!(buffer.size(), 5000);
        assert!(buffer.iter().all(|b| *b == 7));
        buffer.free();
        assert!(buffer.is_freed());
    }

    #[test]
    fn test_shared_pages_stay_locked_until_last_release() {
        let file = temp_file_with(&[3u8; 8192]);
        let loader =
            MmapDataLoader::from_path(file.path(), MlockConfig::UseMlockIgnoreErrors).unwrap();

        let mut first = loader.load(0, 100, SegmentInfo::external(0)).unwrap();
        if loader.locked_pages() == 0 {
            // RLIMIT_MEMLOCK refused the lock, so nothing is tracked
            return;
        }
        let second = loader.load(0, 100, SegmentInfo::external(0)).unwrap();
        assert_eq!(loader.locked_pages(), 1);

        first.free();
        assert_eq!(loader.locked_pages(), 1);
        assert_eq!(second.data(), &[3u8; 100][..]);

        drop(second);
        assert_eq!(loader.locked_pages(), 0);
    }

    #[test]
    fn test_page_runs() {
        assert!(page_runs(&[], 4096).is_empty());
        assert_eq!(
            page_runs(&[0, 4096, 8192, 16384], 4096),
            vec![(0, 12288), (16384, 4096)]
        );
    }

    #[test]
    fn test_out_of_range() {
        let file = temp_file_with(b"tiny");
        let loader = MmapDataLoader::from_path(file.path(), MlockConfig::NoMlock).unwrap();
        assert!(loader.load(1, 4, SegmentInfo::external(0)).is_err());
    }
}
