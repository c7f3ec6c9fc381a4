//! Loaded byte ranges with exclusive ownership and a one-shot release step

use std::{fmt, ops::Deref, ops::Range, sync::Arc};

use memmap2::Mmap;

use crate::error::{BlobMapError, Result};

/// Callback run exactly once when a buffer is freed
pub type ReleaseFn = Box<dyn FnOnce() + Send + Sync>;

/// Where the bytes of a [`FreeableBuffer`] live
enum Storage {
    /// Nothing left to read (zero-length load or already freed)
    Empty,
    /// Heap bytes owned by this buffer
    Owned(Box<[u8]>),
    /// Window into a shared in-memory source
    Shared { bytes: Arc<[u8]>, range: Range<usize> },
    /// Window into a shared read-only memory map
    Mapped { map: Arc<Mmap>, range: Range<usize> },
    /// Bytes with static lifetime
    Static(&'static [u8]),
}

/// A loaded byte range owned exclusively by its holder.
///
/// The release step (dropping the backing storage and running the optional
/// release callback) happens exactly once: either on an explicit
/// [`FreeableBuffer::free`] or when the buffer is dropped.
pub struct FreeableBuffer {
    storage: Storage,
    release: Option<ReleaseFn>,
    freed: bool,
}

impl FreeableBuffer {
    /// Create an empty buffer
    pub fn empty() -> Self {
        Self::with_storage(Storage::Empty)
    }

    /// Take ownership of heap bytes
    pub fn from_vec(data: Vec<u8>) -> Self {
        if data.is_empty() {
            return Self::empty();
        }
        Self::with_storage(Storage::Owned(data.into_boxed_slice()))
    }

    /// Wrap bytes with static lifetime
    pub fn from_static(data: &'static [u8]) -> Self {
        Self::with_storage(Storage::Static(data))
    }

    /// Borrow `range` out of a shared in-memory source without copying
    pub fn from_shared(bytes: Arc<[u8]>, range: Range<usize>) -> Result<Self> {
        Self::check_range(&range, bytes.len())?;
        Ok(Self::with_storage(Storage::Shared { bytes, range }))
    }

    /// Borrow `range` out of a shared memory map without copying
    pub fn from_mapped(map: Arc<Mmap>, range: Range<usize>) -> Result<Self> {
        Self::check_range(&range, map.len())?;
        Ok(Self::with_storage(Storage::Mapped { map, range }))
    }

    /// Attach a callback that runs once when the buffer is freed
    pub fn with_release<F>(mut self, release: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.release = Some(Box::new(release));
        self
    }

    fn with_storage(storage: Storage) -> Self {
        Self {
            storage,
            release: None,
            freed: false,
        }
    }

    fn check_range(range: &Range<usize>, len: usize) -> Result<()> {
        if range.start > range.end || range.end > len {
            return Err(BlobMapError::out_of_bounds(
                range.start as u64,
                range.end.saturating_sub(range.start) as u64,
                len as u64,
            ));
        }
        Ok(())
    }

    /// Get the buffer contents
    pub fn data(&self) -> &[u8] {
        match &self.storage {
            Storage::Empty => &[],
            Storage::Owned(bytes) => bytes,
            Storage::Shared { bytes, range } => &bytes[range.clone()],
            Storage::Mapped { map, range } => &map[range.clone()],
            Storage::Static(bytes) => bytes,
        }
    }

    /// Get the size of the buffer in bytes
    pub fn size(&self) -> usize {
        self.data().len()
    }

    /// Check whether the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Check whether the release step already ran
    pub fn is_freed(&self) -> bool {
        self.freed
    }

    /// Release the backing storage now. Calling this more than once is a no-op.
    pub fn free(&mut self) {
        if self.freed {
            return;
        }
        self.freed = true;
        // Storage goes first so a release callback never sees live borrowed bytes
        self.storage = Storage::Empty;
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Default for FreeableBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for FreeableBuffer {
    fn drop(&mut self) {
        self.free();
    }
}

impl Deref for FreeableBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data()
    }
}

impl AsRef<[u8]> for FreeableBuffer {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

impl fmt::Debug for FreeableBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.storage {
            Storage::Empty => "empty",
            Storage::Owned(_) => "owned",
            Storage::Shared { .. } => "shared",
            Storage::Mapped { .. } => "mapped",
            Storage::Static(_) => "static",
        };
        f.debug_struct("FreeableBuffer")
            .field("kind", &kind)
            .field("size", &self.size())
            .field("freed", &self.freed)
            .field("has_release", &self.release.is_some())
            .finish()
    }
}
