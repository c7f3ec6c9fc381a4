//! Loader over bytes already resident in memory

use std::sync::Arc;

use crate::{buffers::FreeableBuffer, error::Result};

use super::traits::{checked_range, DataLoader, SegmentInfo};

/// Serves zero-copy windows of an in-memory byte source
#[derive(Debug, Clone)]
pub struct BufferDataLoader {
    data: Arc<[u8]>,
}

impl BufferDataLoader {
    /// Create a loader over `data`
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    /// Get the underlying bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl DataLoader for BufferDataLoader {
    fn load(&self, offset: u64, size: u64, _info: SegmentInfo) -> Result<FreeableBuffer> {
        let range = checked_range(offset, size, self.data.len() as u64)?;
        if range.is_empty() {
            return Ok(FreeableBuffer::empty());
        }
        FreeableBuffer::from_shared(self.data.clone(), range)
    }

    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}
