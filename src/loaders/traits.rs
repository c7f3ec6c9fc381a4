//! Loader trait definition

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{
    buffers::FreeableBuffer,
    error::{BlobMapError, Result},
};

/// Kind of region a load request is reading.
///
/// This crate itself only issues `Program` (container header and metadata)
/// and `External` (named data). The other kinds are available to callers that
/// share one loader between a container and their own segment kinds, so a
/// loader can apply per-kind policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentType {
    /// The container's own header and metadata
    Program,
    /// Constant data stored inline with the program
    Constant,
    /// Data owned by an execution backend
    Backend,
    /// Mutable state initialised from the container
    Mutable,
    /// Externally-addressed named data
    External,
}

impl SegmentType {
    /// Get a human-readable name for the segment type
    pub fn name(&self) -> &'static str {
        match self {
            SegmentType::Program => "program",
            SegmentType::Constant => "constant",
            SegmentType::Backend => "backend",
            SegmentType::Mutable => "mutable",
            SegmentType::External => "external",
        }
    }
}

/// Tag passed with every load request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// What kind of region is being read
    pub segment_type: SegmentType,
    /// Index into the segment table, when the request targets a segment
    pub segment_index: usize,
}

impl SegmentInfo {
    pub fn new(segment_type: SegmentType, segment_index: usize) -> Self {
        Self {
            segment_type,
            segment_index,
        }
    }

    /// Header or metadata read
    pub fn program() -> Self {
        Self::new(SegmentType::Program, 0)
    }

    /// Named-data read for the given segment
    pub fn external(segment_index: usize) -> Self {
        Self::new(SegmentType::External, segment_index)
    }
}

/// Turns `(offset, size, kind)` requests into materialized bytes.
///
/// Implementations must be safe to call from several threads at once.
pub trait DataLoader: Send + Sync + std::fmt::Debug {
    /// Load `size` bytes starting at `offset`
    fn load(&self, offset: u64, size: u64, info: SegmentInfo) -> Result<FreeableBuffer>;

    /// Total number of bytes addressable through this loader
    fn size(&self) -> Result<u64>;

    /// Load `size` bytes starting at `offset` into `buffer`
    fn load_into(&self, offset: u64, size: u64, info: SegmentInfo, buffer: &mut [u8]) -> Result<()> {
        let len = to_usize(size, "size")?;
        if buffer.len() < len {
            return Err(BlobMapError::invalid_argument(
                "buffer",
                format!(
                    "destination holds {} bytes but {} were requested",
                    buffer.len(),
                    size
                ),
            ));
        }
        let loaded = self.load(offset, size, info)?;
        if loaded.size() != len {
            return Err(BlobMapError::corrupted(format!(
                "{} returned {} bytes for a {} byte request at offset {}",
                self.type_name(),
                loaded.size(),
                len,
                offset
            )));
        }
        buffer[..len].copy_from_slice(loaded.data());
        Ok(())
    }

    /// Get loader type name for debugging
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Validate `offset + size <= total` and convert to an index range
pub fn checked_range(offset: u64, size: u64, total: u64) -> Result<Range<usize>> {
    let end = offset
        .checked_add(size)
        .filter(|end| *end <= total)
        .ok_or_else(|| BlobMapError::out_of_bounds(offset, size, total))?;
    Ok(to_usize(offset, "offset")?..to_usize(end, "size")?)
}

pub(crate) fn to_usize(value: u64, parameter: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| {
        BlobMapError::invalid_argument(
            parameter,
            format!("{} does not fit in the address space", value),
        )
    })
}
