//! Read-only table accessors consumed by the named-data map

use serde::{Deserialize, Serialize};

/// One row of the named-data table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedDataEntry<'a> {
    /// Lookup key; `None` when the container omitted it
    pub key: Option<&'a str>,
    /// Index into the segment table
    pub segment_index: u32,
}

/// Byte range of one segment, relative to the segment base offset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataSegment {
    pub offset: u64,
    pub size: u64,
}

impl DataSegment {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }
}

/// Decoded named-data table
pub trait NamedDataTable: Send + Sync {
    /// Number of entries
    fn len(&self) -> usize;

    /// Entry at `index`.
    ///
    /// `None` for an out-of-range index or for an entry the container stores
    /// as null.
    fn get(&self, index: usize) -> Option<NamedDataEntry<'_>>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decoded segment table
pub trait SegmentTable: Send + Sync {
    /// Number of segments
    fn len(&self) -> usize;

    /// Segment at `index`, `None` when out of range
    fn get(&self, index: usize) -> Option<DataSegment>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
