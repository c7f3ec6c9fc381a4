//! In-memory table implementations

use serde::{Deserialize, Serialize};

use super::traits::{DataSegment, NamedDataEntry, NamedDataTable, SegmentTable};

/// Owned named-data row, handy for tables built at runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedNamedData {
    pub key: Option<String>,
    pub segment_index: u32,
}

impl OwnedNamedData {
    pub fn new(key: impl Into<String>, segment_index: u32) -> Self {
        Self {
            key: Some(key.into()),
            segment_index,
        }
    }

    /// A row whose key is missing
    pub fn without_key(segment_index: u32) -> Self {
        Self {
            key: None,
            segment_index,
        }
    }

    fn entry(&self) -> NamedDataEntry<'_> {
        NamedDataEntry {
            key: self.key.as_deref(),
            segment_index: self.segment_index,
        }
    }
}

impl NamedDataTable for Vec<OwnedNamedData> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn get(&self, index: usize) -> Option<NamedDataEntry<'_>> {
        self.as_slice().get(index).map(OwnedNamedData::entry)
    }
}

/// Rows stored as `None` are reported as null entries
impl NamedDataTable for Vec<Option<OwnedNamedData>> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn get(&self, index: usize) -> Option<NamedDataEntry<'_>> {
        self.as_slice()
            .get(index)
            .and_then(Option::as_ref)
            .map(OwnedNamedData::entry)
    }
}

impl SegmentTable for Vec<DataSegment> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn get(&self, index: usize) -> Option<DataSegment> {
        self.as_slice().get(index).copied()
    }
}
