//! Table traits over verified container metadata

use flatbuffers::Vector;

use crate::container::schema::{NamedDataVector, SegmentVector};

use super::traits::{DataSegment, NamedDataEntry, NamedDataTable, SegmentTable};

impl<'a> NamedDataTable for NamedDataVector<'a> {
    fn len(&self) -> usize {
        Vector::len(self)
    }

    fn get(&self, index: usize) -> Option<NamedDataEntry<'_>> {
        if index >= Vector::len(self) {
            return None;
        }
        let entry = Vector::get(self, index);
        Some(NamedDataEntry {
            key: entry.key(),
            segment_index: entry.segment_index(),
        })
    }
}

impl<'a> SegmentTable for SegmentVector<'a> {
    fn len(&self) -> usize {
        Vector::len(self)
    }

    fn get(&self, index: usize) -> Option<DataSegment> {
        if index >= Vector::len(self) {
            return None;
        }
        let segment = Vector::get(self, index);
        Some(DataSegment::new(segment.offset(), segment.size()))
    }
}
