//! Decoded named-data and segment tables

pub mod flatbuffer;
pub mod owned;
pub mod traits;

pub use owned::OwnedNamedData;
pub use traits::{DataSegment, NamedDataEntry, NamedDataTable, SegmentTable};
