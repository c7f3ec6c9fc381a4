//! FlatBuffers accessors for container metadata
//!
//! Mirrors the schema below, laid out the way `flatc --rust` emits it:
//!
//! ```text
//! file_identifier "BMAP";
//!
//! table NamedData   { key: string; segment_index: uint32; }
//! table Segment     { offset: uint64; size: uint64; }
//! table DataContainer {
//!   version: uint32;
//!   named_data: [NamedData];
//!   segments: [Segment];
//! }
//! root_type DataContainer;
//! ```

use flatbuffers::{
    FlatBufferBuilder, Follow, ForwardsUOffset, InvalidFlatbuffer, Table, Vector, Verifiable,
    Verifier, VerifierOptions, VOffsetT, WIPOffset,
};

use crate::error::{BlobMapError, Result};

/// File identifier stored in the metadata flatbuffer
pub const CONTAINER_IDENTIFIER: &str = "BMAP";

/// Metadata schema version written by this crate
pub const SCHEMA_VERSION: u32 = 1;

/// Root offset plus file identifier
const MIN_METADATA_SIZE: usize = 8;

// ---------------------------------------------------------------------------
// NamedData
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, PartialEq)]
pub struct NamedData<'a> {
    pub _tab: Table<'a>,
}

impl<'a> Follow<'a> for NamedData<'a> {
    type Inner = NamedData<'a>;

    #[inline]
    unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
        Self {
            _tab: Table::new(buf, loc),
        }
    }
}

impl<'a> NamedData<'a> {
    pub const VT_KEY: VOffsetT = 4;
    pub const VT_SEGMENT_INDEX: VOffsetT = 6;

    #[inline]
    pub fn key(&self) -> Option<&'a str> {
        // Safety: created from a verified buffer
        unsafe { self._tab.get::<ForwardsUOffset<&str>>(NamedData::VT_KEY, None) }
    }

    #[inline]
    pub fn segment_index(&self) -> u32 {
        // Safety: created from a verified buffer
        unsafe {
            self._tab
                .get::<u32>(NamedData::VT_SEGMENT_INDEX, Some(0))
                .unwrap_or(0)
        }
    }

    pub fn create<'fbb>(
        fbb: &mut FlatBufferBuilder<'fbb>,
        key: Option<&str>,
        segment_index: u32,
    ) -> WIPOffset<NamedData<'fbb>> {
        let key = key.map(|k| fbb.create_string(k));
        let start = fbb.start_table();
        fbb.push_slot::<u32>(NamedData::VT_SEGMENT_INDEX, segment_index, 0);
        if let Some(key) = key {
            fbb.push_slot_always::<WIPOffset<_>>(NamedData::VT_KEY, key);
        }
        let end = fbb.end_table(start);
        WIPOffset::new(end.value())
    }
}

impl Verifiable for NamedData<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<&str>>("key", Self::VT_KEY, false)?
            .visit_field::<u32>("segment_index", Self::VT_SEGMENT_INDEX, false)?
            .finish();
        Ok(())
    }
}

impl std::fmt::Debug for NamedData<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedData")
            .field("key", &self.key())
            .field("segment_index", &self.segment_index())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, PartialEq)]
pub struct Segment<'a> {
    pub _tab: Table<'a>,
}

impl<'a> Follow<'a> for Segment<'a> {
    type Inner = Segment<'a>;

    #[inline]
    unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
        Self {
            _tab: Table::new(buf, loc),
        }
    }
}

impl<'a> Segment<'a> {
    pub const VT_OFFSET: VOffsetT = 4;
    pub const VT_SIZE: VOffsetT = 6;

    #[inline]
    pub fn offset(&self) -> u64 {
        // Safety: created from a verified buffer
        unsafe {
            self._tab
                .get::<u64>(Segment::VT_OFFSET, Some(0))
                .unwrap_or(0)
        }
    }

    #[inline]
    pub fn size(&self) -> u64 {
        // Safety: created from a verified buffer
        unsafe {
            self._tab
                .get::<u64>(Segment::VT_SIZE, Some(0))
                .unwrap_or(0)
        }
    }

    pub fn create<'fbb>(
        fbb: &mut FlatBufferBuilder<'fbb>,
        offset: u64,
        size: u64,
    ) -> WIPOffset<Segment<'fbb>> {
        let start = fbb.start_table();
        fbb.push_slot::<u64>(Segment::VT_SIZE, size, 0);
        fbb.push_slot::<u64>(Segment::VT_OFFSET, offset, 0);
        let end = fbb.end_table(start);
        WIPOffset::new(end.value())
    }
}

impl std::fmt::Debug for Segment<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("offset", &self.offset())
            .field("size", &self.size())
            .finish()
    }
}

impl Verifiable for Segment<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<u64>("offset", Self::VT_OFFSET, false)?
            .visit_field::<u64>("size", Self::VT_SIZE, false)?
            .finish();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DataContainer
// ---------------------------------------------------------------------------

pub type NamedDataVector<'a> = Vector<'a, ForwardsUOffset<NamedData<'a>>>;
pub type SegmentVector<'a> = Vector<'a, ForwardsUOffset<Segment<'a>>>;

#[derive(Copy, Clone, PartialEq)]
pub struct DataContainer<'a> {
    pub _tab: Table<'a>,
}

impl<'a> Follow<'a> for DataContainer<'a> {
    type Inner = DataContainer<'a>;

    #[inline]
    unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
        Self {
            _tab: Table::new(buf, loc),
        }
    }
}

impl<'a> DataContainer<'a> {
    pub const VT_VERSION: VOffsetT = 4;
    pub const VT_NAMED_DATA: VOffsetT = 6;
    pub const VT_SEGMENTS: VOffsetT = 8;

    #[inline]
    pub fn version(&self) -> u32 {
        // Safety: created from a verified buffer
        unsafe {
            self._tab
                .get::<u32>(DataContainer::VT_VERSION, Some(0))
                .unwrap_or(0)
        }
    }

    #[inline]
    pub fn named_data(&self) -> Option<NamedDataVector<'a>> {
        // Safety: created from a verified buffer
        unsafe {
            self._tab
                .get::<ForwardsUOffset<NamedDataVector<'a>>>(DataContainer::VT_NAMED_DATA, None)
        }
    }

    #[inline]
    pub fn segments(&self) -> Option<SegmentVector<'a>> {
        // Safety: created from a verified buffer
        unsafe {
            self._tab
                .get::<ForwardsUOffset<SegmentVector<'a>>>(DataContainer::VT_SEGMENTS, None)
        }
    }
}

impl std::fmt::Debug for DataContainer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataContainer")
            .field("version", &self.version())
            .field("named_data", &self.named_data().map(|v| v.len()))
            .field("segments", &self.segments().map(|v| v.len()))
            .finish()
    }
}

impl Verifiable for DataContainer<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<u32>("version", Self::VT_VERSION, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<NamedData>>>>(
                "named_data",
                Self::VT_NAMED_DATA,
                false,
            )?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Segment>>>>(
                "segments",
                Self::VT_SEGMENTS,
                false,
            )?
            .finish();
        Ok(())
    }
}

/// Rows fed to [`build_metadata`]
pub struct MetadataRows<'r> {
    pub named_data: Option<&'r [(Option<&'r str>, u32)]>,
    pub segments: Option<&'r [(u64, u64)]>,
}

/// Serialize container metadata into a finished flatbuffer
pub fn build_metadata(rows: &MetadataRows<'_>) -> Vec<u8> {
    let mut fbb = FlatBufferBuilder::new();

    let named_data = rows.named_data.map(|entries| {
        let offsets: Vec<_> = entries
            .iter()
            .map(|(key, segment_index)| NamedData::create(&mut fbb, *key, *segment_index))
            .collect();
        fbb.create_vector(&offsets)
    });
    let segments = rows.segments.map(|segments| {
        let offsets: Vec<_> = segments
            .iter()
            .map(|(offset, size)| Segment::create(&mut fbb, *offset, *size))
            .collect();
        fbb.create_vector(&offsets)
    });

    let start = fbb.start_table();
    if let Some(segments) = segments {
        fbb.push_slot_always::<WIPOffset<_>>(DataContainer::VT_SEGMENTS, segments);
    }
    if let Some(named_data) = named_data {
        fbb.push_slot_always::<WIPOffset<_>>(DataContainer::VT_NAMED_DATA, named_data);
    }
    fbb.push_slot::<u32>(DataContainer::VT_VERSION, SCHEMA_VERSION, 0);
    let end = fbb.end_table(start);
    let root: WIPOffset<DataContainer> = WIPOffset::new(end.value());

    fbb.finish(root, Some(CONTAINER_IDENTIFIER));
    fbb.finished_data().to_vec()
}

/// Verify `bytes` and return the metadata root
pub fn root_as_container(bytes: &[u8]) -> Result<DataContainer<'_>> {
    if bytes.len() < MIN_METADATA_SIZE {
        return Err(BlobMapError::corrupted(format!(
            "metadata is {} bytes, smaller than a flatbuffer root",
            bytes.len()
        )));
    }
    if !flatbuffers::buffer_has_identifier(bytes, CONTAINER_IDENTIFIER, false) {
        return Err(BlobMapError::corrupted(format!(
            "metadata does not carry the '{}' identifier",
            CONTAINER_IDENTIFIER
        )));
    }

    let opts = VerifierOptions::default();
    let container = flatbuffers::root_with_opts::<DataContainer>(&opts, bytes)?;
    if container.version() != SCHEMA_VERSION {
        return Err(BlobMapError::corrupted(format!(
            "unsupported metadata version {} (expected {})",
            container.version(),
            SCHEMA_VERSION
        )));
    }
    Ok(container)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_layout() {
        let named = [(Some("weights.0"), 0u32), (Some("weights.1"), 1u32)];
        let segments = [(0u64, 50u64), (64, 75)];
        let bytes = build_metadata(&MetadataRows {
            named_data: Some(&named),
            segments: Some(&segments),
        });

        let container = root_as_container(&bytes).unwrap();
        let named_data = container.named_data().unwrap();
        assert_eq!(named_data.len(), 2);
        assert_eq!(named_data.get(1).key(), Some("weights.1"));
        assert_eq!(named_data.get(1).segment_index(), 1);

        let segments = container.segments().unwrap();
        assert_eq!(segments.get(1).offset(), 64);
        assert_eq!(segments.get(1).size(), 75);
    }

    #[test]
    fn test_missing_vectors_and_keys() {
        let named = [(None, 0u32)];
        let bytes = build_metadata(&MetadataRows {
            named_data: Some(&named),
            segments: None,
        });

        let container = root_as_container(&bytes).unwrap();
        assert!(container.segments().is_none());
        assert_eq!(container.named_data().unwrap().get(0).key(), None);
    }

    #[test]
    fn test_rejects_truncated_bytes() {
        let err = root_as_container(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, BlobMapError::Corrupted { .. }));
    }

    #[test]
    fn test_container_debug_summarizes_tables() {
        let named = [(Some("a"), 0u32)];
        let bytes = build_metadata(&MetadataRows {
            named_data: Some(&named),
            segments: None,
        });
        let container = root_as_container(&bytes).unwrap();
        let debug = format!("{:?}", container);
        assert!(debug.contains("version: 1"));
        assert!(debug.contains("named_data: Some(1)"));
        assert!(debug.contains("segments: None"));
    }

    #[test]
    fn test_rejects_foreign_bytes() {
        let err = root_as_container(b"not a flatbuffer at all").unwrap_err();
        assert!(matches!(err, BlobMapError::Corrupted { .. }));
    }
}
