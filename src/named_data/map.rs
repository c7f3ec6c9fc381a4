//! Key to segment resolution with on-demand loading

use crate::{
    buffers::FreeableBuffer,
    error::{BlobMapError, Result},
    loaders::{DataLoader, SegmentInfo},
    tables::{DataSegment, NamedDataEntry, NamedDataTable, SegmentTable},
};

/// Read-only view resolving named data to externally-addressed segments.
///
/// The map borrows its loader and tables for `'a` and never mutates them, so
/// a shared reference can be used from several threads at once. Lookups scan
/// the named-data table in container order and the first entry whose key is
/// exactly equal to the requested key wins. Nothing is cached: every
/// successful [`NamedDataMap::get_data`] issues its own load.
#[derive(Clone, Copy)]
pub struct NamedDataMap<'a> {
    loader: &'a dyn DataLoader,
    segment_base_offset: u64,
    named_data: &'a dyn NamedDataTable,
    segments: &'a dyn SegmentTable,
}

/// A resolved lookup: the matching entry and its absolute byte range
struct Resolved {
    segment_index: usize,
    segment: DataSegment,
}

impl<'a> NamedDataMap<'a> {
    /// Create a map over the given collaborators.
    ///
    /// Any missing collaborator means the container carries no named data;
    /// that case is reported as `InvalidArgument` and callers should treat it
    /// as "nothing to look up" rather than corruption.
    pub fn create(
        loader: Option<&'a dyn DataLoader>,
        segment_base_offset: u64,
        named_data: Option<&'a dyn NamedDataTable>,
        segments: Option<&'a dyn SegmentTable>,
    ) -> Result<Self> {
        match (loader, named_data, segments) {
            (Some(loader), Some(named_data), Some(segments)) => Ok(Self {
                loader,
                segment_base_offset,
                named_data,
                segments,
            }),
            _ => Err(BlobMapError::invalid_argument(
                "named_data",
                "loader, named_data or segments is missing; most likely the program has no named data segments",
            )),
        }
    }

    /// Number of entries in the named-data table
    pub fn get_num_keys(&self) -> usize {
        self.named_data.len()
    }

    /// Key stored at ordinal `index`, borrowed from the table
    pub fn get_key(&self, index: usize) -> Result<&'a str> {
        let size = self.named_data.len();
        if index >= size {
            return Err(BlobMapError::invalid_argument(
                "index",
                format!(
                    "Index out of range: named_data size is {}, received index {}",
                    size, index
                ),
            ));
        }

        self.named_data
            .get(index)
            .and_then(|entry| entry.key)
            .ok_or_else(|| {
                BlobMapError::invalid_argument(
                    "named_data",
                    format!("NamedData at index {} is null", index),
                )
            })
    }

    /// Iterate keys in table order
    pub fn keys(&self) -> impl Iterator<Item = Result<&'a str>> + '_ {
        (0..self.get_num_keys()).map(move |index| self.get_key(index))
    }

    /// Load the bytes stored under `key`.
    ///
    /// Loader failures are returned unchanged.
    pub fn get_data(&self, key: &str) -> Result<FreeableBuffer> {
        let resolved = self.resolve(key)?;
        log::debug!(
            "Loading named data '{}' from segment {} ({} bytes at offset {})",
            key,
            resolved.segment_index,
            resolved.segment.size,
            resolved.segment.offset
        );
        self.loader.load(
            resolved.segment.offset,
            resolved.segment.size,
            SegmentInfo::external(resolved.segment_index),
        )
    }

    /// Load the bytes stored under `key` into `buffer`, returning the byte count
    pub fn load_data_into(&self, key: &str, buffer: &mut [u8]) -> Result<usize> {
        let resolved = self.resolve(key)?;
        self.loader.load_into(
            resolved.segment.offset,
            resolved.segment.size,
            SegmentInfo::external(resolved.segment_index),
            buffer,
        )?;
        // load_into already proved the size fits the caller's buffer
        Ok(resolved.segment.size as usize)
    }

    /// Absolute byte range of `key` without loading it
    pub fn get_segment(&self, key: &str) -> Result<DataSegment> {
        self.resolve(key).map(|resolved| resolved.segment)
    }

    fn resolve(&self, key: &str) -> Result<Resolved> {
        for index in 0..self.named_data.len() {
            let (stored, segment_index) = match self.named_data.get(index) {
                Some(NamedDataEntry {
                    key: Some(stored),
                    segment_index,
                }) => (stored, segment_index),
                _ => {
                    return Err(BlobMapError::invalid_argument(
                        "named_data",
                        format!(
                            "Searching for key {}: NamedData at index {} is null",
                            key, index
                        ),
                    ))
                }
            };

            if stored != key {
                log::trace!("Skipping named data '{}' at index {}", stored, index);
                continue;
            }

            return self.resolve_segment(key, segment_index as usize);
        }

        Err(BlobMapError::not_found(key))
    }

    fn resolve_segment(&self, key: &str, segment_index: usize) -> Result<Resolved> {
        let num_segments = self.segments.len();
        let segment = self
            .segments
            .get(segment_index)
            .filter(|_| segment_index < num_segments)
            .ok_or_else(|| {
                BlobMapError::invalid_argument(
                    "segment_index",
                    format!(
                        "Segment index {} for key {} is out of range for segments size {}",
                        segment_index, key, num_segments
                    ),
                )
            })?;

        let offset = self
            .segment_base_offset
            .checked_add(segment.offset)
            .ok_or_else(|| {
                BlobMapError::invalid_argument(
                    "segment_offset",
                    format!(
                        "Segment {} for key {} starts past the addressable range: base {} + offset {}",
                        segment_index, key, self.segment_base_offset, segment.offset
                    ),
                )
            })?;

        Ok(Resolved {
            segment_index,
            segment: DataSegment::new(offset, segment.size),
        })
    }
}

impl std::fmt::Debug for NamedDataMap<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedDataMap")
            .field("loader", &self.loader.type_name())
            .field("segment_base_offset", &self.segment_base_offset)
            .field("num_keys", &self.named_data.len())
            .field("num_segments", &self.segments.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::OwnedNamedData;
    use std::sync::Mutex;

    /// Records every request and serves zero-filled buffers
    #[derive(Debug, Default)]
    struct RecordingLoader {
        calls: Mutex<Vec<(u64, u64, SegmentInfo)>>,
    }

    impl RecordingLoader {
        fn calls(&self) -> Vec<(u64, u64, SegmentInfo)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DataLoader for RecordingLoader {
        fn load(&self, offset: u64, size: u64, info: SegmentInfo) -> Result<FreeableBuffer> {
            self.calls.lock().unwrap().push((offset, size, info));
            Ok(FreeableBuffer::from_vec(vec![0u8; size as usize]))
        }

        fn size(&self) -> Result<u64> {
            Ok(u64::MAX)
        }
    }

    fn weights_tables() -> (Vec<OwnedNamedData>, Vec<DataSegment>) {
        (
            vec![
                OwnedNamedData::new("weights.0", 0),
                OwnedNamedData::new("weights.1", 1),
            ],
            vec![DataSegment::new(100, 50), DataSegment::new(200, 75)],
        )
    }

    #[test]
    fn test_create_requires_every_collaborator() {
        let loader = RecordingLoader::default();
        let (named, segments) = weights_tables();

        let err = NamedDataMap::create(None, 0, Some(&named), Some(&segments)).unwrap_err();
        assert!(err.is_invalid_argument());
        let err = NamedDataMap::create(Some(&loader), 0, None, Some(&segments)).unwrap_err();
        assert!(err.is_invalid_argument());
        let err = NamedDataMap::create(Some(&loader), 0, Some(&named), None).unwrap_err();
        assert!(err.is_invalid_argument());

        assert!(NamedDataMap::create(Some(&loader), 0, Some(&named), Some(&segments)).is_ok());
        assert!(loader.calls().is_empty());
    }

    #[test]
    fn test_weights_scenario() {
        let loader = RecordingLoader::default();
        let (named, segments) = weights_tables();
        let map = NamedDataMap::create(Some(&loader), 1000, Some(&named), Some(&segments)).unwrap();

        assert_eq!(map.get_num_keys(), 2);

        let buffer = map.get_data("weights.1").unwrap();
        assert_eq!(buffer.size(), 75);
        assert_eq!(loader.calls(), vec![(1200, 75, SegmentInfo::external(1))]);

        let err = map.get_data("weights.2").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(loader.calls().len(), 1);
    }

    #[test]
    fn test_get_key_bounds() {
        let loader = RecordingLoader::default();
        let (named, segments) = weights_tables();
        let map = NamedDataMap::create(Some(&loader), 0, Some(&named), Some(&segments)).unwrap();

        assert_eq!(map.get_key(0).unwrap(), "weights.0");
        assert_eq!(map.get_key(1).unwrap(), "weights.1");

        let err = map.get_key(2).unwrap_err();
        match err {
            BlobMapError::InvalidArgument { message, .. } => {
                assert!(message.contains("size is 2"));
                assert!(message.contains("index 2"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(map.get_key(usize::MAX).is_err());
    }

    #[test]
    fn test_get_key_missing_key() {
        let loader = RecordingLoader::default();
        let named = vec![OwnedNamedData::without_key(0)];
        let segments = vec![DataSegment::new(0, 1)];
        let map = NamedDataMap::create(Some(&loader), 0, Some(&named), Some(&segments)).unwrap();

        let err = map.get_key(0).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(format!("{}", err).contains("is null"));
    }

    #[test]
    fn test_first_match_wins() {
        let loader = RecordingLoader::default();
        let named = vec![
            OwnedNamedData::new("dup", 1),
            OwnedNamedData::new("dup", 0),
        ];
        let segments = vec![DataSegment::new(0, 4), DataSegment::new(16, 8)];
        let map = NamedDataMap::create(Some(&loader), 0, Some(&named), Some(&segments)).unwrap();

        map.get_data("dup").unwrap();
        assert_eq!(loader.calls(), vec![(16, 8, SegmentInfo::external(1))]);
    }

    #[test]
    fn test_aliased_segments() {
        let loader = RecordingLoader::default();
        let named = vec![
            OwnedNamedData::new("encoder.embed", 0),
            OwnedNamedData::new("decoder.embed", 0),
        ];
        let segments = vec![DataSegment::new(64, 32)];
        let map = NamedDataMap::create(Some(&loader), 8, Some(&named), Some(&segments)).unwrap();

        assert_eq!(map.get_segment("encoder.embed").unwrap(), DataSegment::new(72, 32));
        assert_eq!(map.get_segment("decoder.embed").unwrap(), DataSegment::new(72, 32));
        assert!(loader.calls().is_empty());
    }

    #[test]
    fn test_keys_must_match_exactly() {
        let loader = RecordingLoader::default();
        let named = vec![OwnedNamedData::new("w", 0)];
        let segments = vec![DataSegment::new(0, 4)];
        let map = NamedDataMap::create(Some(&loader), 0, Some(&named), Some(&segments)).unwrap();

        // A stored key is not a prefix match for a longer request
        assert!(map.get_data("weights").unwrap_err().is_not_found());
        // Nor does a shorter request match a longer stored key
        let named = vec![OwnedNamedData::new("weights", 0)];
        let map = NamedDataMap::create(Some(&loader), 0, Some(&named), Some(&segments)).unwrap();
        assert!(map.get_data("w").unwrap_err().is_not_found());
        assert!(map.get_data("").unwrap_err().is_not_found());

        assert!(loader.calls().is_empty());
    }

    #[test]
    fn test_segment_index_out_of_range() {
        let loader = RecordingLoader::default();
        let named = vec![OwnedNamedData::new("broken", 5)];
        let segments = vec![DataSegment::new(0, 4)];
        let map = NamedDataMap::create(Some(&loader), 0, Some(&named), Some(&segments)).unwrap();

        let err = map.get_data("broken").unwrap_err();
        match err {
            BlobMapError::InvalidArgument { message, .. } => {
                assert!(message.contains("Segment index 5"));
                assert!(message.contains("broken"));
                assert!(message.contains("segments size 1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(loader.calls().is_empty());
    }

    #[test]
    fn test_null_entry_checked_lazily() {
        let loader = RecordingLoader::default();
        let named = vec![
            Some(OwnedNamedData::new("first", 0)),
            None,
            Some(OwnedNamedData::new("third", 0)),
        ];
        let segments = vec![DataSegment::new(0, 4)];
        let map = NamedDataMap::create(Some(&loader), 0, Some(&named), Some(&segments)).unwrap();

        // Entries after the match are never inspected
        assert!(map.get_data("first").is_ok());

        let err = map.get_data("third").unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(format!("{}", err).contains("index 1"));
        assert_eq!(loader.calls().len(), 1);
    }

    #[test]
    fn test_offset_overflow_is_reported() {
        let loader = RecordingLoader::default();
        let named = vec![OwnedNamedData::new("far", 0)];
        let segments = vec![DataSegment::new(u64::MAX, 1)];
        let map = NamedDataMap::create(Some(&loader), 1, Some(&named), Some(&segments)).unwrap();

        assert!(map.get_data("far").unwrap_err().is_invalid_argument());
        assert!(loader.calls().is_empty());
    }

    #[test]
    fn test_repeated_loads_are_independent() {
        let loader = RecordingLoader::default();
        let (named, segments) = weights_tables();
        let map = NamedDataMap::create(Some(&loader), 1000, Some(&named), Some(&segments)).unwrap();

        let first = map.get_data("weights.0").unwrap();
        let second = map.get_data("weights.0").unwrap();
        drop(first);
        assert_eq!(second.size(), 50);

        let calls = loader.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (1100, 50, SegmentInfo::external(0)));
        assert_eq!(calls[0], calls[1]);
    }

    /// Serves fewer bytes than each request asks for
    #[derive(Debug)]
    struct ShortReadLoader;

    impl DataLoader for ShortReadLoader {
        fn load(&self, _offset: u64, size: u64, _info: SegmentInfo) -> Result<FreeableBuffer> {
            Ok(FreeableBuffer::from_vec(vec![9u8; (size / 2) as usize]))
        }

        fn size(&self) -> Result<u64> {
            Ok(u64::MAX)
        }
    }

    #[test]
    fn test_load_data_into_short_loader_is_an_error() {
        let loader = ShortReadLoader;
        let named = vec![OwnedNamedData::new("w", 0)];
        let segments = vec![DataSegment::new(0, 8)];
        let map = NamedDataMap::create(Some(&loader), 0, Some(&named), Some(&segments)).unwrap();

        let mut dest = [0u8; 8];
        let err = map.load_data_into("w", &mut dest).unwrap_err();
        assert!(matches!(err, BlobMapError::Corrupted { .. }));
        assert_eq!(dest, [0u8; 8]);
    }

    #[test]
    fn test_keys_iterator() {
        let loader = RecordingLoader::default();
        let (named, segments) = weights_tables();
        let map = NamedDataMap::create(Some(&loader), 0, Some(&named), Some(&segments)).unwrap();

        let keys: Vec<&str> = map.keys().collect::<Result<_>>().unwrap();
        assert_eq!(keys, vec!["weights.0", "weights.1"]);
    }

    #[test]
    fn test_map_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NamedDataMap<'static>>();

        let loader = RecordingLoader::default();
        let (named, segments) = weights_tables();
        let map = NamedDataMap::create(Some(&loader), 0, Some(&named), Some(&segments)).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    assert_eq!(map.get_data("weights.1").unwrap().size(), 75);
                });
            }
        });
        assert_eq!(loader.calls().len(), 4);
    }
}
