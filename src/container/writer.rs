//! Building container files

use std::{
    collections::HashSet,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::error::{BlobMapError, Result};

use super::{
    header::{ContainerHeader, HEADER_SIZE},
    schema::{build_metadata, MetadataRows},
};

/// Default alignment of segment payloads
pub const DEFAULT_SEGMENT_ALIGNMENT: u64 = 64;

/// Configuration for [`ContainerWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Every segment starts at a multiple of this many bytes from the file start
    pub segment_alignment: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            segment_alignment: DEFAULT_SEGMENT_ALIGNMENT,
        }
    }
}

impl WriterConfig {
    /// Set the segment alignment
    pub fn with_segment_alignment(mut self, segment_alignment: u64) -> Self {
        self.segment_alignment = segment_alignment;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.segment_alignment.is_power_of_two() {
            return Err(BlobMapError::invalid_argument(
                "segment_alignment",
                format!(
                    "Segment alignment must be a power of two, got {}",
                    self.segment_alignment
                ),
            ));
        }
        Ok(())
    }
}

/// Accumulates named payloads and serializes them as a container
#[derive(Debug)]
pub struct ContainerWriter {
    config: WriterConfig,
    entries: Vec<(String, u32)>,
    keys: HashSet<String>,
    segments: Vec<Vec<u8>>,
}

impl ContainerWriter {
    /// Create an empty writer
    pub fn new(config: WriterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            entries: Vec::new(),
            keys: HashSet::new(),
            segments: Vec::new(),
        })
    }

    /// Store `data` in a new segment under `key`, returning the segment index
    pub fn add_data(&mut self, key: impl Into<String>, data: impl Into<Vec<u8>>) -> Result<u32> {
        let key = key.into();
        self.check_key(&key)?;

        let segment_index = u32::try_from(self.segments.len()).map_err(|_| {
            BlobMapError::invalid_argument("segments", "Too many segments for one container")
        })?;
        self.segments.push(data.into());
        self.insert_entry(key, segment_index);
        Ok(segment_index)
    }

    /// Point `key` at an existing segment
    pub fn add_alias(&mut self, key: impl Into<String>, segment_index: u32) -> Result<()> {
        let key = key.into();
        self.check_key(&key)?;

        if segment_index as usize >= self.segments.len() {
            return Err(BlobMapError::invalid_argument(
                "segment_index",
                format!(
                    "Alias {} targets segment {} but only {} segments exist",
                    key,
                    segment_index,
                    self.segments.len()
                ),
            ));
        }
        self.insert_entry(key, segment_index);
        Ok(())
    }

    /// Number of named entries, aliases included
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Number of payload segments
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    fn check_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(BlobMapError::invalid_argument("key", "Key cannot be empty"));
        }
        if self.keys.contains(key) {
            return Err(BlobMapError::invalid_argument(
                "key",
                format!("Duplicate key {}", key),
            ));
        }
        Ok(())
    }

    fn insert_entry(&mut self, key: String, segment_index: u32) {
        self.keys.insert(key.clone());
        self.entries.push((key, segment_index));
    }

    /// Serialize the container into memory
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    /// Serialize the container to `path`, returning the number of bytes written
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<u64> {
        let file = File::create(path.as_ref())
            .map_err(|e| BlobMapError::from_io(e, "Failed to create container file"))?;
        let mut out = BufWriter::new(file);
        let written = self.write_to(&mut out)?;
        out.flush()
            .map_err(|e| BlobMapError::from_io(e, "Failed to flush container file"))?;
        Ok(written)
    }

    /// Serialize the container to `out`, returning the number of bytes written
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<u64> {
        let alignment = self.config.segment_alignment;

        // Offsets relative to the segment base only depend on payload sizes
        let mut relative = Vec::with_capacity(self.segments.len());
        let mut cursor = 0u64;
        for segment in &self.segments {
            relative.push((cursor, segment.len() as u64));
            cursor = align_up(cursor + segment.len() as u64, alignment);
        }

        let named: Vec<(Option<&str>, u32)> = self
            .entries
            .iter()
            .map(|(key, segment_index)| (Some(key.as_str()), *segment_index))
            .collect();
        let metadata = build_metadata(&MetadataRows {
            named_data: Some(named.as_slice()),
            segments: Some(relative.as_slice()),
        });

        let metadata_end = (HEADER_SIZE + metadata.len()) as u64;
        let segment_base_offset = align_up(metadata_end, alignment);
        let header = ContainerHeader::new(metadata.len() as u64, segment_base_offset);

        let mut written = 0u64;
        let mut emit = |bytes: &[u8]| -> Result<()> {
            out.write_all(bytes)
                .map_err(|e| BlobMapError::from_io(e, "Failed to write container"))?;
            written += bytes.len() as u64;
            Ok(())
        };

        emit(header.to_bytes().as_slice())?;
        emit(metadata.as_slice())?;
        emit(vec![0u8; (segment_base_offset - metadata_end) as usize].as_slice())?;
        for (segment, (offset, size)) in self.segments.iter().zip(&relative) {
            emit(segment.as_slice())?;
            let next = align_up(offset + size, alignment);
            emit(vec![0u8; (next - offset - size) as usize].as_slice())?;
        }

        log::debug!(
            "Wrote container: {} entries, {} segments, {} bytes",
            self.entries.len(),
            self.segments.len(),
            written
        );
        Ok(written)
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}
