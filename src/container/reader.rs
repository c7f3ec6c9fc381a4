//! Opening containers through a loader

use crate::{
    buffers::FreeableBuffer,
    error::{BlobMapError, Result},
    loaders::{DataLoader, SegmentInfo},
    named_data::NamedDataMap,
    tables::{NamedDataTable, SegmentTable},
};

use super::{
    header::{ContainerHeader, HEADER_SIZE},
    schema::{self, NamedDataVector, SegmentVector},
};

/// Decoded tables borrowed from a container's metadata
#[derive(Debug)]
pub struct ContainerTables<'a> {
    pub named_data: Option<NamedDataVector<'a>>,
    pub segments: Option<SegmentVector<'a>>,
}

/// An opened container: validated header plus verified metadata.
///
/// Segment payloads are not read here; they are loaded on demand through the
/// [`NamedDataMap`] returned by [`Container::named_data_map`].
#[derive(Debug)]
pub struct Container<'l> {
    loader: &'l dyn DataLoader,
    header: ContainerHeader,
    metadata: FreeableBuffer,
}

impl<'l> Container<'l> {
    /// Read the header and metadata through `loader`
    pub fn load(loader: &'l dyn DataLoader) -> Result<Self> {
        let source_size = loader.size()?;
        if source_size < HEADER_SIZE as u64 {
            return Err(BlobMapError::corrupted(format!(
                "container is {} bytes, smaller than its header",
                source_size
            )));
        }

        let header_bytes = loader.load(0, HEADER_SIZE as u64, SegmentInfo::program())?;
        let header = ContainerHeader::parse(&header_bytes)?;

        // validate() in parse rules out overflow here
        let metadata_end = header.metadata_offset() + header.metadata_size;
        if metadata_end > source_size {
            return Err(BlobMapError::corrupted(format!(
                "metadata ends at {} but the container is {} bytes",
                metadata_end, source_size
            )));
        }

        let metadata = loader.load(
            header.metadata_offset(),
            header.metadata_size,
            SegmentInfo::program(),
        )?;
        let root = schema::root_as_container(&metadata)?;

        log::debug!(
            "Opened container: {} named entries, {} segments, segment base {}",
            root.named_data().map(|v| v.len()).unwrap_or(0),
            root.segments().map(|v| v.len()).unwrap_or(0),
            header.segment_base_offset
        );

        Ok(Self {
            loader,
            header,
            metadata,
        })
    }

    /// Get the parsed header
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Absolute offset segment offsets are relative to
    pub fn segment_base_offset(&self) -> u64 {
        self.header.segment_base_offset
    }

    /// Decode the named-data and segment tables
    pub fn tables(&self) -> Result<ContainerTables<'_>> {
        let root = schema::root_as_container(self.metadata.data())?;
        Ok(ContainerTables {
            named_data: root.named_data(),
            segments: root.segments(),
        })
    }

    /// Build the named-data map over `tables`.
    ///
    /// Fails with `InvalidArgument` when the container has no named data.
    pub fn named_data_map<'a>(&'a self, tables: &'a ContainerTables<'a>) -> Result<NamedDataMap<'a>> {
        NamedDataMap::create(
            Some(self.loader),
            self.header.segment_base_offset,
            tables
                .named_data
                .as_ref()
                .map(|table| table as &dyn NamedDataTable),
            tables
                .segments
                .as_ref()
                .map(|table| table as &dyn SegmentTable),
        )
    }
}
