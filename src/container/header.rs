//! Fixed-size header at the start of every container file

use crate::error::{BlobMapError, Result};

/// Magic bytes identifying a container header
pub const HEADER_MAGIC: [u8; 4] = *b"BMh0";

/// Size of the header written by this crate
pub const HEADER_SIZE: usize = 24;

/// Container header.
///
/// Layout (little endian):
///
/// ```text
/// 0..4    magic            "BMh0"
/// 4..8    header_length    u32, metadata starts here
/// 8..16   metadata_size    u64
/// 16..24  segment_base     u64, absolute offset segments are relative to
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub header_length: u32,
    pub metadata_size: u64,
    pub segment_base_offset: u64,
}

impl ContainerHeader {
    /// Create a header for metadata directly following a standard header
    pub fn new(metadata_size: u64, segment_base_offset: u64) -> Self {
        Self {
            header_length: HEADER_SIZE as u32,
            metadata_size,
            segment_base_offset,
        }
    }

    /// Offset of the metadata flatbuffer
    pub fn metadata_offset(&self) -> u64 {
        self.header_length as u64
    }

    /// Parse and validate a header from the first bytes of a container
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(BlobMapError::corrupted(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        if bytes[0..4] != HEADER_MAGIC {
            return Err(BlobMapError::corrupted(format!(
                "bad header magic {:02x?}",
                &bytes[0..4]
            )));
        }

        let header = Self {
            header_length: u32::from_le_bytes(read_array(&bytes[4..8])),
            metadata_size: u64::from_le_bytes(read_array(&bytes[8..16])),
            segment_base_offset: u64::from_le_bytes(read_array(&bytes[16..24])),
        };
        header.validate()?;
        Ok(header)
    }

    /// Check internal consistency of the header fields
    pub fn validate(&self) -> Result<()> {
        if (self.header_length as usize) < HEADER_SIZE {
            return Err(BlobMapError::corrupted(format!(
                "header length {} is smaller than {}",
                self.header_length, HEADER_SIZE
            )));
        }

        let metadata_end = self
            .metadata_offset()
            .checked_add(self.metadata_size)
            .ok_or_else(|| BlobMapError::corrupted("metadata size overflows"))?;
        if self.segment_base_offset < metadata_end {
            return Err(BlobMapError::corrupted(format!(
                "segment base offset {} overlaps metadata ending at {}",
                self.segment_base_offset, metadata_end
            )));
        }

        Ok(())
    }

    /// Serialize the header
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&HEADER_MAGIC);
        bytes[4..8].copy_from_slice(&self.header_length.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.metadata_size.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.segment_base_offset.to_le_bytes());
        bytes
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bytes() {
        let header = ContainerHeader::new(100, 128);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], b"BMh0");
        assert_eq!(ContainerHeader::parse(&bytes).unwrap(), header);
        assert_eq!(header.metadata_offset(), 24);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = ContainerHeader::new(8, 32).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            ContainerHeader::parse(&bytes),
            Err(BlobMapError::Corrupted { .. })
        ));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = ContainerHeader::new(8, 32).to_bytes();
        assert!(ContainerHeader::parse(&bytes[..10]).is_err());
    }

    #[test]
    fn test_segments_overlapping_metadata() {
        let bytes = ContainerHeader::new(100, 64).to_bytes();
        let err = ContainerHeader::parse(&bytes).unwrap_err();
        assert!(format!("{}", err).contains("overlaps metadata"));
    }
}
