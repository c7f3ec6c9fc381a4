//! Loader issuing positional reads against a file

use std::{
    fs::File,
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
};

use crate::{
    buffers::FreeableBuffer,
    error::{BlobMapError, Result},
};

use super::traits::{checked_range, DataLoader, SegmentInfo};

/// Copies requested ranges out of a file into owned buffers.
///
/// Reads are positional (`pread`), so one loader can serve several threads
/// without sharing a cursor.
#[derive(Debug)]
pub struct FileDataLoader {
    file: File,
    path: PathBuf,
    file_size: u64,
}

impl FileDataLoader {
    /// Open `path` for reading
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| BlobMapError::from_io(e, "Failed to open container file"))?;
        let file_size = file
            .metadata()
            .map_err(|e| BlobMapError::from_io(e, "Failed to stat container file"))?
            .len();

        Ok(Self {
            file,
            path: path.to_path_buf(),
            file_size,
        })
    }

    /// Get the path this loader reads from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataLoader for FileDataLoader {
    fn load(&self, offset: u64, size: u64, info: SegmentInfo) -> Result<FreeableBuffer> {
        let range = checked_range(offset, size, self.file_size)?;
        if range.is_empty() {
            return Ok(FreeableBuffer::empty());
        }

        let mut data = vec![0u8; range.len()];
        self.file.read_exact_at(&mut data, offset).map_err(|e| {
            BlobMapError::from_io(
                e,
                &format!(
                    "Failed to read {} segment {} at offset {}",
                    info.segment_type.name(),
                    info.segment_index,
                    offset
                ),
            )
        })?;
        Ok(FreeableBuffer::from_vec(data))
    }

    fn load_into(&self, offset: u64, size: u64, info: SegmentInfo, buffer: &mut [u8]) -> Result<()> {
        let range = checked_range(offset, size, self.file_size)?;
        if buffer.len() < range.len() {
            return Err(BlobMapError::invalid_argument(
                "buffer",
                format!(
                    "destination holds {} bytes but {} were requested",
                    buffer.len(),
                    size
                ),
            ));
        }
        self.file
            .read_exact_at(&mut buffer[..range.len()], offset)
            .map_err(|e| {
                BlobMapError::from_io(
                    e,
                    &format!(
                        "Failed to read {} segment {} into caller buffer",
                        info.segment_type.name(),
                        info.segment_index
                    ),
                )
            })
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file_size)
    }
}
