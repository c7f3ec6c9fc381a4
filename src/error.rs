//! Error types and handling for blobmap

/// Result type alias for blobmap operations
pub type Result<T> = std::result::Result<T, BlobMapError>;

/// Error taxonomy shared by loaders, tables and the named-data map
#[derive(Debug, thiserror::Error)]
pub enum BlobMapError {
    /// A precondition on an index, a required collaborator or a table
    /// consistency check was violated
    #[error("Invalid argument: {parameter} - {message}")]
    InvalidArgument { parameter: String, message: String },

    /// The requested key does not exist in the named-data table
    #[error("Named data not found: {key}")]
    NotFound { key: String },

    /// I/O related errors (file reads, mmap, etc.)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A requested byte range lies outside the data source
    #[error("Out of bounds: offset {offset} + size {size} exceeds source size {available}")]
    OutOfBounds { offset: u64, size: u64, available: u64 },

    /// Memory mapping or locking failures
    #[error("Memory error: {message}")]
    Memory { message: String },

    /// Malformed container header or metadata, or a loader returning the wrong byte count
    #[error("Corrupted container: {message}")]
    Corrupted { message: String },
}

impl BlobMapError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create an out of bounds error
    pub fn out_of_bounds(offset: u64, size: u64, available: u64) -> Self {
        Self::OutOfBounds {
            offset,
            size,
            available,
        }
    }

    /// Create a memory error
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory {
            message: message.into(),
        }
    }

    /// Create a corrupted container error
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// True for [`BlobMapError::NotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for [`BlobMapError::InvalidArgument`]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }
}

impl From<std::io::Error> for BlobMapError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<flatbuffers::InvalidFlatbuffer> for BlobMapError {
    fn from(err: flatbuffers::InvalidFlatbuffer) -> Self {
        Self::corrupted(format!("Flatbuffer verification failed: {}", err))
    }
}
