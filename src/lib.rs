//! # blobmap - Lazily-Loaded Named Data
//!
//! blobmap resolves textual keys to binary payloads (weight tensors and
//! similar) that live outside a program's metadata section, and loads each
//! payload only when its key is requested.
//!
//! ## Features
//!
//! - **Named-data map**: key → segment resolution with checked indices and offsets
//! - **Pluggable loaders**: in-memory, positional file reads, zero-copy mmap
//! - **Freeable buffers**: exclusive ownership with a one-shot release step
//! - **Container format**: fixed header, FlatBuffers metadata, aligned segments
//! - **Thread-safe reads**: the map is immutable and borrows everything it uses
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 NamedDataMap                    │
//! │  get_num_keys / get_key / get_data              │
//! ├────────────────────────┬────────────────────────┤
//! │  NamedDataTable        │  SegmentTable          │
//! │  key → segment index   │  index → offset, size  │
//! └────────────────────────┴────────────────────────┘
//!           │ load(base + offset, size, External)
//!           ▼
//! ┌─────────────────────────────────────────────────┐
//! │  DataLoader: buffer │ file │ mmap               │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use blobmap::{BufferDataLoader, Container, ContainerWriter, WriterConfig};
//!
//! let mut writer = ContainerWriter::new(WriterConfig::default())?;
//! writer.add_data("weights.0", vec![1u8, 2, 3, 4])?;
//! let loader = BufferDataLoader::new(writer.to_bytes()?);
//!
//! let container = Container::load(&loader)?;
//! let tables = container.tables()?;
//! let map = container.named_data_map(&tables)?;
//! assert_eq!(map.get_data("weights.0")?.data(), &[1, 2, 3, 4]);
//! # Ok::<(), blobmap::BlobMapError>(())
//! ```

pub mod buffers;
pub mod container;
pub mod error;
pub mod loaders;
pub mod named_data;
pub mod tables;

// Main API re-exports
pub use buffers::FreeableBuffer;
pub use container::{Container, ContainerHeader, ContainerTables, ContainerWriter, WriterConfig};
pub use error::{BlobMapError, Result};
pub use loaders::{
    open_loader, BufferDataLoader, DataLoader, FileDataLoader, LoadStrategy, LoaderConfig,
    MlockConfig, MmapDataLoader, SegmentInfo, SegmentType,
};
pub use named_data::NamedDataMap;
pub use tables::{DataSegment, NamedDataEntry, NamedDataTable, OwnedNamedData, SegmentTable};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
