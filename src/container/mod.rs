//! Container files: header, flatbuffer metadata and aligned segments
//!
//! ```text
//! ┌──────────┬───────────────────┬─────────┬───────────┬─────────┬─────┐
//! │  header  │ metadata (fbs)    │ padding │ segment 0 │ padding │ ... │
//! └──────────┴───────────────────┴─────────┴───────────┴─────────┴─────┘
//!                                          ▲
//!                                 segment_base_offset
//! ```

pub mod header;
pub mod reader;
pub mod schema;
pub mod writer;

pub use header::{ContainerHeader, HEADER_MAGIC, HEADER_SIZE};
pub use reader::{Container, ContainerTables};
pub use writer::{ContainerWriter, WriterConfig, DEFAULT_SEGMENT_ALIGNMENT};
