//! Buffers handed out by loaders

pub mod freeable;

pub use freeable::{FreeableBuffer, ReleaseFn};
