//! Lookup of named data stored outside the program's metadata

pub mod map;

pub use map::NamedDataMap;
