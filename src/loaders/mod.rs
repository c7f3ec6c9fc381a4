//! Data loaders: the storage seam between named data and its bytes

pub mod buffer;
pub mod config;
pub mod file;
pub mod mmap;
pub mod traits;

pub use buffer::BufferDataLoader;
pub use config::{LoadStrategy, LoaderConfig, MlockConfig};
pub use file::FileDataLoader;
pub use mmap::MmapDataLoader;
pub use traits::{checked_range, DataLoader, SegmentInfo, SegmentType};

use crate::error::Result;

/// Open the loader described by `config`
pub fn open_loader(config: &LoaderConfig) -> Result<Box<dyn DataLoader>> {
    config.validate()?;

    log::debug!(
        "Opening {} loader for {}",
        config.strategy.name(),
        config.path.display()
    );

    let loader: Box<dyn DataLoader> = match config.strategy {
        LoadStrategy::File => Box::new(FileDataLoader::from_path(&config.path)?),
        LoadStrategy::Mmap => Box::new(MmapDataLoader::from_path(&config.path, config.mlock)?),
    };
    Ok(loader)
}
