pub mod loader;
pub mod parse;
pub mod source;

pub use loader::{LoadedDataset, load_multiple};
pub use source::{DataSource, resolve_sources};
