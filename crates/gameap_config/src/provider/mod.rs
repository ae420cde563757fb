pub mod file;
mod ini;

pub use file::{FileProvider, FileType};
