pub mod daemon;
pub mod logging;
pub mod node;
pub mod process_manager;
pub mod scripts;
