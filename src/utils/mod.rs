pub mod directory;
pub mod logging;

pub use directory::{download_directory, ensure_dir, screenshot_directory};
pub use logging::{init_logging, mask, time_stamp, truncate_text};
