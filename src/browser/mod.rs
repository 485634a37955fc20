pub mod launcher;

pub use launcher::{connect_to_browser, launch_browser, BrowserSession};
