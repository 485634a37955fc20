pub mod toml_loader;

pub use toml_loader::{load_credentials, load_credentials_file};
