pub mod credentials;
pub mod loaders;
pub mod months;
pub mod report;
pub mod session;

pub use credentials::Credentials;
pub use loaders::{load_credentials, load_credentials_file};
pub use months::{months_between, normalize_file_stem};
pub use report::{DownloadArtifact, ReportFormat, ReportParams, ReportRequest};
pub use session::{LogicalPage, ReportFrames, SessionState};
