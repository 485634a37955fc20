//! 业务能力层
//!
//! 每个服务只提供一类页面能力，不持有浏览器，也不决定流程顺序。
//! 会话状态由编排层持有并以 `&mut SessionState` 传入。

pub mod authenticator;
pub mod diagnostics;
pub mod navigator;
pub mod report_service;

pub use authenticator::{Authenticator, LoginBranch};
pub use diagnostics::{DiagnosticCollector, DiagnosticSnapshot};
pub use navigator::Navigator;
pub use report_service::{ReportService, ReportStatus};
