//! 流程层
//!
//! 把 services 的单步能力组合成完整的报表流程。

pub mod batch;
pub mod report_flow;

pub use batch::{BatchFailure, BatchOutcome};
pub use report_flow::{ReportFlow, DOWNLOAD_FORMATS};
