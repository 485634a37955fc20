//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 持有唯一的驱动和会话状态，把登录、数据采集、报表、诊断和清理
//! 串成完整的生命周期。
//!
//! ## 层次关系
//!
//! ```text
//! orchestrator::Portal (生命周期 + 错误隔离)
//!     ↓
//! workflow::ReportFlow (三种报表形态 + 批量)
//!     ↓
//! services (能力层：登录 / 导航 / 报表 / 诊断)
//!     ↓
//! infrastructure (基础设施：PageDriver)
//! ```
//!
//! ## 设计原则
//!
//! 1. **资源隔离**：只有编排层持有驱动和 `SessionState`
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **错误分级**：清理类操作只记日志，业务操作记录后上抛

pub mod portal;

pub use portal::{Portal, PortalOptions, CLINIC_DATA_FILE, REPORT_DATA_FILE};
