//! # Experity Reports
//!
//! 报表门户自动化：登录（含 TOTP 二次验证）、页面导航、报表参数配置、
//! 执行与导出下载，出错时截取所有窗口用于诊断。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（浏览器 / 页面），只暴露能力
//! - `PageDriver` - 页面自动化能力接口
//! - `ChromiumDriver` - 基于 chromiumoxide 的实现；`ScriptedDriver` - 脚本化实现
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每次只做一步
//! - `Authenticator` - 打开门户 / 登录 / OTP / 登出
//! - `Navigator` - 逻辑页面导航与框架解析
//! - `ReportService` - 搜索 / 选择 / 配置 / 执行 / 下载
//! - `DiagnosticCollector` - 全部窗口截图
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义三种报表形态的完整流程
//! - `ReportFlow` - 日期区间 / 月份列表 / 月份区间 / 逐月区间
//! - `BatchOutcome` - 批量中每一项的成败
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/portal` - 唯一持有驱动与会话状态，管理完整生命周期
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod otp;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{ChromiumLauncher, PageDriver, ScriptedDriver};
pub use models::{Credentials, ReportFormat, ReportRequest, SessionState};
pub use orchestrator::{Portal, PortalOptions};
pub use otp::{OtpProvider, Totp};
pub use workflow::{BatchOutcome, ReportFlow};
