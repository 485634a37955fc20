//! 基础设施层
//!
//! 持有稀缺资源（浏览器 / 页面），只向上暴露页面自动化能力。

pub mod chromium;
pub mod driver;
pub mod fake;
pub mod js_executor;

pub use chromium::{ChromiumDriver, ChromiumLauncher};
pub use driver::{
    DriverFactory, ElementState, FrameHandle, LaunchOptions, LoadState, PageDriver, Scope,
    ViewportId,
};
pub use fake::{PageEffect, ScriptState, ScriptedDriver, ScriptedFactory};
pub use js_executor::JsExecutor;
