//! 页面自动化能力
//!
//! 上层服务只通过 [`PageDriver`] 操作浏览器：导航、填写、点击、等待、
//! 执行脚本、截图、捕获新视口和下载。具体实现见 `chromium` 与 `fake`。

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::AppResult;

/// 视口（浏览器窗口 / 标签页）标识
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewportId(String);

impl ViewportId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 主视口中已解析的命名子框架
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameHandle {
    name: String,
}

impl FrameHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 操作的目标作用域
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// 主视口
    Primary,
    /// 主视口中的子框架
    Frame(FrameHandle),
    /// 其他视口（报表弹窗）
    Viewport(ViewportId),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Primary => f.write_str("page"),
            Scope::Frame(frame) => write!(f, "frame:{}", frame.name()),
            Scope::Viewport(id) => write!(f, "viewport:{}", id),
        }
    }
}

/// 页面加载状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    DomContentLoaded,
    Load,
    NetworkIdle,
}

/// 元素等待条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// 存在于 DOM 中（不要求可见）
    Attached,
    Visible,
}

/// 页面自动化能力
///
/// 所有网络相关的等待都以 `timeout` 为唯一的取消手段。
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 主视口导航
    async fn goto(&self, url: &str) -> AppResult<()>;

    async fn current_url(&self) -> AppResult<String>;

    async fn title(&self) -> AppResult<String>;

    async fn fill(&self, scope: &Scope, selector: &str, value: &str) -> AppResult<()>;

    async fn click(&self, scope: &Scope, selector: &str) -> AppResult<()>;

    /// 在元素上按键（例如 "Enter"）
    async fn press(&self, scope: &Scope, selector: &str, key: &str) -> AppResult<()>;

    /// 按可见文本选择下拉选项
    async fn select_option(&self, scope: &Scope, selector: &str, label: &str) -> AppResult<()>;

    async fn wait_for_selector(
        &self,
        scope: &Scope,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> AppResult<()>;

    /// 等待元素内出现指定文本
    async fn wait_for_text(
        &self,
        scope: &Scope,
        selector: &str,
        text: &str,
        timeout: Duration,
    ) -> AppResult<()>;

    async fn wait_for_load_state(
        &self,
        scope: &Scope,
        state: LoadState,
        timeout: Duration,
    ) -> AppResult<()>;

    async fn wait_for_url(&self, url: &str, timeout: Duration) -> AppResult<()>;

    async fn is_visible(&self, scope: &Scope, selector: &str) -> AppResult<bool>;

    async fn inner_text(&self, scope: &Scope, selector: &str) -> AppResult<String>;

    /// 以元素为参数执行 JS 函数，例如 `el => el.outerHTML`
    async fn evaluate(&self, scope: &Scope, selector: &str, function: &str) -> AppResult<JsonValue>;

    /// 按名称查找主视口中的子框架（含嵌套框架）
    async fn frame(&self, name: &str) -> AppResult<Option<FrameHandle>>;

    /// 当前上下文中所有打开的视口，主视口在前
    async fn viewports(&self) -> AppResult<Vec<ViewportId>>;

    /// 整页截图
    async fn screenshot(&self, viewport: &ViewportId, path: &Path) -> AppResult<()>;

    /// 点击元素并捕获由此打开的新视口
    async fn click_expect_viewport(
        &self,
        scope: &Scope,
        selector: &str,
        timeout: Duration,
    ) -> AppResult<ViewportId>;

    /// 点击元素并把触发的下载保存到 `destination`
    async fn click_expect_download(
        &self,
        scope: &Scope,
        selector: &str,
        destination: &Path,
        timeout: Duration,
    ) -> AppResult<PathBuf>;

    /// 把视口切到前台（`Scope::Primary` 表示主视口）
    async fn bring_to_front(&self, scope: &Scope) -> AppResult<()>;

    async fn close_viewport(&self, viewport: &ViewportId) -> AppResult<()>;

    /// 释放浏览器资源；重复调用是安全的
    async fn close(&self) -> AppResult<()>;
}

/// 启动参数
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    /// 通用等待超时
    pub timeout: Duration,
    /// 下载落地目录
    pub download_dir: PathBuf,
    pub chrome_executable: Option<PathBuf>,
    /// 设置后连接已运行的浏览器
    pub debug_port: Option<u16>,
}

/// 页面自动化能力的工厂
#[async_trait]
pub trait DriverFactory: Send + Sync {
    type Driver: PageDriver;

    /// 创建驱动；失败时必须已释放已获取的资源
    async fn launch(&self, options: &LaunchOptions) -> AppResult<Self::Driver>;
}
