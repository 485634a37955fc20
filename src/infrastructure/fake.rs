//! 脚本化的页面自动化实现
//!
//! 不启动浏览器，按预先设定的脚本响应调用并记录每一次调用，
//! 用于离线演练和测试。

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult, DriverError};
use crate::infrastructure::driver::{
    DriverFactory, ElementState, FrameHandle, LaunchOptions, LoadState, PageDriver, Scope,
    ViewportId,
};

/// 调用后对主视口的影响
#[derive(Debug, Clone, Default)]
pub struct PageEffect {
    pub url: Option<String>,
    pub title: Option<String>,
}

impl PageEffect {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            title: None,
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            url: None,
            title: Some(title.into()),
        }
    }
}

/// 脚本与调用记录
#[derive(Debug, Default)]
pub struct ScriptState {
    pub url: String,
    pub title: String,
    /// 调用记录，例如 `click frame:NavFrame #dosearch`
    pub calls: Vec<String>,
    /// 存在的子框架名
    pub frames: HashSet<String>,
    /// goto 目标 -> 实际落地地址
    pub redirects: HashMap<String, String>,
    pub click_effects: HashMap<String, PageEffect>,
    pub press_effects: HashMap<String, PageEffect>,
    /// 对这些选择器（或 goto 地址）的任何操作都会失败
    pub failing_selectors: HashSet<String>,
    /// 这些元素在被等待之前不存在，模拟框架重新加载后尚未渲染
    pub late_selectors: HashSet<String>,
    /// 已被等待到的迟到元素
    pub appeared: HashSet<String>,
    /// 这些作用域（如 `viewport:popup-1`）永远等不到加载完成
    pub stalled_scopes: HashSet<String>,
    /// 选择这些下拉选项 / 等待这些文本会失败
    pub failing_labels: HashSet<String>,
    /// 可见元素及其文本
    pub visible: HashMap<String, String>,
    /// evaluate 的返回值（按选择器）
    pub evaluations: HashMap<String, JsonValue>,
    pub popups: Vec<ViewportId>,
    pub popup_counter: usize,
    /// 截图失败的视口序号
    pub failing_screenshots: HashSet<usize>,
    /// 模拟上下文中没有任何视口
    pub no_viewports: bool,
    pub closed: bool,
}

/// 脚本化驱动；克隆后共享同一份状态
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(setup: impl FnOnce(&mut ScriptState)) -> Self {
        let driver = Self::new();
        setup(&mut driver.state());
        driver
    }

    pub fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// 以 `prefix` 开头的调用次数
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }

    fn check(&self, selector: &str) -> AppResult<()> {
        let state = self.state();
        let pending = state.late_selectors.contains(selector) && !state.appeared.contains(selector);
        if pending || state.failing_selectors.contains(selector) {
            return Err(AppError::element_not_found(selector));
        }
        Ok(())
    }

    fn apply(&self, effect: Option<PageEffect>) {
        if let Some(effect) = effect {
            let mut state = self.state();
            if let Some(url) = effect.url {
                state.url = url;
            }
            if let Some(title) = effect.title {
                state.title = title;
            }
        }
    }

    fn frame_missing(&self, scope: &Scope) -> bool {
        match scope {
            Scope::Frame(frame) => !self.state().frames.contains(frame.name()),
            _ => false,
        }
    }

    fn all_viewports(&self) -> Vec<ViewportId> {
        let state = self.state();
        if state.no_viewports {
            return Vec::new();
        }
        let mut ids = vec![ViewportId::new("main")];
        ids.extend(state.popups.iter().cloned());
        ids
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn goto(&self, url: &str) -> AppResult<()> {
        self.record(format!("goto {}", url));
        let mut state = self.state();
        if state.failing_selectors.contains(url) {
            return Err(DriverError::NavigationFailed {
                url: url.to_string(),
                reason: "scripted failure".to_string(),
            }
            .into());
        }
        state.url = state
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> AppResult<String> {
        Ok(self.state().url.clone())
    }

    async fn title(&self) -> AppResult<String> {
        Ok(self.state().title.clone())
    }

    async fn fill(&self, scope: &Scope, selector: &str, value: &str) -> AppResult<()> {
        self.record(format!("fill {} {} {}", scope, selector, value));
        self.check(selector)
    }

    async fn click(&self, scope: &Scope, selector: &str) -> AppResult<()> {
        self.record(format!("click {} {}", scope, selector));
        self.check(selector)?;
        let effect = self.state().click_effects.get(selector).cloned();
        self.apply(effect);
        Ok(())
    }

    async fn press(&self, scope: &Scope, selector: &str, key: &str) -> AppResult<()> {
        self.record(format!("press {} {} {}", scope, selector, key));
        self.check(selector)?;
        let effect = self.state().press_effects.get(selector).cloned();
        self.apply(effect);
        Ok(())
    }

    async fn select_option(&self, scope: &Scope, selector: &str, label: &str) -> AppResult<()> {
        self.record(format!("select {} {} {}", scope, selector, label));
        self.check(selector)?;
        if self.state().failing_labels.contains(label) {
            return Err(AppError::script_failed(format!("option not found: {}", label)));
        }
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        scope: &Scope,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> AppResult<()> {
        self.record(format!("wait {} {} {:?}", scope, selector, state));
        if self.frame_missing(scope) || self.state().failing_selectors.contains(selector) {
            return Err(AppError::timeout(format!("{} {}", scope, selector), timeout));
        }
        self.state().appeared.insert(selector.to_string());
        Ok(())
    }

    async fn wait_for_text(
        &self,
        scope: &Scope,
        selector: &str,
        text: &str,
        timeout: Duration,
    ) -> AppResult<()> {
        self.record(format!("wait_text {} {} {}", scope, selector, text));
        if self.frame_missing(scope) || self.state().failing_labels.contains(text) {
            return Err(AppError::timeout(format!("{} '{}'", selector, text), timeout));
        }
        Ok(())
    }

    async fn wait_for_load_state(
        &self,
        scope: &Scope,
        state: LoadState,
        timeout: Duration,
    ) -> AppResult<()> {
        self.record(format!("load {} {:?}", scope, state));
        if self.state().stalled_scopes.contains(&scope.to_string()) {
            return Err(AppError::timeout(format!("{} {:?}", scope, state), timeout));
        }
        Ok(())
    }

    async fn wait_for_url(&self, url: &str, timeout: Duration) -> AppResult<()> {
        self.record(format!("wait_url {}", url));
        if self.state().url != url {
            return Err(AppError::timeout(url, timeout));
        }
        Ok(())
    }

    async fn is_visible(&self, _scope: &Scope, selector: &str) -> AppResult<bool> {
        Ok(self.state().visible.contains_key(selector))
    }

    async fn inner_text(&self, _scope: &Scope, selector: &str) -> AppResult<String> {
        self.state()
            .visible
            .get(selector)
            .cloned()
            .ok_or_else(|| AppError::element_not_found(selector))
    }

    async fn evaluate(&self, scope: &Scope, selector: &str, _function: &str) -> AppResult<JsonValue> {
        self.record(format!("evaluate {} {}", scope, selector));
        self.state()
            .evaluations
            .get(selector)
            .cloned()
            .ok_or_else(|| AppError::element_not_found(selector))
    }

    async fn frame(&self, name: &str) -> AppResult<Option<FrameHandle>> {
        Ok(self
            .state()
            .frames
            .contains(name)
            .then(|| FrameHandle::new(name)))
    }

    async fn viewports(&self) -> AppResult<Vec<ViewportId>> {
        Ok(self.all_viewports())
    }

    async fn screenshot(&self, viewport: &ViewportId, path: &Path) -> AppResult<()> {
        self.record(format!("screenshot {} {}", viewport, path.display()));
        let index = self
            .all_viewports()
            .iter()
            .position(|id| id == viewport)
            .ok_or_else(|| DriverError::ViewportNotFound {
                id: viewport.to_string(),
            })?;
        if self.state().failing_screenshots.contains(&index) {
            return Err(AppError::script_failed("scripted screenshot failure"));
        }
        tokio::fs::write(path, b"\x89PNG").await?;
        Ok(())
    }

    async fn click_expect_viewport(
        &self,
        scope: &Scope,
        selector: &str,
        _timeout: Duration,
    ) -> AppResult<ViewportId> {
        self.record(format!("popup {} {}", scope, selector));
        self.check(selector)?;
        let mut state = self.state();
        state.popup_counter += 1;
        let id = ViewportId::new(format!("popup-{}", state.popup_counter));
        state.popups.push(id.clone());
        Ok(id)
    }

    async fn click_expect_download(
        &self,
        scope: &Scope,
        selector: &str,
        destination: &Path,
        _timeout: Duration,
    ) -> AppResult<PathBuf> {
        self.record(format!("download {} {} {}", scope, selector, destination.display()));
        self.check(selector)?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(destination, selector.as_bytes()).await?;
        Ok(destination.to_path_buf())
    }

    async fn bring_to_front(&self, scope: &Scope) -> AppResult<()> {
        self.record(format!("front {}", scope));
        Ok(())
    }

    async fn close_viewport(&self, viewport: &ViewportId) -> AppResult<()> {
        self.record(format!("close_viewport {}", viewport));
        self.state().popups.retain(|id| id != viewport);
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        self.record("close".to_string());
        self.state().closed = true;
        Ok(())
    }
}

/// 返回同一个 [`ScriptedDriver`] 的工厂
#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    pub driver: ScriptedDriver,
    pub fail_launch: bool,
}

impl ScriptedFactory {
    pub fn new(driver: ScriptedDriver) -> Self {
        Self {
            driver,
            fail_launch: false,
        }
    }
}

#[async_trait]
impl DriverFactory for ScriptedFactory {
    type Driver = ScriptedDriver;

    async fn launch(&self, _options: &LaunchOptions) -> AppResult<ScriptedDriver> {
        if self.fail_launch {
            return Err(AppError::Other("scripted launch failure".to_string()));
        }
        Ok(self.driver.clone())
    }
}
