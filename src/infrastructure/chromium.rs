//! 基于 chromiumoxide 的页面自动化实现
//!
//! 元素定位和等待都通过在目标文档里执行 JS 完成（子框架按名称递归查找），
//! 点击使用真实的鼠标事件，以便弹窗和下载按用户手势处理。
//! 填写、点击、按键、下拉选择都会先等待元素出现且可见，再执行动作。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::layout::Point;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::browser::{self, BrowserSession};
use crate::error::{AppError, AppResult, ConfigError, DriverError};
use crate::infrastructure::driver::{
    DriverFactory, ElementState, FrameHandle, LaunchOptions, LoadState, PageDriver, Scope,
    ViewportId,
};
use crate::infrastructure::JsExecutor;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// 网络空闲判定：资源条目数在该时长内不再增长
const NETWORK_QUIET: Duration = Duration::from_millis(500);

/// chromiumoxide 驱动
pub struct ChromiumDriver {
    browser: Mutex<Option<Browser>>,
    primary: JsExecutor,
    handler: Mutex<Option<JoinHandle<()>>>,
    owned: bool,
    download_staging: PathBuf,
    /// 动作前等待元素可用的超时
    action_timeout: Duration,
    /// 本驱动打开的弹窗；连接外部浏览器时只暴露这些视口
    opened: Mutex<HashSet<ViewportId>>,
}

/// 启动 / 连接 Chromium 的工厂
#[derive(Debug, Default, Clone)]
pub struct ChromiumLauncher;

#[async_trait]
impl DriverFactory for ChromiumLauncher {
    type Driver = ChromiumDriver;

    async fn launch(&self, options: &LaunchOptions) -> AppResult<ChromiumDriver> {
        let staging = options.download_dir.join(".incoming");
        let session = match options.debug_port {
            Some(port) => browser::connect_to_browser(port, &staging).await?,
            None => browser::launch_browser(options, &staging).await?,
        };
        Ok(ChromiumDriver::new(session, staging, options.timeout))
    }
}

#[derive(Debug, Deserialize)]
struct ElementVisibility {
    visible: bool,
}

#[derive(Debug, Deserialize)]
struct ClickPoint {
    x: f64,
    y: f64,
}

impl ChromiumDriver {
    pub fn new(session: BrowserSession, download_staging: PathBuf, action_timeout: Duration) -> Self {
        Self {
            browser: Mutex::new(Some(session.browser)),
            primary: JsExecutor::new(session.page),
            handler: Mutex::new(Some(session.handler)),
            owned: session.owned,
            download_staging,
            action_timeout,
            opened: Mutex::new(HashSet::new()),
        }
    }

    fn primary_id(&self) -> ViewportId {
        ViewportId::new(self.primary.page().target_id().inner().clone())
    }

    async fn pages(&self) -> AppResult<Vec<Page>> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().ok_or_else(|| DriverError::ViewportNotFound {
            id: "browser closed".to_string(),
        })?;
        Ok(browser.pages().await?)
    }

    async fn page_for(&self, viewport: &ViewportId) -> AppResult<Page> {
        if *viewport == self.primary_id() {
            return Ok(self.primary.page().clone());
        }
        self.pages()
            .await?
            .into_iter()
            .find(|p| p.target_id().inner() == viewport.as_str())
            .ok_or_else(|| {
                DriverError::ViewportNotFound {
                    id: viewport.to_string(),
                }
                .into()
            })
    }

    /// 作用域对应的 JS 执行器和子框架名
    async fn executor_for(&self, scope: &Scope) -> AppResult<(JsExecutor, Option<String>)> {
        match scope {
            Scope::Primary => Ok((JsExecutor::new(self.primary.page().clone()), None)),
            Scope::Frame(frame) => Ok((
                JsExecutor::new(self.primary.page().clone()),
                Some(frame.name().to_string()),
            )),
            Scope::Viewport(id) => Ok((JsExecutor::new(self.page_for(id).await?), None)),
        }
    }

    /// 在作用域文档中定位元素后执行 `body`；`body` 中可使用 `win`、`doc`、`el`
    async fn run_on_element(&self, scope: &Scope, selector: &str, body: &str) -> AppResult<JsonValue> {
        let (executor, frame) = self.executor_for(scope).await?;
        executor.eval_checked(element_script(frame.as_deref(), selector, body)).await
    }

    /// 等待元素出现且可见后再执行 `body`
    ///
    /// 点击往往会重新加载框架，紧随其后的动作必须等新文档里的元素就绪。
    async fn run_when_ready(&self, scope: &Scope, selector: &str, body: &str) -> AppResult<JsonValue> {
        self.wait_for_selector(scope, selector, ElementState::Visible, self.action_timeout)
            .await
            .map_err(|e| {
                debug!("等待元素可用失败: {}", e);
                AppError::element_not_found(format!("{} {}", scope, selector))
            })?;
        self.run_on_element(scope, selector, body).await
    }

    /// 浏览器中所有页面的视口
    async fn live_viewports(&self) -> AppResult<Vec<ViewportId>> {
        Ok(self
            .pages()
            .await?
            .iter()
            .map(|page| ViewportId::new(page.target_id().inner().clone()))
            .collect())
    }

    async fn document_state(&self, scope: &Scope) -> AppResult<(String, u64)> {
        let (executor, frame) = self.executor_for(scope).await?;
        let value = executor
            .eval_checked(document_script(
                frame.as_deref(),
                "return { ok: true, value: [doc.readyState, win.performance.getEntriesByType('resource').length] };",
            ))
            .await?;
        let state = value.get(0).and_then(|v| v.as_str()).unwrap_or("loading").to_string();
        let resources = value.get(1).and_then(|v| v.as_u64()).unwrap_or(0);
        Ok((state, resources))
    }

    async fn staged_files(&self) -> AppResult<HashSet<PathBuf>> {
        let mut files = HashSet::new();
        let mut entries = tokio::fs::read_dir(&self.download_staging).await?;
        while let Some(entry) = entries.next_entry().await? {
            files.insert(entry.path());
        }
        Ok(files)
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn goto(&self, url: &str) -> AppResult<()> {
        self.primary.page().goto(url).await.map_err(|e| {
            AppError::from(DriverError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })
        })?;
        Ok(())
    }

    async fn current_url(&self) -> AppResult<String> {
        Ok(self.primary.page().url().await?.unwrap_or_default())
    }

    async fn title(&self) -> AppResult<String> {
        Ok(self.primary.page().get_title().await?.unwrap_or_default())
    }

    async fn fill(&self, scope: &Scope, selector: &str, value: &str) -> AppResult<()> {
        let body = format!(
            "el.focus(); el.value = {}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return {{ ok: true }};",
            json!(value)
        );
        self.run_when_ready(scope, selector, &body).await?;
        Ok(())
    }

    async fn click(&self, scope: &Scope, selector: &str) -> AppResult<()> {
        // 把元素中心换算到顶层视口坐标（逐级加上 frameElement 偏移）
        let body = "el.scrollIntoView({ block: 'center', inline: 'center' }); \
             const r = el.getBoundingClientRect(); \
             let x = r.left + r.width / 2, y = r.top + r.height / 2; \
             let w = win; \
             while (w.frameElement) { \
                 const fr = w.frameElement.getBoundingClientRect(); \
                 x += fr.left + w.frameElement.clientLeft; \
                 y += fr.top + w.frameElement.clientTop; \
                 w = w.parent; \
             } \
             return { ok: true, value: { x, y } };";
        let point: ClickPoint = serde_json::from_value(self.run_when_ready(scope, selector, body).await?)?;

        let page = match scope {
            Scope::Viewport(id) => self.page_for(id).await?,
            _ => self.primary.page().clone(),
        };
        page.click(Point::new(point.x, point.y)).await?;
        debug!("点击 {} {}", scope, selector);
        Ok(())
    }

    async fn press(&self, scope: &Scope, selector: &str, key: &str) -> AppResult<()> {
        let (code, text) = match key {
            "Enter" => (13, "\r"),
            "Tab" => (9, "\t"),
            "Escape" => (27, ""),
            other => return Err(AppError::script_failed(format!("不支持的按键: {}", other))),
        };
        self.run_when_ready(scope, selector, "el.focus(); return { ok: true };").await?;

        let page = match scope {
            Scope::Viewport(id) => self.page_for(id).await?,
            _ => self.primary.page().clone(),
        };
        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let mut builder = DispatchKeyEventParams::builder()
                .r#type(kind.clone())
                .key(key)
                .code(key)
                .windows_virtual_key_code(code)
                .native_virtual_key_code(code);
            if kind == DispatchKeyEventType::KeyDown && !text.is_empty() {
                builder = builder.text(text);
            }
            let params = builder.build().map_err(AppError::script_failed)?;
            page.execute(params).await?;
        }
        Ok(())
    }

    async fn select_option(&self, scope: &Scope, selector: &str, label: &str) -> AppResult<()> {
        let body = format!(
            "const label = {}; \
             const option = Array.from(el.options || []).find(o => o.text.trim() === label); \
             if (!option) return {{ ok: false, error: 'option not found: ' + label }}; \
             el.value = option.value; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return {{ ok: true }};",
            json!(label)
        );
        self.run_when_ready(scope, selector, &body).await?;
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        scope: &Scope,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> AppResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let visibility = self
                .run_on_element(scope, selector, &format!("return {{ ok: true, value: {} }};", VISIBILITY_JS))
                .await;
            if let Ok(value) = visibility {
                let visibility: ElementVisibility = serde_json::from_value(value)?;
                if state == ElementState::Attached || visibility.visible {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(AppError::timeout(format!("{} {}", scope, selector), timeout));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_text(
        &self,
        scope: &Scope,
        selector: &str,
        text: &str,
        timeout: Duration,
    ) -> AppResult<()> {
        let body = format!(
            "return {{ ok: true, value: (el.innerText || el.textContent || '').includes({}) }};",
            json!(text)
        );
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(JsonValue::Bool(true)) = self.run_on_element(scope, selector, &body).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AppError::timeout(format!("{} '{}'", selector, text), timeout));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_load_state(
        &self,
        scope: &Scope,
        state: LoadState,
        timeout: Duration,
    ) -> AppResult<()> {
        let deadline = Instant::now() + timeout;
        let mut last_resources: Option<(u64, Instant)> = None;
        loop {
            if let Ok((ready, resources)) = self.document_state(scope).await {
                let reached = match state {
                    LoadState::DomContentLoaded => ready != "loading",
                    LoadState::Load => ready == "complete",
                    LoadState::NetworkIdle => {
                        if ready != "complete" {
                            last_resources = None;
                            false
                        } else {
                            match last_resources {
                                Some((count, since)) if count == resources => {
                                    since.elapsed() >= NETWORK_QUIET
                                }
                                _ => {
                                    last_resources = Some((resources, Instant::now()));
                                    false
                                }
                            }
                        }
                    }
                };
                if reached {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(AppError::timeout(format!("{} {:?}", scope, state), timeout));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_url(&self, url: &str, timeout: Duration) -> AppResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(Some(current)) = self.primary.page().url().await {
                if current == url {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(AppError::timeout(url, timeout));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn is_visible(&self, scope: &Scope, selector: &str) -> AppResult<bool> {
        match self
            .run_on_element(scope, selector, &format!("return {{ ok: true, value: {} }};", VISIBILITY_JS))
            .await
        {
            Ok(value) => Ok(serde_json::from_value::<ElementVisibility>(value)?.visible),
            Err(AppError::Driver(DriverError::ElementNotFound { .. })) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn inner_text(&self, scope: &Scope, selector: &str) -> AppResult<String> {
        let value = self
            .run_on_element(scope, selector, "return { ok: true, value: el.innerText || el.textContent || '' };")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn evaluate(&self, scope: &Scope, selector: &str, function: &str) -> AppResult<JsonValue> {
        let body = format!("const fn = ({}); return {{ ok: true, value: fn(el) }};", function);
        self.run_on_element(scope, selector, &body).await
    }

    async fn frame(&self, name: &str) -> AppResult<Option<FrameHandle>> {
        let script = format!(
            "(() => {{ {} return findFrame(window, {}) !== null; }})()",
            FIND_FRAME_JS,
            json!(name)
        );
        let found: bool = self.primary.eval_as(script).await?;
        Ok(found.then(|| FrameHandle::new(name)))
    }

    async fn viewports(&self) -> AppResult<Vec<ViewportId>> {
        let live = self.live_viewports().await?;
        if self.owned {
            return Ok(scoped_viewports(&self.primary_id(), live, None));
        }
        let opened = self.opened.lock().await;
        Ok(scoped_viewports(&self.primary_id(), live, Some(&*opened)))
    }

    async fn screenshot(&self, viewport: &ViewportId, path: &Path) -> AppResult<()> {
        let page = self.page_for(viewport).await?;
        page.save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await?;
        Ok(())
    }

    async fn click_expect_viewport(
        &self,
        scope: &Scope,
        selector: &str,
        timeout: Duration,
    ) -> AppResult<ViewportId> {
        let before: HashSet<ViewportId> = self.live_viewports().await?.into_iter().collect();
        self.click(scope, selector).await?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(id) = self
                .live_viewports()
                .await?
                .into_iter()
                .find(|id| !before.contains(id))
            {
                info!("新视口已打开: {}", id);
                self.opened.lock().await.insert(id.clone());
                return Ok(id);
            }
            if Instant::now() >= deadline {
                return Err(AppError::timeout("new viewport", timeout));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn click_expect_download(
        &self,
        scope: &Scope,
        selector: &str,
        destination: &Path,
        timeout: Duration,
    ) -> AppResult<PathBuf> {
        let before = self.staged_files().await?;
        self.click(scope, selector).await?;

        let deadline = Instant::now() + timeout;
        let mut candidate: Option<(PathBuf, u64)> = None;
        loop {
            let finished = self
                .staged_files()
                .await?
                .into_iter()
                .filter(|p| !before.contains(p))
                .find(|p| p.extension().and_then(|e| e.to_str()) != Some("crdownload"));

            if let Some(path) = finished {
                let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
                match &candidate {
                    // 两次轮询大小一致视为写入完成
                    Some((seen, seen_size)) if *seen == path && *seen_size == size => {
                        if let Some(parent) = destination.parent() {
                            tokio::fs::create_dir_all(parent).await?;
                        }
                        tokio::fs::rename(&path, destination).await?;
                        return Ok(destination.to_path_buf());
                    }
                    _ => candidate = Some((path, size)),
                }
            }
            if Instant::now() >= deadline {
                return Err(AppError::timeout(format!("download {}", destination.display()), timeout));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn bring_to_front(&self, scope: &Scope) -> AppResult<()> {
        let page = match scope {
            Scope::Viewport(id) => self.page_for(id).await?,
            _ => self.primary.page().clone(),
        };
        page.bring_to_front().await?;
        Ok(())
    }

    async fn close_viewport(&self, viewport: &ViewportId) -> AppResult<()> {
        if *viewport == self.primary_id() {
            return Err(AppError::from(ConfigError::Browser {
                reason: "不能单独关闭主视口".to_string(),
            }));
        }
        let page = self.page_for(viewport).await?;
        page.close().await?;
        self.opened.lock().await.remove(viewport);
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        let browser = self.browser.lock().await.take();
        if let Some(mut browser) = browser {
            if self.owned {
                browser.close().await?;
                if let Err(e) = browser.wait().await {
                    warn!("等待浏览器进程退出失败: {}", e);
                }
                debug!("浏览器进程已退出");
            }
        }
        if let Some(handler) = self.handler.lock().await.take() {
            handler.abort();
        }
        Ok(())
    }
}

/// 递归按名称查找子框架（跨域框架跳过）
const FIND_FRAME_JS: &str = "const findFrame = (w, name) => { \
    for (let i = 0; i < w.frames.length; i++) { \
        try { \
            const f = w.frames[i]; \
            if (f.name === name) return f; \
            const nested = findFrame(f, name); \
            if (nested) return nested; \
        } catch (e) {} \
    } \
    return null; \
};";

const VISIBILITY_JS: &str = "(() => { \
    const style = win.getComputedStyle(el); \
    const r = el.getBoundingClientRect(); \
    return { visible: style.visibility !== 'hidden' && style.display !== 'none' && (r.width > 0 || r.height > 0) }; \
})()";

/// 主视口在前；`opened` 为 `Some` 时只保留其中的视口
fn scoped_viewports(
    primary: &ViewportId,
    live: Vec<ViewportId>,
    opened: Option<&HashSet<ViewportId>>,
) -> Vec<ViewportId> {
    let mut ids = vec![primary.clone()];
    ids.extend(
        live.into_iter()
            .filter(|id| id != primary)
            .filter(|id| opened.map_or(true, |set| set.contains(id))),
    );
    ids
}

fn document_script(frame: Option<&str>, body: &str) -> String {
    format!(
        "(() => {{ {find} \
           const frameName = {frame}; \
           const win = frameName === null ? window : findFrame(window, frameName); \
           if (!win) return {{ ok: false, error: 'frame not found: ' + frameName }}; \
           const doc = win.document; \
           {body} \
         }})()",
        find = FIND_FRAME_JS,
        frame = json!(frame),
        body = body
    )
}

fn element_script(frame: Option<&str>, selector: &str, body: &str) -> String {
    document_script(
        frame,
        &format!(
            "const el = doc.querySelector({sel}); \
             if (!el) return {{ ok: false, error: 'not found: ' + {sel} }}; \
             {body}",
            sel = json!(selector),
            body = body
        ),
    )
}
