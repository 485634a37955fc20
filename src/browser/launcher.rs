use std::path::Path;

use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, ConfigError};
use crate::infrastructure::LaunchOptions;

/// 浏览器、主页面与事件处理任务
pub struct BrowserSession {
    pub browser: Browser,
    pub page: Page,
    pub handler: JoinHandle<()>,
    /// 由本程序启动（关闭时需要结束进程）；连接的外部浏览器不关闭
    pub owned: bool,
}

/// 启动浏览器并打开一个空白页面
pub async fn launch_browser(options: &LaunchOptions, download_staging: &Path) -> AppResult<BrowserSession> {
    info!("🚀 启动浏览器 (headless={})...", options.headless);

    let mut builder = BrowserConfig::builder().request_timeout(options.timeout);
    builder = if options.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    if let Some(executable) = &options.chrome_executable {
        builder = builder.chrome_executable(executable);
    }
    let config = builder
        .args(vec![
            "--disable-gpu",           // 无头模式必须禁用 GPU
            "--no-sandbox",            // 禁用沙盒，防止权限问题导致的崩溃
            "--disable-dev-shm-usage", // 防止共享内存不足
            "--disable-popup-blocking",
        ])
        .build()
        .map_err(|e| {
            debug!("配置浏览器失败: {}", e);
            AppError::from(ConfigError::Browser { reason: e })
        })?;

    let (mut browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        debug!("启动浏览器失败: {}", e);
        e
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    let handler = tokio::spawn(async move { while (handler.next().await).is_some() {} });

    match prepare_page(&browser, download_staging).await {
        Ok(page) => {
            info!("✅ 浏览器已就绪, 超时 = {}ms", options.timeout.as_millis());
            Ok(BrowserSession {
                browser,
                page,
                handler,
                owned: true,
            })
        }
        Err(e) => {
            warn!("初始化浏览器页面失败，正在释放资源: {}", e);
            if let Err(close_err) = browser.close().await {
                warn!("关闭浏览器失败: {}", close_err);
            }
            let _ = browser.wait().await;
            handler.abort();
            Err(e)
        }
    }
}

/// 连接到已经运行的浏览器（远程调试端口）
pub async fn connect_to_browser(port: u16, download_staging: &Path) -> AppResult<BrowserSession> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        debug!("连接浏览器失败: {}", e);
        e
    })?;
    debug!("浏览器连接成功");

    let handler = tokio::spawn(async move { while (handler.next().await).is_some() {} });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    match prepare_page(&browser, download_staging).await {
        Ok(page) => Ok(BrowserSession {
            browser,
            page,
            handler,
            owned: false,
        }),
        Err(e) => {
            handler.abort();
            Err(e)
        }
    }
}

async fn prepare_page(browser: &Browser, download_staging: &Path) -> AppResult<Page> {
    tokio::fs::create_dir_all(download_staging).await?;

    let params = SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::Allow)
        .download_path(download_staging.to_string_lossy().to_string())
        .build()
        .map_err(|e| AppError::from(ConfigError::Browser { reason: e }))?;
    browser.execute(params).await?;
    debug!("下载目录: {}", download_staging.display());

    let page = browser.new_page("about:blank").await.map_err(|e| {
        debug!("创建页面失败: {}", e);
        e
    })?;
    Ok(page)
}
