//! 诊断截图服务
//!
//! 出错时对所有打开的视口各截一张整页图。单个视口失败只记录日志。

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::error::AppResult;
use crate::infrastructure::PageDriver;
use crate::utils::{ensure_dir, time_stamp};

/// 一次诊断截图的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticSnapshot {
    pub label: String,
    pub timestamp: String,
    /// 成功保存的截图路径（按视口顺序）
    pub screenshots: Vec<PathBuf>,
}

/// 诊断截图服务
pub struct DiagnosticCollector {
    screenshot_dir: PathBuf,
}

impl DiagnosticCollector {
    pub fn new(screenshot_dir: PathBuf) -> Self {
        Self { screenshot_dir }
    }

    /// 截取所有视口，文件名 `<label>_Window_<index>_<HHMMSSffffff>.png`
    ///
    /// 没有任何视口时记录警告并正常返回。
    pub async fn collect<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        label: &str,
    ) -> AppResult<DiagnosticSnapshot> {
        let timestamp = time_stamp();
        let mut snapshot = DiagnosticSnapshot {
            label: label.to_string(),
            timestamp: timestamp.clone(),
            screenshots: Vec::new(),
        };

        let viewports = driver.viewports().await?;
        if viewports.is_empty() {
            warn!("⚠️ 浏览器上下文中没有任何页面，跳过截图");
            return Ok(snapshot);
        }

        ensure_dir(&self.screenshot_dir).await?;

        for (index, viewport) in viewports.iter().enumerate() {
            let path = self
                .screenshot_dir
                .join(format!("{}_Window_{}_{}.png", label, index, timestamp));
            match driver.screenshot(viewport, &path).await {
                Ok(()) => {
                    info!("📸 窗口 {} 截图已保存: {}", index, path.display());
                    snapshot.screenshots.push(path);
                }
                Err(e) => {
                    error!("❌ 窗口 {} 截图失败: {}", index, e);
                }
            }
        }

        Ok(snapshot)
    }
}
