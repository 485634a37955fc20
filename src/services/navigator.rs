//! 页面导航服务 - 业务能力层
//!
//! 把逻辑页面映射为门户路径，重复导航到当前页面时直接返回。
//! 进入报表页后解析报表所需的三个命名框架。

use std::time::Duration;

use tracing::{debug, info};

use crate::error::{AppResult, NavigationError};
use crate::infrastructure::{LoadState, PageDriver, Scope};
use crate::models::{LogicalPage, ReportFrames, SessionState};

/// 报表页主框架（必需）
pub const MAIN_FRAME: &str = "reportMainWindow";
/// 报表导航框架
pub const NAV_FRAME: &str = "NavFrame";
/// 报表内容框架
pub const CONTENT_FRAME: &str = "PVRC_MainStage";

/// 页面导航服务
pub struct Navigator {
    timeout: Duration,
}

impl Navigator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// 按名称导航（"report" / "clinic"）
    ///
    /// 名称无法识别时在任何网络操作之前返回配置错误。
    pub async fn navigate<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &mut SessionState,
        target: &str,
    ) -> AppResult<()> {
        let page: LogicalPage = target.parse()?;
        self.navigate_to(driver, session, page).await
    }

    /// 导航到逻辑页面；已在该页面时不做任何操作
    pub async fn navigate_to<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &mut SessionState,
        page: LogicalPage,
    ) -> AppResult<()> {
        if session.current_page() == Some(page) {
            debug!("已在 {} 页面，跳过导航", page);
            return Ok(());
        }

        let url = format!("{}{}", session.base_url()?, page.path());
        driver.goto(&url).await?;
        driver
            .wait_for_load_state(&Scope::Primary, LoadState::NetworkIdle, self.timeout)
            .await?;
        info!("🧭 已导航到 {}", driver.current_url().await.unwrap_or(url));

        let frames = match page {
            LogicalPage::Report => match self.resolve_frames(driver).await {
                Ok(frames) => Some(frames),
                Err(e) => {
                    // 框架不完整时不记录当前页面，下次导航会重新加载
                    session.leave_page();
                    return Err(e);
                }
            },
            LogicalPage::Clinic => None,
        };

        session.enter_page(page, frames);
        Ok(())
    }

    /// 解析报表页框架；主框架缺失是错误，其余两个允许缺失
    async fn resolve_frames<D: PageDriver + ?Sized>(&self, driver: &D) -> AppResult<ReportFrames> {
        let main = driver.frame(MAIN_FRAME).await?.ok_or_else(|| {
            debug!("找不到主框架 '{}'", MAIN_FRAME);
            NavigationError::FrameResolution {
                name: MAIN_FRAME.to_string(),
            }
        })?;
        let nav = driver.frame(NAV_FRAME).await?;
        let content = driver.frame(CONTENT_FRAME).await?;

        info!(
            "✓ 框架已解析: main=true, nav={}, content={}",
            nav.is_some(),
            content.is_some()
        );
        Ok(ReportFrames { main, nav, content })
    }
}
