//! 会话状态
//!
//! 由编排层独占持有，以 `&mut SessionState` 的形式显式传给各个服务，
//! 不存在全局或共享的会话副本。

use std::fmt;
use std::str::FromStr;

use crate::error::{AppResult, ConfigError, NavigationError};
use crate::infrastructure::{FrameHandle, Scope};

/// 逻辑页面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalPage {
    /// 报表执行与导出界面
    Report,
    /// 诊所信息列表
    Clinic,
}

impl LogicalPage {
    /// 相对于 base_url 的门户路径
    pub fn path(self) -> &'static str {
        match self {
            LogicalPage::Report => "Reports.aspx",
            LogicalPage::Clinic => "ClinicInfo.aspx",
        }
    }
}

impl FromStr for LogicalPage {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "report" => Ok(LogicalPage::Report),
            "clinic" => Ok(LogicalPage::Clinic),
            _ => Err(ConfigError::UnknownPage { name: s.to_string() }),
        }
    }
}

impl fmt::Display for LogicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalPage::Report => f.write_str("report"),
            LogicalPage::Clinic => f.write_str("clinic"),
        }
    }
}

/// 报表页的三个子框架
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFrames {
    pub main: FrameHandle,
    pub nav: Option<FrameHandle>,
    pub content: Option<FrameHandle>,
}

/// 会话状态
#[derive(Debug, Default)]
pub struct SessionState {
    pub authenticated: bool,
    /// 登录页路径之前的门户地址前缀，用于后续的相对导航
    pub base_url: Option<String>,
    /// 已提交用户名密码，等待 OTP
    pub awaiting_otp: bool,
    current_page: Option<LogicalPage>,
    frames: Option<ReportFrames>,
    pub last_searched_report: Option<String>,
    pub last_selected_report: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_page(&self) -> Option<LogicalPage> {
        self.current_page
    }

    pub fn base_url(&self) -> AppResult<&str> {
        self.base_url
            .as_deref()
            .ok_or_else(|| crate::error::AuthError::PortalNotOpened.into())
    }

    /// 记录已到达的逻辑页面
    ///
    /// 框架句柄只在报表页有效；离开报表页时清空框架和报表选择记录。
    pub fn enter_page(&mut self, page: LogicalPage, frames: Option<ReportFrames>) {
        self.current_page = Some(page);
        if page == LogicalPage::Report {
            self.frames = frames;
        } else {
            self.frames = None;
        }
        self.last_searched_report = None;
        self.last_selected_report = None;
    }

    /// 页面已离开追踪范围（例如登出、重新打开门户）
    pub fn leave_page(&mut self) {
        self.current_page = None;
        self.frames = None;
        self.last_searched_report = None;
        self.last_selected_report = None;
    }

    pub fn frames(&self) -> Option<&ReportFrames> {
        match self.current_page {
            Some(LogicalPage::Report) => self.frames.as_ref(),
            _ => None,
        }
    }

    /// 导航框架（NavFrame）的作用域
    pub fn nav_scope(&self) -> AppResult<Scope> {
        self.frames()
            .and_then(|f| f.nav.clone())
            .map(Scope::Frame)
            .ok_or_else(|| {
                NavigationError::FrameUnavailable {
                    name: "NavFrame".to_string(),
                }
                .into()
            })
    }

    /// 报表内容框架（PVRC_MainStage）的作用域
    pub fn content_scope(&self) -> AppResult<Scope> {
        self.frames()
            .and_then(|f| f.content.clone())
            .map(Scope::Frame)
            .ok_or_else(|| {
                NavigationError::FrameUnavailable {
                    name: "PVRC_MainStage".to_string(),
                }
                .into()
            })
    }

    /// 登出后重置
    pub fn reset(&mut self) {
        let base_url = self.base_url.take();
        *self = Self {
            base_url,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames() -> ReportFrames {
        ReportFrames {
            main: FrameHandle::new("reportMainWindow"),
            nav: Some(FrameHandle::new("NavFrame")),
            content: None,
        }
    }

    #[test]
    fn unknown_page_is_config_error() {
        assert!(matches!(
            "billing".parse::<LogicalPage>(),
            Err(ConfigError::UnknownPage { .. })
        ));
        assert_eq!("report".parse::<LogicalPage>().unwrap(), LogicalPage::Report);
    }

    #[test]
    fn frames_are_only_valid_on_report_page() {
        let mut session = SessionState::new();
        session.enter_page(LogicalPage::Report, Some(frames()));
        assert!(session.nav_scope().is_ok());
        assert!(session.content_scope().is_err());

        session.enter_page(LogicalPage::Clinic, Some(frames()));
        assert!(session.frames().is_none());
        assert!(session.nav_scope().is_err());
    }

    #[test]
    fn reset_keeps_base_url_only() {
        let mut session = SessionState::new();
        session.base_url = Some("https://portal/".to_string());
        session.authenticated = true;
        session.enter_page(LogicalPage::Clinic, None);
        session.reset();
        assert!(!session.authenticated);
        assert_eq!(session.current_page(), None);
        assert_eq!(session.base_url().unwrap(), "https://portal/");
    }
}
