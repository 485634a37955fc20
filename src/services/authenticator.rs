//! 登录服务 - 业务能力层
//!
//! 打开门户、提交用户名密码、提交 OTP、校验落地页、登出。
//! 会话状态由调用方持有，这里只读写传入的 `SessionState`。

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{AppResult, AuthError};
use crate::infrastructure::{ElementState, LoadState, PageDriver, Scope};
use crate::models::SessionState;
use crate::utils::{ensure_dir, mask};

/// 登录页路径片段；门户地址取它之前的前缀
pub const LOGIN_PATH: &str = "loginpage.aspx";
/// 登录成功后的落地页
pub const LANDING_PATH: &str = "LogBook.aspx";
/// 第三方身份提供方地址
pub const IDENTITY_PROVIDER_URL: &str = "https://experityhealth-external.okta.com/";
/// 原生登录页标题
pub const LOGIN_PAGE_TITLE: &str = "PVM > Login";

const USERNAME_INPUT: &str = "#txtLogin";
const NEXT_BUTTON: &str = "#btnNext";
const IDP_PASSWORD_INPUT: &str = "#okta-signin-password";
const IDP_SUBMIT_BUTTON: &str = "#okta-signin-submit";
const PASSWORD_INPUT: &str = "#txtPassword";
const SUBMIT_BUTTON: &str = "#btnSubmit";
const MFA_INPUT: &str = "#input71";
const LOGOUT_CONTROL: &str = "#tdMenuBarItemlogout";

/// 用户名提交后实际走的登录分支
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginBranch {
    /// 跳转到身份提供方，落地页校验推迟到 OTP 之后
    IdentityProvider,
    /// 门户自带的登录表单，已完成校验
    Native,
}

/// 登录服务
///
/// 职责：
/// - 只处理认证相关的页面交互
/// - 不关心报表 / 页面导航
pub struct Authenticator {
    timeout: Duration,
}

impl Authenticator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// 打开门户并记录 base_url，同时确保输出目录存在
    pub async fn open<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &mut SessionState,
        url: &str,
        directories: &[&Path],
    ) -> AppResult<()> {
        for dir in directories {
            ensure_dir(dir).await?;
            info!("📁 输出目录: {}", dir.display());
        }

        driver.goto(url).await?;

        let landed = driver.current_url().await?;
        let base_url = base_url_of(&landed);
        info!("✓ 门户已打开: {}", base_url);

        session.leave_page();
        session.authenticated = false;
        session.awaiting_otp = false;
        session.base_url = Some(base_url);
        Ok(())
    }

    /// 提交用户名密码
    ///
    /// 根据提交用户名后的地址判断走身份提供方还是原生表单。
    pub async fn authenticate<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &mut SessionState,
        username: &str,
        password: &str,
    ) -> AppResult<LoginBranch> {
        let page = Scope::Primary;

        driver
            .wait_for_selector(&page, USERNAME_INPUT, ElementState::Visible, self.timeout)
            .await?;
        driver.fill(&page, USERNAME_INPUT, username).await?;
        info!("👤 已输入用户名: {}", username);
        driver.click(&page, NEXT_BUTTON).await?;
        driver
            .wait_for_load_state(&page, LoadState::NetworkIdle, self.timeout)
            .await?;
        driver
            .wait_for_load_state(&page, LoadState::DomContentLoaded, self.timeout)
            .await?;

        if driver.current_url().await? == IDENTITY_PROVIDER_URL {
            driver
                .wait_for_selector(&page, IDP_PASSWORD_INPUT, ElementState::Visible, self.timeout)
                .await?;
            driver.fill(&page, IDP_PASSWORD_INPUT, password).await?;
            info!("🔑 已输入密码: {}", mask(password));
            driver.click(&page, IDP_SUBMIT_BUTTON).await?;
            session.awaiting_otp = true;
            debug!("身份提供方登录已提交，等待 OTP");
            return Ok(LoginBranch::IdentityProvider);
        }

        driver
            .wait_for_selector(&page, PASSWORD_INPUT, ElementState::Visible, self.timeout)
            .await?;
        driver.fill(&page, PASSWORD_INPUT, password).await?;
        info!("🔑 已输入密码: {}", mask(password));
        driver.click(&page, SUBMIT_BUTTON).await?;
        driver
            .wait_for_load_state(&page, LoadState::DomContentLoaded, self.timeout)
            .await?;

        let title = driver.title().await?;
        if title == LOGIN_PAGE_TITLE {
            return Err(AuthError::Authentication { title }.into());
        }

        self.verify_session(driver, session).await?;
        Ok(LoginBranch::Native)
    }

    /// 提交 OTP，随后校验落地页
    pub async fn submit_otp<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &mut SessionState,
        code: &str,
    ) -> AppResult<()> {
        if !session.awaiting_otp {
            return Err(AuthError::OtpBeforeLogin.into());
        }

        info!("🔐 正在提交二次验证码...");
        let page = Scope::Primary;
        driver
            .wait_for_selector(&page, MFA_INPUT, ElementState::Visible, self.timeout)
            .await?;
        driver.fill(&page, MFA_INPUT, code).await?;
        driver.press(&page, MFA_INPUT, "Enter").await?;
        info!("✓ 验证码已提交: {}", mask(code));

        self.verify_session(driver, session).await?;
        session.awaiting_otp = false;
        Ok(())
    }

    /// 校验当前地址是否为登录后的落地页
    pub async fn verify_session<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &mut SessionState,
    ) -> AppResult<()> {
        let expected = format!("{}{}", session.base_url()?, LANDING_PATH);

        if let Err(e) = driver.wait_for_url(&expected, self.timeout).await {
            debug!("等待落地页失败: {}", e);
        }

        let actual = driver.current_url().await?;
        if actual != expected {
            session.authenticated = false;
            return Err(AuthError::SessionVerification { expected, actual }.into());
        }

        session.authenticated = true;
        info!("✅ 登录校验成功");
        Ok(())
    }

    /// 登出；找不到登出控件时视为已登出
    pub async fn logout<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &mut SessionState,
    ) -> AppResult<()> {
        let page = Scope::Primary;
        if let Err(e) = driver
            .wait_for_selector(&page, LOGOUT_CONTROL, ElementState::Visible, self.timeout)
            .await
        {
            warn!("⚠️ 找不到登出按钮，视为已登出: {}", e);
            session.reset();
            return Ok(());
        }

        driver.click(&page, LOGOUT_CONTROL).await?;
        driver
            .wait_for_load_state(&page, LoadState::Load, self.timeout)
            .await?;
        session.reset();
        info!("👋 已登出");
        Ok(())
    }
}

/// 登录页路径之前的地址前缀；不含登录页路径时返回原地址
fn base_url_of(url: &str) -> String {
    url.split(LOGIN_PATH).next().unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{PageEffect, ScriptedDriver};

    const PORTAL: &str = "https://pvpm.practicevelocity.com/";
    const LOGIN_URL: &str = "https://pvpm.practicevelocity.com/12_5/loginpage.aspx";
    const LANDING: &str = "https://pvpm.practicevelocity.com/12_5/LogBook.aspx";

    fn auth() -> Authenticator {
        Authenticator::new(Duration::from_secs(1))
    }

    async fn opened(driver: &ScriptedDriver) -> SessionState {
        let mut session = SessionState::new();
        auth().open(driver, &mut session, PORTAL, &[]).await.unwrap();
        session
    }

    #[test]
    fn base_url_strips_login_path() {
        assert_eq!(base_url_of(LOGIN_URL), "https://pvpm.practicevelocity.com/12_5/");
        assert_eq!(base_url_of(PORTAL), PORTAL);
    }

    #[tokio::test]
    async fn open_records_base_url_and_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        let driver = ScriptedDriver::scripted(|s| {
            s.redirects.insert(PORTAL.to_string(), LOGIN_URL.to_string());
        });
        let mut session = SessionState::new();

        auth()
            .open(&driver, &mut session, PORTAL, &[downloads.as_path(), downloads.as_path()])
            .await
            .unwrap();

        assert!(downloads.is_dir());
        assert_eq!(session.base_url().unwrap(), "https://pvpm.practicevelocity.com/12_5/");
    }

    #[tokio::test]
    async fn native_login_verifies_landing_page() {
        let driver = ScriptedDriver::scripted(|s| {
            s.redirects.insert(PORTAL.to_string(), LOGIN_URL.to_string());
            s.click_effects.insert(SUBMIT_BUTTON.to_string(), PageEffect::url(LANDING));
        });
        let mut session = opened(&driver).await;

        let branch = auth()
            .authenticate(&driver, &mut session, "user", "secret")
            .await
            .unwrap();

        assert_eq!(branch, LoginBranch::Native);
        assert!(session.authenticated);
        assert!(!session.awaiting_otp);
        assert_eq!(driver.count_calls(&format!("fill page {} secret", PASSWORD_INPUT)), 1);
    }

    #[tokio::test]
    async fn native_login_rejects_login_title() {
        let driver = ScriptedDriver::scripted(|s| {
            s.redirects.insert(PORTAL.to_string(), LOGIN_URL.to_string());
            s.click_effects
                .insert(SUBMIT_BUTTON.to_string(), PageEffect::title(LOGIN_PAGE_TITLE));
        });
        let mut session = opened(&driver).await;

        let err = auth()
            .authenticate(&driver, &mut session, "user", "wrong")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            crate::error::AppError::Auth(AuthError::Authentication { .. })
        ));
        assert!(!session.authenticated);
    }

    #[tokio::test]
    async fn identity_provider_branch_defers_verification() {
        let driver = ScriptedDriver::scripted(|s| {
            s.redirects.insert(PORTAL.to_string(), LOGIN_URL.to_string());
            s.click_effects
                .insert(NEXT_BUTTON.to_string(), PageEffect::url(IDENTITY_PROVIDER_URL));
        });
        let mut session = opened(&driver).await;

        let branch = auth()
            .authenticate(&driver, &mut session, "user", "secret")
            .await
            .unwrap();

        assert_eq!(branch, LoginBranch::IdentityProvider);
        assert!(session.awaiting_otp);
        assert!(!session.authenticated);
        assert_eq!(driver.count_calls("wait_url"), 0);
        assert_eq!(driver.count_calls(&format!("click page {}", IDP_SUBMIT_BUTTON)), 1);
    }

    #[tokio::test]
    async fn identity_provider_password_waits_for_redirected_form() {
        let driver = ScriptedDriver::scripted(|s| {
            s.redirects.insert(PORTAL.to_string(), LOGIN_URL.to_string());
            s.click_effects
                .insert(NEXT_BUTTON.to_string(), PageEffect::url(IDENTITY_PROVIDER_URL));
            s.late_selectors.insert(IDP_PASSWORD_INPUT.to_string());
        });
        let mut session = opened(&driver).await;

        auth()
            .authenticate(&driver, &mut session, "user", "secret")
            .await
            .unwrap();

        let calls = driver.calls();
        let wait = calls
            .iter()
            .position(|c| c == &format!("wait page {} Visible", IDP_PASSWORD_INPUT))
            .unwrap();
        let fill = calls
            .iter()
            .position(|c| c == &format!("fill page {} secret", IDP_PASSWORD_INPUT))
            .unwrap();
        assert!(wait < fill);
    }

    #[tokio::test]
    async fn otp_is_rejected_before_login() {
        let driver = ScriptedDriver::new();
        let mut session = opened(&driver).await;

        let err = auth()
            .submit_otp(&driver, &mut session, "123456")
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AppError::Auth(AuthError::OtpBeforeLogin)));
        assert_eq!(driver.count_calls("press"), 0);
    }

    #[tokio::test]
    async fn otp_submission_presses_enter_and_verifies() {
        let driver = ScriptedDriver::scripted(|s| {
            s.redirects.insert(PORTAL.to_string(), LOGIN_URL.to_string());
            s.press_effects.insert(MFA_INPUT.to_string(), PageEffect::url(LANDING));
        });
        let mut session = opened(&driver).await;
        session.awaiting_otp = true;

        auth()
            .submit_otp(&driver, &mut session, "303315")
            .await
            .unwrap();

        assert!(session.authenticated);
        assert!(!session.awaiting_otp);
        assert_eq!(driver.count_calls(&format!("press page {} Enter", MFA_INPUT)), 1);
    }

    #[tokio::test]
    async fn verification_error_names_both_locations() {
        let driver = ScriptedDriver::scripted(|s| {
            s.redirects.insert(PORTAL.to_string(), LOGIN_URL.to_string());
        });
        let mut session = opened(&driver).await;

        let err = auth().verify_session(&driver, &mut session).await.unwrap_err();
        match err {
            crate::error::AppError::Auth(AuthError::SessionVerification { expected, actual }) => {
                assert_eq!(expected, LANDING);
                assert_eq!(actual, LOGIN_URL);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn logout_without_control_is_a_no_op() {
        let driver = ScriptedDriver::scripted(|s| {
            s.failing_selectors.insert(LOGOUT_CONTROL.to_string());
        });
        let mut session = opened(&driver).await;
        session.authenticated = true;

        auth().logout(&driver, &mut session).await.unwrap();

        assert!(!session.authenticated);
        assert_eq!(driver.count_calls("click"), 0);
    }

    #[tokio::test]
    async fn logout_clicks_control_and_waits_for_load() {
        let driver = ScriptedDriver::new();
        let mut session = opened(&driver).await;
        session.authenticated = true;

        auth().logout(&driver, &mut session).await.unwrap();

        assert_eq!(driver.count_calls(&format!("click page {}", LOGOUT_CONTROL)), 1);
        assert_eq!(driver.count_calls("load page Load"), 1);
        assert!(session.base_url.is_some());
    }
}
