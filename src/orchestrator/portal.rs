//! 门户自动化外观 - 编排层
//!
//! ## 生命周期
//!
//! ```text
//! launch → login → {clinic_data, report_data, 报表}* → (出错时 collect_exception) → logout → close
//! ```
//!
//! - `login` / `logout` / `close` / `collect_exception` 自己捕获并记录错误，保证生命周期走完
//! - `clinic_data` / `report_data` / 各报表方法记录后继续上抛，由调用方决定是否中止

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::{DriverFactory, LaunchOptions, PageDriver};
use crate::models::{Credentials, DownloadArtifact, LogicalPage, ReportRequest, SessionState};
use crate::otp::OtpProvider;
use crate::services::{
    Authenticator, DiagnosticCollector, DiagnosticSnapshot, LoginBranch, Navigator, ReportService,
};
use crate::utils::{download_directory, screenshot_directory};
use crate::workflow::{BatchOutcome, ReportFlow};

/// 默认的诊所列表快照文件名
pub const CLINIC_DATA_FILE: &str = "ClinicData.html";
/// 默认的报表导航表单快照文件名
pub const REPORT_DATA_FILE: &str = "ClinicReport.html";

/// 门户外观的构造参数
#[derive(Debug, Clone)]
pub struct PortalOptions {
    pub portal_url: String,
    pub download_dir: PathBuf,
    pub screenshot_dir: PathBuf,
    pub headless: bool,
    /// 普通等待超时
    pub timeout: Duration,
    /// 报表加载 / 下载超时
    pub report_timeout: Duration,
    pub chrome_executable: Option<PathBuf>,
    pub debug_port: Option<u16>,
}

impl PortalOptions {
    /// 按配置生成当天的客户目录（目录在打开门户时创建）
    pub fn from_config(config: &Config, client_id: &str) -> AppResult<Self> {
        let base = config.base_path.as_deref();
        Ok(Self {
            portal_url: config.portal_url.clone(),
            download_dir: download_directory(client_id, base, None, false)?,
            screenshot_dir: screenshot_directory(client_id, base, None, false)?,
            headless: config.headless,
            timeout: config.default_timeout,
            report_timeout: config.report_timeout,
            chrome_executable: config.chrome_executable.clone(),
            debug_port: config.browser_debug_port,
        })
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            headless: self.headless,
            timeout: self.timeout,
            download_dir: self.download_dir.clone(),
            chrome_executable: self.chrome_executable.clone(),
            debug_port: self.debug_port,
        }
    }
}

/// 门户自动化外观
///
/// 唯一持有驱动和会话状态的结构；单一所有者，不可重入。
pub struct Portal<D: PageDriver> {
    driver: D,
    session: SessionState,
    options: PortalOptions,
    authenticator: Authenticator,
    flow: ReportFlow,
    diagnostics: DiagnosticCollector,
    closed: bool,
}

impl<D: PageDriver> Portal<D> {
    /// 启动浏览器并创建外观；启动失败时工厂已释放资源
    pub async fn launch<F>(factory: &F, options: PortalOptions) -> AppResult<Self>
    where
        F: DriverFactory<Driver = D>,
    {
        let driver = factory.launch(&options.launch_options()).await.map_err(|e| {
            error!("❌ 启动浏览器失败: {}", e);
            e
        })?;
        Ok(Self::with_driver(driver, options))
    }

    /// 使用已创建的驱动
    pub fn with_driver(driver: D, options: PortalOptions) -> Self {
        let navigator = Navigator::new(options.timeout);
        let reports = ReportService::new(
            options.timeout,
            options.report_timeout,
            options.download_dir.clone(),
        );
        Self {
            authenticator: Authenticator::new(options.timeout),
            flow: ReportFlow::new(navigator, reports),
            diagnostics: DiagnosticCollector::new(options.screenshot_dir.clone()),
            driver,
            session: SessionState::new(),
            options,
            closed: false,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn options(&self) -> &PortalOptions {
        &self.options
    }

    /// 登录；失败只记录日志，返回是否已通过校验
    ///
    /// `make_otp` 用客户的 OTP 密钥构造验证码生成器，只在配置了密钥时调用。
    pub async fn login<P, F>(&mut self, credentials: &Credentials, make_otp: F) -> bool
    where
        P: OtpProvider,
        F: FnOnce(&str) -> AppResult<P>,
    {
        info!("🔐 正在登录: {}", credentials.username);
        match self.try_login(credentials, make_otp).await {
            Ok(()) => self.session.authenticated,
            Err(e) => {
                error!("❌ 登录失败: {}", e);
                false
            }
        }
    }

    async fn try_login<P, F>(&mut self, credentials: &Credentials, make_otp: F) -> AppResult<()>
    where
        P: OtpProvider,
        F: FnOnce(&str) -> AppResult<P>,
    {
        let directories = [
            self.options.download_dir.as_path(),
            self.options.screenshot_dir.as_path(),
        ];
        self.authenticator
            .open(
                &self.driver,
                &mut self.session,
                &self.options.portal_url,
                &directories,
            )
            .await?;

        let branch = self
            .authenticator
            .authenticate(
                &self.driver,
                &mut self.session,
                &credentials.username,
                &credentials.password,
            )
            .await?;

        match (branch, credentials.auth_passphrase.as_deref()) {
            (LoginBranch::IdentityProvider, Some(secret)) => {
                let code = make_otp(secret)?.generate();
                self.authenticator
                    .submit_otp(&self.driver, &mut self.session, &code)
                    .await?;
            }
            (LoginBranch::IdentityProvider, None) => {
                warn!("⚠️ 身份提供方登录但未配置 OTP 密钥，直接校验落地页");
                self.authenticator
                    .verify_session(&self.driver, &mut self.session)
                    .await?;
            }
            (LoginBranch::Native, Some(_)) => {
                debug!("原生表单登录已通过校验，不提交 OTP");
            }
            (LoginBranch::Native, None) => {}
        }
        Ok(())
    }

    /// 保存诊所列表快照
    pub async fn clinic_data(&mut self, file_name: &str) -> AppResult<PathBuf> {
        let result = async {
            self.flow
                .navigator()
                .navigate_to(&self.driver, &mut self.session, LogicalPage::Clinic)
                .await?;
            self.flow.reports().clinic_data(&self.driver, file_name).await
        }
        .await;
        result.map_err(|e| {
            error!("❌ 无法获取诊所数据: {}", e);
            e
        })
    }

    /// 保存报表导航表单快照
    pub async fn report_data(&mut self, file_name: &str) -> AppResult<PathBuf> {
        let result = async {
            self.flow
                .navigator()
                .navigate_to(&self.driver, &mut self.session, LogicalPage::Report)
                .await?;
            self.flow
                .reports()
                .report_data(&self.driver, &self.session, file_name)
                .await
        }
        .await;
        result.map_err(|e| {
            error!("❌ 无法获取报表数据: {}", e);
            e
        })
    }

    pub async fn date_range_report(
        &mut self,
        code: &str,
        title: &str,
        from: &str,
        to: &str,
    ) -> AppResult<Vec<DownloadArtifact>> {
        self.flow
            .date_range_report(&self.driver, &mut self.session, code, title, from, to)
            .await
            .map_err(|e| report_failed(code, e))
    }

    pub async fn month_report(
        &mut self,
        code: &str,
        title: &str,
        labels: &[String],
    ) -> AppResult<BatchOutcome> {
        self.flow
            .month_report(&self.driver, &mut self.session, code, title, labels)
            .await
            .map_err(|e| report_failed(code, e))
    }

    pub async fn month_range_report(
        &mut self,
        code: &str,
        title: &str,
        from_label: &str,
        to_label: &str,
    ) -> AppResult<Vec<DownloadArtifact>> {
        self.flow
            .month_range_report(
                &self.driver,
                &mut self.session,
                code,
                title,
                from_label,
                to_label,
            )
            .await
            .map_err(|e| report_failed(code, e))
    }

    pub async fn month_range_report_monthly(
        &mut self,
        code: &str,
        title: &str,
        labels: &[String],
    ) -> AppResult<BatchOutcome> {
        self.flow
            .month_range_report_monthly(&self.driver, &mut self.session, code, title, labels)
            .await
            .map_err(|e| report_failed(code, e))
    }

    /// 执行任意形态的报表请求
    pub async fn report(&mut self, request: &ReportRequest) -> AppResult<BatchOutcome> {
        self.flow
            .execute(&self.driver, &mut self.session, request)
            .await
            .map_err(|e| report_failed(&request.code, e))
    }

    /// 截取所有视口；失败只记录日志
    pub async fn collect_exception(&self, label: &str) -> Option<DiagnosticSnapshot> {
        match self.diagnostics.collect(&self.driver, label).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                error!("❌ 无法收集异常截图: {}", e);
                None
            }
        }
    }

    /// 登出；失败只记录日志
    pub async fn logout(&mut self) {
        if self.closed {
            debug!("浏览器已关闭，跳过登出");
            return;
        }
        if let Err(e) = self
            .authenticator
            .logout(&self.driver, &mut self.session)
            .await
        {
            error!("❌ 登出失败: {}", e);
        }
    }

    /// 关闭浏览器；可重复调用，失败只记录日志
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match self.driver.close().await {
            Ok(()) => info!("✓ 浏览器已关闭"),
            Err(e) => error!("❌ 关闭浏览器失败: {}", e),
        }
    }
}

fn report_failed(code: &str, e: crate::error::AppError) -> crate::error::AppError {
    error!("❌ 无法下载 {} 报表: {}", code, e);
    e
}
