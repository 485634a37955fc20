use anyhow::{Context, Result};
use experity_reports::models::load_credentials;
use experity_reports::orchestrator::{CLINIC_DATA_FILE, REPORT_DATA_FILE};
use experity_reports::utils::init_logging;
use experity_reports::utils::logging::{log_client_end, log_client_start};
use experity_reports::{
    AppError, ChromiumLauncher, Config, Credentials, Portal, PortalOptions, Totp,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    let log_file = init_logging(config.terminal_output, config.base_path.as_deref())
        .context("初始化日志失败")?;
    if let Some(path) = log_file {
        info!("📝 日志文件: {}", path.display());
    }

    let credentials = load_credentials(&config.credentials_file, &config.client_id)
        .await
        .with_context(|| format!("加载客户 {} 的凭据失败", config.client_id))?;

    log_client_start(&credentials.client_id);
    let result = run(&config, &credentials).await;
    log_client_end(&credentials.client_id);

    result
}

/// 登录 → 诊所数据 → 报表数据；出错时截图，最后总是登出并关闭浏览器
async fn run(config: &Config, credentials: &Credentials) -> Result<()> {
    let options = PortalOptions::from_config(config, &credentials.client_id)?;
    let mut portal = Portal::launch(&ChromiumLauncher, options)
        .await
        .context("启动浏览器失败")?;

    let outcome = async {
        portal
            .login(credentials, |secret| {
                Totp::from_parts(
                    secret,
                    config.otp_interval,
                    config.otp_digits,
                    &config.otp_algorithm,
                )
            })
            .await;
        portal.clinic_data(CLINIC_DATA_FILE).await?;
        portal.report_data(REPORT_DATA_FILE).await?;
        Ok::<(), AppError>(())
    }
    .await;

    if let Err(e) = &outcome {
        portal.collect_exception("Exception").await;
        error!("❌ 自动化过程中出错: {}", e);
    }

    portal.logout().await;
    portal.close().await;

    outcome.context("自动化未完成")
}
