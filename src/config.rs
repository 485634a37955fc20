use std::path::PathBuf;
use std::time::Duration;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 门户登录地址
    pub portal_url: String,
    /// 要处理的客户 ID
    pub client_id: String,
    /// 凭据 TOML 文件
    pub credentials_file: PathBuf,
    /// 输出根目录（默认为当前目录）
    pub base_path: Option<PathBuf>,
    /// 是否无头模式运行浏览器
    pub headless: bool,
    /// 日志输出到终端（否则写入 logs/ 下的日志文件）
    pub terminal_output: bool,
    /// 浏览器调试端口（设置后连接已运行的浏览器，而不是启动新的）
    pub browser_debug_port: Option<u16>,
    /// 浏览器可执行文件路径
    pub chrome_executable: Option<PathBuf>,
    /// 通用等待超时
    pub default_timeout: Duration,
    /// 报表加载 / 下载超时
    pub report_timeout: Duration,
    // --- OTP 配置 ---
    pub otp_interval: u64,
    pub otp_digits: u32,
    pub otp_algorithm: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal_url: "https://pvpm.practicevelocity.com/".to_string(),
            client_id: String::new(),
            credentials_file: PathBuf::from("credentials.toml"),
            base_path: None,
            headless: true,
            terminal_output: false,
            browser_debug_port: None,
            chrome_executable: None,
            default_timeout: Duration::from_secs(30),
            report_timeout: Duration::from_secs(20 * 60),
            otp_interval: 30,
            otp_digits: 6,
            otp_algorithm: "SHA1".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            portal_url: std::env::var("PORTAL_URL").unwrap_or(default.portal_url),
            client_id: std::env::var("CLIENT_ID").unwrap_or(default.client_id),
            credentials_file: std::env::var("CREDENTIALS_FILE").map(PathBuf::from).unwrap_or(default.credentials_file),
            base_path: std::env::var("BASE_PATH").ok().map(PathBuf::from).or(default.base_path),
            headless: std::env::var("HEADLESS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.headless),
            terminal_output: std::env::var("TERMINAL_OUTPUT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.terminal_output),
            browser_debug_port: std::env::var("BROWSER_DEBUG_PORT").ok().and_then(|v| v.parse().ok()).or(default.browser_debug_port),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().map(PathBuf::from).or(default.chrome_executable),
            default_timeout: std::env::var("DEFAULT_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(default.default_timeout),
            report_timeout: std::env::var("REPORT_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(default.report_timeout),
            otp_interval: std::env::var("OTP_INTERVAL").ok().and_then(|v| v.parse().ok()).unwrap_or(default.otp_interval),
            otp_digits: std::env::var("OTP_DIGITS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.otp_digits),
            otp_algorithm: std::env::var("OTP_ALGORITHM").unwrap_or(default.otp_algorithm),
        }
    }
}
