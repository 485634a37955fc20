use std::path::PathBuf;

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误（快速失败，不重试）
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 登录 / 会话错误
    #[error("认证错误: {0}")]
    Auth(#[from] AuthError),
    /// 页面导航错误
    #[error("导航错误: {0}")]
    Navigation(#[from] NavigationError),
    /// 报表执行 / 下载错误
    #[error("报表错误: {0}")]
    Report(#[from] ReportError),
    /// 页面自动化能力返回的错误
    #[error("浏览器错误: {0}")]
    Driver(#[from] DriverError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 不支持的 OTP 哈希算法
    #[error("不支持的 OTP 算法: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },
    /// OTP 密钥不是合法的 base32
    #[error("OTP 密钥无效: {reason}")]
    InvalidSecret { reason: String },
    /// OTP 参数超出范围
    #[error("OTP 参数无效: {reason}")]
    InvalidOtpParameter { reason: String },
    /// 未知的逻辑页面
    #[error("不支持的页面名称: {name}")]
    UnknownPage { name: String },
    /// 未知的导出格式
    #[error("不支持的报表格式: {format}")]
    UnknownFormat { format: String },
    /// 日期 / 月份参数解析失败
    #[error("日期解析失败 '{value}', 期望格式 {expected}")]
    InvalidDate { value: String, expected: String },
    /// 凭据文件中找不到客户
    #[error("凭据中不存在客户: {client_id}")]
    UnknownClient { client_id: String },
    /// 浏览器配置失败
    #[error("浏览器配置失败: {reason}")]
    Browser { reason: String },
}

/// 登录 / 会话错误
#[derive(Debug, Error)]
pub enum AuthError {
    /// 登录后仍停留在登录页
    #[error("登录失败，请检查用户凭据 (页面标题: {title})")]
    Authentication { title: String },
    /// 登录后落地页不符合预期
    #[error("无法验证登录状态: 期望 {expected}, 实际 {actual}")]
    SessionVerification { expected: String, actual: String },
    /// 在 open() 之前调用了需要 base_url 的操作
    #[error("门户尚未打开")]
    PortalNotOpened,
    /// 未执行 authenticate() 就提交 OTP
    #[error("尚未提交用户名密码，不能提交 OTP")]
    OtpBeforeLogin,
}

/// 页面导航错误
#[derive(Debug, Error)]
pub enum NavigationError {
    /// 必需的框架不存在
    #[error("找不到框架 '{name}'")]
    FrameResolution { name: String },
    /// 当前不在报表页，框架句柄不可用
    #[error("框架 '{name}' 不可用: 当前不在报表页")]
    FrameUnavailable { name: String },
}

/// 报表执行 / 下载错误
#[derive(Debug, Error)]
pub enum ReportError {
    /// 报表弹窗中出现服务端错误面板
    #[error("加载报表时出错: {message}")]
    Execution { message: String },
    /// 下载失败
    #[error("下载报表 {file_name} 失败: {reason}")]
    Download { file_name: String, reason: String },
    /// 弹窗在超时内未加载完成
    #[error("报表弹窗未加载完成: {reason}")]
    PopupNotLoaded { reason: String },
}

/// 页面自动化能力错误
#[derive(Debug, Error)]
pub enum DriverError {
    /// 等待超时
    #[error("等待 {what} 超时 ({timeout_ms}ms)")]
    Timeout { what: String, timeout_ms: u128 },
    /// 找不到元素
    #[error("找不到元素: {selector}")]
    ElementNotFound { selector: String },
    /// 导航失败
    #[error("导航到 {url} 失败: {reason}")]
    NavigationFailed { url: String, reason: String },
    /// 视口不存在或已关闭
    #[error("视口不存在: {id}")]
    ViewportNotFound { id: String },
    /// 执行脚本失败
    #[error("执行脚本失败: {reason}")]
    ScriptFailed { reason: String },
    /// 浏览器连接 / 协议错误
    #[error("浏览器协议错误: {source}")]
    Protocol {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {}", path.display())]
    NotFound { path: PathBuf },
    /// 读取文件失败
    #[error("读取文件失败 ({}): {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({}): {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    /// 创建目录失败
    #[error("创建目录失败 ({}): {source}", path.display())]
    CreateDirFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({}): {source}", path.display())]
    TomlParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// 其他 IO 错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Driver(DriverError::Protocol {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Driver(DriverError::ScriptFailed {
            reason: err.to_string(),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::Io(err))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建等待超时错误
    pub fn timeout(what: impl Into<String>, timeout: std::time::Duration) -> Self {
        AppError::Driver(DriverError::Timeout {
            what: what.into(),
            timeout_ms: timeout.as_millis(),
        })
    }

    /// 创建元素不存在错误
    pub fn element_not_found(selector: impl Into<String>) -> Self {
        AppError::Driver(DriverError::ElementNotFound {
            selector: selector.into(),
        })
    }

    /// 创建脚本执行错误
    pub fn script_failed(reason: impl Into<String>) -> Self {
        AppError::Driver(DriverError::ScriptFailed {
            reason: reason.into(),
        })
    }

    /// 创建下载失败错误
    pub fn download_failed(file_name: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Report(ReportError::Download {
            file_name: file_name.into(),
            reason: reason.into(),
        })
    }

    /// 是否为配置类错误（快速失败，重试无意义）
    pub fn is_config(&self) -> bool {
        matches!(self, AppError::Config(_))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_verification_names_both_locations() {
        let err = AppError::from(AuthError::SessionVerification {
            expected: "https://portal/LogBook.aspx".to_string(),
            actual: "https://portal/loginpage.aspx".to_string(),
        });
        let text = err.to_string();
        assert!(text.contains("https://portal/LogBook.aspx"));
        assert!(text.contains("https://portal/loginpage.aspx"));
    }

    #[test]
    fn config_errors_are_flagged() {
        let err = AppError::from(ConfigError::UnknownPage {
            name: "billing".to_string(),
        });
        assert!(err.is_config());
        assert!(!AppError::from(ReportError::PopupNotLoaded {
            reason: "timeout".to_string(),
        }).is_config());
    }
}
