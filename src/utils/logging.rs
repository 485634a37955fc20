/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::{AppResult, FileError};

/// 初始化日志
///
/// # 参数
/// - `terminal_output`: 为 true 时输出到终端，否则写入 `logs/<日期>/automation_<时间>.log`
/// - `base_path`: 日志目录的根目录，默认为当前目录
///
/// # 返回
/// 写入文件时返回日志文件路径
pub fn init_logging(terminal_output: bool, base_path: Option<&Path>) -> AppResult<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if terminal_output {
        // 重复初始化（例如测试中）时忽略
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        return Ok(None);
    }

    let now = chrono::Local::now();
    let logs_dir = base_path
        .unwrap_or_else(|| Path::new("."))
        .join("logs")
        .join(now.format("%Y-%m-%d").to_string());
    fs::create_dir_all(&logs_dir).map_err(|source| FileError::CreateDirFailed {
        path: logs_dir.clone(),
        source,
    })?;

    let log_file = logs_dir.join(format!("automation_{}.log", now.format("%Y%m%d_%H%M%S_%6f")));
    let file = fs::File::create(&log_file).map_err(|source| FileError::WriteFailed {
        path: log_file.clone(),
        source,
    })?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(Some(log_file))
}

/// 记录客户处理开始
pub fn log_client_start(client_id: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 Client ID: {} - START", client_id);
    info!("{}", "=".repeat(60));
}

/// 记录客户处理结束
pub fn log_client_end(client_id: &str) {
    info!("{}", "─".repeat(60));
    info!("🏁 Client ID: {} - END", client_id);
    info!("{}", "─".repeat(60));
}

/// 用圆点遮盖敏感文本（只保留长度）
pub fn mask(secret: &str) -> String {
    "•".repeat(secret.chars().count())
}

/// 高精度时间戳（HHMMSS + 微秒），用于截图文件名
pub fn time_stamp() -> String {
    chrono::Local::now().format("%H%M%S%6f").to_string()
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
