//! 客户输出目录
//!
//! 目录结构：`<base 或当前目录>/<downloads|screenshots>/<DD-MM-YYYY>/<client_id>`

use std::path::{Path, PathBuf};

use crate::error::{AppResult, FileError};

/// 构造客户目录路径（不创建）
pub fn client_directory(
    client_id: &str,
    base_path: Option<&Path>,
    directory: &str,
    date: Option<&str>,
) -> PathBuf {
    let date_folder = match date {
        Some(date) => date.to_string(),
        None => chrono::Local::now().format("%d-%m-%Y").to_string(),
    };
    let root = base_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    root.join(directory).join(date_folder).join(client_id)
}

/// 下载目录，`create` 为 true 时确保目录存在
pub fn download_directory(
    client_id: &str,
    base_path: Option<&Path>,
    date: Option<&str>,
    create: bool,
) -> AppResult<PathBuf> {
    let path = client_directory(client_id, base_path, "downloads", date);
    if create {
        create_dir_sync(&path)?;
    }
    Ok(path)
}

/// 截图目录，`create` 为 true 时确保目录存在
pub fn screenshot_directory(
    client_id: &str,
    base_path: Option<&Path>,
    date: Option<&str>,
    create: bool,
) -> AppResult<PathBuf> {
    let path = client_directory(client_id, base_path, "screenshots", date);
    if create {
        create_dir_sync(&path)?;
    }
    Ok(path)
}

/// 确保目录存在；已存在时直接成功
pub async fn ensure_dir(path: &Path) -> AppResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| FileError::CreateDirFailed {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(())
}

fn create_dir_sync(path: &Path) -> AppResult<()> {
    std::fs::create_dir_all(path).map_err(|source| FileError::CreateDirFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
