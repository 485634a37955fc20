use std::path::Path;

use serde::Deserialize;
use tokio::fs;

use crate::error::{AppResult, ConfigError, FileError};
use crate::models::credentials::Credentials;

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    clients: Vec<Credentials>,
}

/// 读取凭据文件中的所有客户
pub async fn load_credentials_file(path: &Path) -> AppResult<Vec<Credentials>> {
    if !path.exists() {
        return Err(FileError::NotFound {
            path: path.to_path_buf(),
        }
        .into());
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|source| FileError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;

    let file: CredentialsFile =
        toml::from_str(&content).map_err(|source| FileError::TomlParseFailed {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::debug!("凭据文件中共有 {} 个客户", file.clients.len());
    Ok(file
        .clients
        .into_iter()
        .map(|c| Credentials::new(c.client_id, c.username, c.password, c.auth_passphrase))
        .collect())
}

/// 按客户 ID 读取凭据
pub async fn load_credentials(path: &Path, client_id: &str) -> AppResult<Credentials> {
    load_credentials_file(path)
        .await?
        .into_iter()
        .find(|c| c.client_id == client_id)
        .ok_or_else(|| {
            ConfigError::UnknownClient {
                client_id: client_id.to_string(),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[clients]]
client_id = "16"
username = "alice@zny01"
password = "secret"
auth_passphrase = "FH2MMUESLNQUHIH2"

[[clients]]
client_id = "17"
username = "bob"
password = "pw"
"#;

    #[tokio::test]
    async fn selects_client_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let alice = load_credentials(&path, "16").await.unwrap();
        assert_eq!(alice.username, "alice@zny01");
        assert!(alice.has_otp());

        let bob = load_credentials(&path, "17").await.unwrap();
        assert!(!bob.has_otp());
    }

    #[tokio::test]
    async fn unknown_client_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let err = load_credentials(&path, "99").await.unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_credentials_file(&dir.path().join("nope.toml"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }
}
