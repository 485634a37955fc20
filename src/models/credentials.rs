use std::fmt;

use serde::Deserialize;

/// 门户登录凭据（不可变值）
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub username: String,
    pub password: String,
    /// OTP 共享密钥（base32）；为空表示该账号未启用 MFA
    #[serde(default)]
    pub auth_passphrase: Option<String>,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        auth_passphrase: Option<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            username: username.into(),
            password: password.into(),
            auth_passphrase: auth_passphrase.filter(|p| !p.trim().is_empty()),
        }
    }

    pub fn has_otp(&self) -> bool {
        self.auth_passphrase
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
    }
}

// 密码和密钥不进日志
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"***")
            .field("auth_passphrase", &self.auth_passphrase.as_ref().map(|_| "***"))
            .finish()
    }
}
