//! 一次性密码（OTP）
//!
//! 调用方只依赖 [`OtpProvider`] 能力，TOTP 是其中一种具体实现。

pub mod totp;

pub use totp::{OtpAlgorithm, Totp, TotpConfig};

/// OTP 能力接口
pub trait OtpProvider: Send + Sync {
    /// 生成指定时间戳（Unix 秒）对应的验证码
    fn generate_at(&self, for_time: u64) -> String;

    /// 生成当前时间的验证码
    fn generate(&self) -> String {
        self.generate_at(unix_now())
    }

    /// 在 ±window 个时间步内校验验证码
    fn verify_at(&self, code: &str, window: u64, now: u64) -> bool;

    /// 以当前时间校验验证码
    fn verify(&self, code: &str, window: u64) -> bool {
        self.verify_at(code, window, unix_now())
    }

    /// 生成 otpauth:// 配置 URI（用于二维码）
    fn provisioning_uri(&self, account: &str, issuer: &str) -> String;
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
