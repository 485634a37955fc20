//! RFC 6238 TOTP，兼容 Google Authenticator

use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::error::{AppResult, ConfigError};
use crate::otp::OtpProvider;

/// 校验时单侧最多容忍的时间步数
pub const MAX_VERIFY_WINDOW: u64 = 10;

/// HMAC 哈希算法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OtpAlgorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

impl FromStr for OtpAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SHA1" => Ok(OtpAlgorithm::Sha1),
            "SHA256" => Ok(OtpAlgorithm::Sha256),
            "SHA512" => Ok(OtpAlgorithm::Sha512),
            _ => Err(ConfigError::UnsupportedAlgorithm {
                algorithm: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for OtpAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OtpAlgorithm::Sha1 => "SHA1",
            OtpAlgorithm::Sha256 => "SHA256",
            OtpAlgorithm::Sha512 => "SHA512",
        };
        f.write_str(name)
    }
}

/// TOTP 配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotpConfig {
    /// base32 编码的共享密钥
    pub secret: String,
    /// 时间步长（秒）
    pub interval: u64,
    /// 验证码位数
    pub digits: u32,
    pub algorithm: OtpAlgorithm,
}

impl TotpConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            interval: 30,
            digits: 6,
            algorithm: OtpAlgorithm::Sha1,
        }
    }

    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_digits(mut self, digits: u32) -> Self {
        self.digits = digits;
        self
    }

    pub fn with_algorithm(mut self, algorithm: OtpAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }
}

/// 已装入密钥的 HMAC
#[derive(Clone)]
enum KeyedMac {
    Sha1(Hmac<Sha1>),
    Sha256(Hmac<Sha256>),
    Sha512(Hmac<Sha512>),
}

impl KeyedMac {
    fn new(algorithm: OtpAlgorithm, key: &[u8]) -> AppResult<Self> {
        Ok(match algorithm {
            OtpAlgorithm::Sha1 => KeyedMac::Sha1(keyed(key)?),
            OtpAlgorithm::Sha256 => KeyedMac::Sha256(keyed(key)?),
            OtpAlgorithm::Sha512 => KeyedMac::Sha512(keyed(key)?),
        })
    }

    fn sign(&self, msg: &[u8]) -> Vec<u8> {
        match self {
            KeyedMac::Sha1(mac) => finish(mac.clone(), msg),
            KeyedMac::Sha256(mac) => finish(mac.clone(), msg),
            KeyedMac::Sha512(mac) => finish(mac.clone(), msg),
        }
    }
}

/// TOTP 生成器 / 校验器
///
/// 构造时解码密钥、装入 HMAC 并校验参数，之后的生成过程是 (配置, 时间) 的纯函数。
#[derive(Clone)]
pub struct Totp {
    config: TotpConfig,
    mac: KeyedMac,
}

impl fmt::Debug for Totp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Totp")
            .field("interval", &self.config.interval)
            .field("digits", &self.config.digits)
            .field("algorithm", &self.config.algorithm)
            .finish_non_exhaustive()
    }
}

impl Totp {
    pub fn new(config: TotpConfig) -> AppResult<Self> {
        if config.interval == 0 {
            return Err(ConfigError::InvalidOtpParameter {
                reason: "interval 必须大于 0".to_string(),
            }
            .into());
        }
        if !(1..=10).contains(&config.digits) {
            return Err(ConfigError::InvalidOtpParameter {
                reason: format!("digits 必须在 1..=10 之间, 实际为 {}", config.digits),
            }
            .into());
        }
        let key = decode_secret(&config.secret)?;
        let mac = KeyedMac::new(config.algorithm, &key)?;
        Ok(Self { config, mac })
    }

    /// 从字符串形式的算法名构造；未知算法在这里直接报错
    pub fn from_parts(secret: &str, interval: u64, digits: u32, algorithm: &str) -> AppResult<Self> {
        let algorithm = algorithm.parse::<OtpAlgorithm>()?;
        Self::new(
            TotpConfig::new(secret)
                .with_interval(interval)
                .with_digits(digits)
                .with_algorithm(algorithm),
        )
    }

    /// 生成一个随机 base32 密钥（不带填充）
    pub fn generate_secret(length: usize) -> String {
        let mut bytes = vec![0u8; length];
        OsRng.fill_bytes(&mut bytes);
        BASE32.encode(&bytes).trim_end_matches('=').to_string()
    }

    pub fn config(&self) -> &TotpConfig {
        &self.config
    }

    /// 指定时间步的验证码
    fn code_for_counter(&self, counter: u64) -> String {
        let digest = self.mac.sign(&counter.to_be_bytes());

        // 动态截断
        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let binary = u32::from_be_bytes([
            digest[offset],
            digest[offset + 1],
            digest[offset + 2],
            digest[offset + 3],
        ]) & 0x7fff_ffff;

        let code = u64::from(binary) % 10u64.pow(self.config.digits);
        format!("{:0width$}", code, width = self.config.digits as usize)
    }
}

impl OtpProvider for Totp {
    fn generate_at(&self, for_time: u64) -> String {
        self.code_for_counter(for_time / self.config.interval)
    }

    /// 窗口超过 [`MAX_VERIFY_WINDOW`] 时按上限处理
    fn verify_at(&self, code: &str, window: u64, now: u64) -> bool {
        let window = window.min(MAX_VERIFY_WINDOW);
        let counter = now / self.config.interval;
        let first = counter.saturating_sub(window);
        let last = counter.saturating_add(window);
        (first..=last).any(|c| self.code_for_counter(c) == code)
    }

    fn provisioning_uri(&self, account: &str, issuer: &str) -> String {
        format!(
            "otpauth://totp/{issuer}:{account}?secret={}&issuer={issuer}&algorithm={}&digits={}&period={}",
            self.config.secret, self.config.algorithm, self.config.digits, self.config.interval
        )
    }
}

/// 解码 base32 密钥，右侧补 '=' 至 8 的倍数
fn decode_secret(secret: &str) -> AppResult<Vec<u8>> {
    let mut normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    let padding = (8 - normalized.len() % 8) % 8;
    normalized.push_str(&"=".repeat(padding));

    let key = BASE32
        .decode(normalized.as_bytes())
        .map_err(|e| ConfigError::InvalidSecret {
            reason: e.to_string(),
        })?;
    if key.is_empty() {
        return Err(ConfigError::InvalidSecret {
            reason: "密钥为空".to_string(),
        }
        .into());
    }
    Ok(key)
}

fn keyed<M: Mac + KeyInit>(key: &[u8]) -> AppResult<M> {
    <M as KeyInit>::new_from_slice(key).map_err(|e| {
        ConfigError::InvalidSecret {
            reason: e.to_string(),
        }
        .into()
    })
}

fn finish<M: Mac>(mut mac: M, msg: &[u8]) -> Vec<u8> {
    mac.update(msg);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_SHA1: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";
    const RFC_SHA256: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZA";
    const RFC_SHA512: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNA";

    fn rfc(secret: &str, algorithm: OtpAlgorithm) -> Totp {
        Totp::new(TotpConfig::new(secret).with_digits(8).with_algorithm(algorithm)).unwrap()
    }

    #[test]
    fn matches_rfc6238_vectors() {
        let sha1 = rfc(RFC_SHA1, OtpAlgorithm::Sha1);
        assert_eq!(sha1.generate_at(59), "94287082");
        assert_eq!(sha1.generate_at(1_111_111_109), "07081804");
        assert_eq!(sha1.generate_at(1_234_567_890), "89005924");

        let sha256 = rfc(RFC_SHA256, OtpAlgorithm::Sha256);
        assert_eq!(sha256.generate_at(59), "46119246");
        assert_eq!(sha256.generate_at(1_111_111_109), "68084774");

        let sha512 = rfc(RFC_SHA512, OtpAlgorithm::Sha512);
        assert_eq!(sha512.generate_at(59), "90693936");
        assert_eq!(sha512.generate_at(1_234_567_890), "93441116");
    }

    #[test]
    fn six_digit_codes_keep_leading_zeros() {
        let totp = Totp::new(TotpConfig::new(RFC_SHA1)).unwrap();
        assert_eq!(totp.generate_at(1_111_111_109), "081804");
        assert_eq!(totp.generate_at(1_234_567_890), "005924");
    }

    #[test]
    fn unpadded_secret_is_padded_before_decoding() {
        let totp = Totp::new(TotpConfig::new("FH2MMUESLNQUHIH2")).unwrap();
        assert_eq!(totp.generate_at(1_700_000_000), "303315");
    }

    #[test]
    fn same_bucket_same_code() {
        let totp = Totp::new(TotpConfig::new("FH2MMUESLNQUHIH2")).unwrap();
        // 1_699_999_980 是该时间步的起点
        assert_eq!(totp.generate_at(1_699_999_980), totp.generate_at(1_700_000_009));
    }

    #[test]
    fn verify_accepts_one_step_of_drift_only() {
        let totp = Totp::new(TotpConfig::new("FH2MMUESLNQUHIH2")).unwrap();
        let now = 1_700_000_000;

        for k in [-1i64, 0, 1] {
            let code = totp.generate_at((now as i64 + k * 30) as u64);
            assert!(totp.verify_at(&code, 1, now), "offset {k} should be accepted");
        }
        for k in [-2i64, 2] {
            let code = totp.generate_at((now as i64 + k * 30) as u64);
            assert!(!totp.verify_at(&code, 1, now), "offset {k} should be rejected");
        }
        assert!(totp.verify_at("748482", 2, now));
    }

    #[test]
    fn oversized_window_is_capped_without_overflow() {
        let totp = Totp::new(TotpConfig::new("FH2MMUESLNQUHIH2")).unwrap();
        let now = 1_700_000_000;

        assert!(!totp.verify_at("000000", u64::MAX / 10, now));
        assert!(!totp.verify_at("000000", u64::MAX, u64::MAX));

        let edge = totp.generate_at(now + MAX_VERIFY_WINDOW * 30);
        assert!(totp.verify_at(&edge, u64::MAX, now));
        let beyond = totp.generate_at(now + (MAX_VERIFY_WINDOW + 1) * 30);
        assert!(!totp.verify_at(&beyond, u64::MAX, now));
    }

    #[test]
    fn short_keys_sign_with_every_algorithm() {
        for algorithm in [OtpAlgorithm::Sha1, OtpAlgorithm::Sha256, OtpAlgorithm::Sha512] {
            let totp = Totp::new(TotpConfig::new("GE").with_algorithm(algorithm)).unwrap();
            let code = totp.generate_at(59);
            assert_eq!(code.len(), 6, "{algorithm}");
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn unknown_algorithm_fails_at_construction() {
        let err = Totp::from_parts("FH2MMUESLNQUHIH2", 30, 6, "MD5").unwrap_err();
        assert!(err.is_config());
        assert!(Totp::from_parts("FH2MMUESLNQUHIH2", 30, 6, "sha256").is_ok());
    }

    #[test]
    fn invalid_secret_and_parameters_are_rejected() {
        assert!(Totp::new(TotpConfig::new("not base32!")).is_err());
        assert!(Totp::new(TotpConfig::new("FH2MMUESLNQUHIH2").with_interval(0)).is_err());
        assert!(Totp::new(TotpConfig::new("FH2MMUESLNQUHIH2").with_digits(0)).is_err());
    }

    #[test]
    fn provisioning_uri_layout() {
        let totp = Totp::new(TotpConfig::new("FH2MMUESLNQUHIH2")).unwrap();
        assert_eq!(
            totp.provisioning_uri("user@example.com", "MyApp"),
            "otpauth://totp/MyApp:user@example.com?secret=FH2MMUESLNQUHIH2&issuer=MyApp&algorithm=SHA1&digits=6&period=30"
        );
    }

    #[test]
    fn generated_secret_round_trips_through_totp() {
        let secret = Totp::generate_secret(20);
        assert_eq!(secret.len(), 32);
        assert!(!secret.contains('='));
        assert!(Totp::new(TotpConfig::new(secret)).is_ok());
    }
}
