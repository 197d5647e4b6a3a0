//! # 签名令牌编解码
//!
//! 无状态的 HMAC-SHA256 签名令牌，格式为
//! `base36(签发毫秒) "." base64url(32 字节随机数) "." base64url(签名)`。
//! 有效性只取决于签名与时效，不依赖任何存储。

use crate::ensure_config;
use crate::error::{GuardError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::ldebug;
use crate::utils::clock::{SharedClock, SystemClock, duration_ms};
use crate::utils::random::{OsRandom, SharedRandom, random_token};
use base64::engine::{Engine, general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// 密钥最小长度（字符）
pub const MIN_SECRET_LENGTH: usize = 32;

/// nonce 随机字节数
const NONCE_BYTES: usize = 32;

/// 令牌被拒绝的内部原因，仅用于调试日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Malformed,
    BadSignature,
    BadTimestamp,
    Expired,
}

/// 签名令牌编解码器
#[derive(Clone)]
pub struct SignedTokenCodec {
    mac: HmacSha256,
    clock: SharedClock,
    random: SharedRandom,
}

impl fmt::Debug for SignedTokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedTokenCodec").finish_non_exhaustive()
    }
}

impl SignedTokenCodec {
    /// 使用系统时钟和系统随机源创建
    pub fn new(secret: &str) -> Result<Self> {
        Self::with_sources(secret, SystemClock::shared(), OsRandom::shared())
    }

    /// 使用指定的时钟与随机源创建
    pub fn with_sources(secret: &str, clock: SharedClock, random: SharedRandom) -> Result<Self> {
        ensure_config!(
            secret.chars().count() >= MIN_SECRET_LENGTH,
            "token secret must be at least {} characters",
            MIN_SECRET_LENGTH
        );
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| GuardError::config_with_source("invalid HMAC key", anyhow::anyhow!(e)))?;
        Ok(Self { mac, clock, random })
    }

    /// 签发新令牌
    #[must_use]
    pub fn issue(&self) -> String {
        let issued = to_base36(self.clock.now_ms());
        let nonce = random_token(self.random.as_ref(), NONCE_BYTES);
        let signature = self.sign(&issued, &nonce);
        format!("{issued}.{nonce}.{signature}")
    }

    /// 校验令牌；任何失败都统一返回 `false`
    #[must_use]
    pub fn verify(&self, token: &str, max_age: Duration) -> bool {
        match self.check(token, max_age) {
            Ok(()) => true,
            Err(reason) => {
                ldebug!(
                    "system",
                    LogStage::CsrfCheck,
                    LogComponent::Token,
                    "token_rejected",
                    "signed token rejected",
                    reason = ?reason
                );
                false
            }
        }
    }

    fn check(&self, token: &str, max_age: Duration) -> std::result::Result<(), Rejection> {
        let parts: Vec<&str> = token.split('.').collect();
        let [issued, nonce, signature] = parts.as_slice() else {
            return Err(Rejection::Malformed);
        };
        if issued.is_empty() || nonce.is_empty() || signature.is_empty() {
            return Err(Rejection::Malformed);
        }

        let expected = self.sign(issued, nonce);
        if expected.len() != signature.len()
            || !bool::from(expected.as_bytes().ct_eq(signature.as_bytes()))
        {
            return Err(Rejection::BadSignature);
        }

        let issued_ms = i64::from_str_radix(issued, 36).map_err(|_| Rejection::BadTimestamp)?;
        let age_ms = self.clock.now_ms().saturating_sub(issued_ms);
        if age_ms > duration_ms(max_age) {
            return Err(Rejection::Expired);
        }
        Ok(())
    }

    fn sign(&self, issued: &str, nonce: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(issued.as_bytes());
        mac.update(b".");
        mac.update(nonce.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

/// 用给定密钥签发令牌
pub fn issue_token(secret: &str) -> Result<String> {
    Ok(SignedTokenCodec::new(secret)?.issue())
}

/// 用给定密钥校验令牌；密钥不合法时同样返回 `false`
#[must_use]
pub fn verify_token(token: &str, secret: &str, max_age: Duration) -> bool {
    SignedTokenCodec::new(secret).is_ok_and(|codec| codec.verify(token, max_age))
}

fn to_base36(value: i64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut n = value.unsigned_abs();
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    if value < 0 {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
