//! # PKCE (Proof Key for Code Exchange)
//!
//! RFC 7636：授权请求携带 `code_challenge = base64url(SHA256(verifier))`，
//! 令牌交换时提交原始 verifier，授权码被截获也无法兑换。

use crate::utils::random::RandomSource;
use base64::engine::{Engine, general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

/// Code Verifier 长度范围
pub const MIN_CODE_VERIFIER_LENGTH: usize = 43;
pub const MAX_CODE_VERIFIER_LENGTH: usize = 128;
pub const DEFAULT_CODE_VERIFIER_LENGTH: usize = 64;

/// 唯一支持的挑战方法
pub const CHALLENGE_METHOD: &str = "S256";

/// RFC 7636 unreserved 字符集
const UNRESERVED: &[u8; 66] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// 拒绝采样上界，保证字符分布均匀
const SAMPLE_CEILING: u8 = 198;

/// verifier 与 challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// 生成默认长度的 PKCE 参数
    #[must_use]
    pub fn generate(random: &dyn RandomSource) -> Self {
        let verifier = generate_verifier(random, DEFAULT_CODE_VERIFIER_LENGTH);
        debug_assert!(is_valid_verifier(&verifier));
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    /// 授权请求参数
    #[must_use]
    pub fn authorization_params(&self) -> [(&'static str, &str); 2] {
        [
            ("code_challenge", self.challenge.as_str()),
            ("code_challenge_method", CHALLENGE_METHOD),
        ]
    }
}

/// 生成指定长度的 verifier，长度会被夹到合法范围内
#[must_use]
pub fn generate_verifier(random: &dyn RandomSource, length: usize) -> String {
    let length = length.clamp(MIN_CODE_VERIFIER_LENGTH, MAX_CODE_VERIFIER_LENGTH);
    let mut out = String::with_capacity(length);
    let mut buf = [0u8; 64];

    while out.len() < length {
        random.fill_bytes(&mut buf);
        for &byte in &buf {
            if byte < SAMPLE_CEILING {
                out.push(char::from(UNRESERVED[usize::from(byte) % UNRESERVED.len()]));
                if out.len() == length {
                    break;
                }
            }
        }
    }
    out
}

/// S256 challenge
#[must_use]
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// verifier 是否符合 RFC 7636 的长度与字符集
#[must_use]
pub fn is_valid_verifier(verifier: &str) -> bool {
    (MIN_CODE_VERIFIER_LENGTH..=MAX_CODE_VERIFIER_LENGTH).contains(&verifier.len())
        && verifier.bytes().all(|b| UNRESERVED.contains(&b))
}
