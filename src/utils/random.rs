//! # 随机源
//!
//! 所有令牌、nonce、state 都来自密码学安全的随机源

use base64::engine::{Engine, general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::Arc;

/// 密码学安全随机字节源
pub trait RandomSource: Send + Sync {
    /// 填充缓冲区
    fn fill_bytes(&self, dest: &mut [u8]);
}

/// 共享随机源句柄
pub type SharedRandom = Arc<dyn RandomSource>;

/// 操作系统随机源
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

impl OsRandom {
    #[must_use]
    pub fn shared() -> SharedRandom {
        Arc::new(Self)
    }
}

/// 生成 `len` 字节随机数并以 base64url（无填充）编码
#[must_use]
pub fn random_token(random: &dyn RandomSource, len: usize) -> String {
    let mut bytes = vec![0u8; len];
    random.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
