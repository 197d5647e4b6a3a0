//! # 错误处理宏

/// 快速创建配置错误的宏
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::GuardError::config($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GuardError::config(format!($fmt, $($arg)*))
    };
}

/// 快速创建凭证错误的宏
#[macro_export]
macro_rules! credential_error {
    ($msg:expr) => {
        $crate::error::GuardError::credential($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GuardError::credential(format!($fmt, $($arg)*))
    };
}

/// 快速创建 OAuth 交换错误的宏
#[macro_export]
macro_rules! exchange_error {
    ($msg:expr) => {
        $crate::error::GuardError::exchange($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GuardError::exchange(format!($fmt, $($arg)*))
    };
}

/// 确保条件成立，否则返回配置错误
#[macro_export]
macro_rules! ensure_config {
    ($cond:expr, $msg:expr) => {
        if !($cond) {
            return Err($crate::config_error!($msg));
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            return Err($crate::config_error!($fmt, $($arg)*));
        }
    };
}
