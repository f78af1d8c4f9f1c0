//! # 错误处理宏

/// 快速创建配置错误的宏
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::GitterError::config($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GitterError::config(format!($fmt, $($arg)*))
    };
}

/// 快速创建请求参数错误的宏
#[macro_export]
macro_rules! invalid_request {
    ($msg:expr) => {
        $crate::error::GitterError::invalid_request($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GitterError::invalid_request(format!($fmt, $($arg)*))
    };
}

/// 快速创建冲突错误的宏
#[macro_export]
macro_rules! conflict_error {
    ($msg:expr) => {
        $crate::error::GitterError::conflict($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GitterError::conflict(format!($fmt, $($arg)*))
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
