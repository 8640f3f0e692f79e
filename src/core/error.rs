//! 引擎错误类型
//!
//! 分三类：瞬时网络失败（下次轮询/重试自愈）、部分提交失败（逐商品隔离）、
//! 不变量被破坏（对会话致命，强制回到 Disabled）。

use thiserror::Error;

use crate::backend::BackendError;

/// 引擎运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// 会话不变量被破坏（如 active 为真但结束时间为空），对会话致命
    #[error("Session invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Config error: {0}")]
    Config(String),
}
