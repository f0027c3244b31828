//! 对象池错误域。
//!
//! # 角色定位（Why）
//! - 池的误用（归还来源不明的实例、归还未通过校验的实例、销毁后仍归还）必须立即暴露，
//!   而不是悄悄污染自由链表；
//! - 错误码遵循 `<领域>.<语义>` 约定，便于与通道、管道层错误在日志中统一聚合。

use thiserror::Error;

/// 稳定错误码常量。
pub mod codes {
    /// 归还的实例不是由当前池租借。
    pub const POOL_FOREIGN_INSTANCE: &str = "pool.foreign_instance";
    /// 归还的实例未通过池策略校验。
    pub const POOL_INVALID_INSTANCE: &str = "pool.invalid_instance";
    /// 池配置非法。
    pub const POOL_INVALID_CONFIG: &str = "pool.invalid_config";
    /// 向已销毁的池显式归还实例。
    pub const POOL_DISPOSED: &str = "pool.disposed";
}

/// 对象池错误。
///
/// # 契约（What）
/// - 所有变体均为 `Send + Sync + 'static`，可直接经 `?` 向上传播；
/// - 出错时被归还的实例已经按策略销毁或交还其真实来源池，池内部状态保持一致。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// 开启来源校验时，实例携带的池标识与当前池不符。
    #[error("instance was borrowed from pool #{actual}, not from pool #{expected}")]
    ForeignInstance { expected: u64, actual: u64 },

    /// 池策略判定实例不可复用（例如容量被外部截断）。
    #[error("instance rejected by pool policy `{policy}`")]
    InvalidInstance { policy: &'static str },

    /// 池已销毁后仍显式归还实例；实例已交给策略销毁。
    #[error("pool #{pool} is disposed; recycled instance was destroyed")]
    Disposed { pool: u64 },

    /// 配置项不满足约束。
    #[error("invalid pool configuration: {reason}")]
    InvalidConfig { reason: &'static str },
}

impl PoolError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            PoolError::ForeignInstance { .. } => codes::POOL_FOREIGN_INSTANCE,
            PoolError::InvalidInstance { .. } => codes::POOL_INVALID_INSTANCE,
            PoolError::InvalidConfig { .. } => codes::POOL_INVALID_CONFIG,
            PoolError::Disposed { .. } => codes::POOL_DISPOSED,
        }
    }
}
