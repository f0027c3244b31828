//! 字节通道错误域。
//!
//! # 角色定位（Why）
//! - 通道失败只在发生点记录一次，之后原样投递给所有当前与未来的读写方，因此错误必须可廉价克隆；
//! - 取消被建模为独立的错误原因，调用方可以区分“主动取消”“截止超时”与“网络失败”。
//!
//! # 设计概要（How）
//! - [`Cause`] 以 `Arc<dyn Error + Send + Sync>` 共享原始错误，调用方通过 [`Cause::downcast_ref`] 取回具体类型；
//! - [`CancellationError`] 与 [`TimeoutError`] 是框架约定的两个取消原因；
//! - 错误码沿用 `<领域>.<语义>` 约定，集中在 [`codes`]。

use std::{borrow::Cow, error::Error, fmt, string::FromUtf8Error, sync::Arc, time::Duration};

use thiserror::Error;

/// 稳定错误码常量。
pub mod codes {
    pub const CHANNEL_CLOSED_FOR_WRITE: &str = "channel.closed_for_write";
    pub const CHANNEL_CANCELLED: &str = "channel.cancelled";
    pub const CHANNEL_TIMEOUT: &str = "channel.timeout";
    pub const CHANNEL_FAILED: &str = "channel.failed";
    pub const CHANNEL_UNEXPECTED_EOF: &str = "channel.unexpected_eof";
    pub const CHANNEL_LINE_TOO_LONG: &str = "channel.line_too_long";
    pub const CHANNEL_INVALID_UTF8: &str = "channel.invalid_utf8";
    pub const CHANNEL_INVALID_CONFIG: &str = "channel.invalid_config";
}

/// 共享的失败原因。
///
/// # 契约说明（What）
/// - 克隆只增加引用计数，所有消费方看到的是同一个错误实例；
/// - `Display`/`source` 透传给内部错误。
#[derive(Clone)]
pub struct Cause(Arc<dyn Error + Send + Sync + 'static>);

impl Cause {
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// 尝试把原因还原为具体错误类型。
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    pub fn is<E: Error + 'static>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }

    pub fn as_error(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.0
    }

    /// 两个原因是否指向同一个错误实例。
    pub fn ptr_eq(&self, other: &Cause) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl Error for Cause {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

/// 主动取消的原因。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cancelled: {reason}")]
pub struct CancellationError {
    reason: Cow<'static, str>,
}

impl CancellationError {
    pub fn new(reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// 截止时间到期的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline of {limit:?} exceeded")]
pub struct TimeoutError {
    limit: Duration,
}

impl TimeoutError {
    pub const fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub const fn limit(&self) -> Duration {
        self.limit
    }
}

/// 字节通道错误。
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ChannelError {
    /// 写端已正常关闭。
    #[error("channel is closed for write")]
    ClosedForWrite,

    /// 通道被取消；原因通常是 [`CancellationError`] 或 [`TimeoutError`]。
    #[error("channel cancelled: {0}")]
    Cancelled(Cause),

    /// 写端以失败原因关闭。
    #[error("channel failed: {0}")]
    Failed(Cause),

    /// 读取固定长度数据时通道提前结束。
    #[error("channel reached end of data with {missing} bytes still expected")]
    UnexpectedEof { missing: usize },

    /// 行长度超过上限。
    #[error("line exceeds the limit of {limit} bytes")]
    LineTooLong { limit: usize },

    /// 行内容不是合法 UTF-8。
    #[error("line is not valid UTF-8")]
    InvalidUtf8(#[from] FromUtf8Error),

    /// 通道配置非法。
    #[error("invalid channel configuration: {reason}")]
    InvalidConfig { reason: &'static str },
}

impl ChannelError {
    /// 以任意错误构造失败。
    pub fn failed<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::Failed(Cause::new(error))
    }

    /// 以取消原因构造取消错误。
    pub fn cancelled(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::Cancelled(Cause::new(CancellationError::new(reason)))
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::ClosedForWrite => codes::CHANNEL_CLOSED_FOR_WRITE,
            Self::Cancelled(_) if self.is_timeout() => codes::CHANNEL_TIMEOUT,
            Self::Cancelled(_) => codes::CHANNEL_CANCELLED,
            Self::Failed(_) => codes::CHANNEL_FAILED,
            Self::UnexpectedEof { .. } => codes::CHANNEL_UNEXPECTED_EOF,
            Self::LineTooLong { .. } => codes::CHANNEL_LINE_TOO_LONG,
            Self::InvalidUtf8(_) => codes::CHANNEL_INVALID_UTF8,
            Self::InvalidConfig { .. } => codes::CHANNEL_INVALID_CONFIG,
        }
    }

    /// 取消或失败时携带的共享原因。
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            Self::Cancelled(cause) | Self::Failed(cause) => Some(cause),
            _ => None,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Cancelled(cause) if cause.is::<TimeoutError>())
    }

    /// 转换为可跨通道传递的原因：取消与失败复用原有原因，其余错误整体包装。
    pub fn into_cause(self) -> Cause {
        match self {
            Self::Cancelled(cause) | Self::Failed(cause) => cause,
            other => Cause::new(other),
        }
    }
}
