//! 管道层错误域。
//!
//! # 角色定位（Why）
//! - 汇总配置期、转换期、I/O、取消、超时与池误用六类失败，调用方按 [`ErrorKind`] 决策而不必逐个匹配变体；
//! - 通道层的取消与超时在这里被提升为独立变体，保证“用户取消”“截止到期”“网络失败”三者可区分。
//!
//! # 契约（What）
//! - 错误码沿用 `<领域>.<语义>` 约定，集中在 [`codes`]；
//! - 管道不替拦截器捕获错误：拦截器返回的错误原样向 `execute` 的调用方传播。

use std::{borrow::Cow, error::Error, time::Duration};

use spark_buffer::PoolError;
use spark_io::{Cause, ChannelError, TimeoutError};
use thiserror::Error;

/// 管道层统一结果类型。
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// 稳定错误码常量。
pub mod codes {
    pub const PIPELINE_INVALID_PHASE: &str = "pipeline.invalid_phase";
    pub const PIPELINE_DUPLICATE_PHASE: &str = "pipeline.duplicate_phase";
    pub const PIPELINE_SEALED: &str = "pipeline.sealed";
    pub const PIPELINE_DOUBLE_RECEIVE: &str = "pipeline.double_receive";
    pub const PIPELINE_NO_TRANSFORMATION: &str = "pipeline.no_transformation";
    pub const PIPELINE_INVALID_CONTENT: &str = "pipeline.invalid_content";
    pub const PIPELINE_RESPONSE_ALREADY_SENT: &str = "pipeline.response_already_sent";
    pub const PIPELINE_CANCELLED: &str = "pipeline.cancelled";
    pub const PIPELINE_TIMEOUT: &str = "pipeline.timeout";
    pub const PIPELINE_INTERCEPTOR: &str = "pipeline.interceptor";
    pub const PIPELINE_CONFIGURATION: &str = "pipeline.configuration";
    pub const PIPELINE_ENGINE_NOT_FOUND: &str = "pipeline.engine_not_found";
}

/// 错误分类。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 启动期配置错误，应在任何调用执行前暴露。
    Configuration,
    /// 找不到可用转换或消息体被重复消费。
    Transformation,
    /// 通道读写失败。
    Io,
    /// 调用被主动取消。
    Cancellation,
    /// 截止时间到期。
    Timeout,
    /// 拦截器自身返回的业务错误。
    Interceptor,
    /// 对象池误用。
    Pool,
}

/// 管道层错误。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// 阶段或锚点阶段不存在。
    #[error("phase `{phase}` is not registered in this pipeline")]
    InvalidPhase { phase: Cow<'static, str> },

    /// 阶段名重复。
    #[error("phase `{phase}` is already registered in this pipeline")]
    DuplicatePhase { phase: Cow<'static, str> },

    /// 首次执行后不再接受配置变更。
    #[error("pipeline is sealed after its first execution; `{operation}` is no longer allowed")]
    Sealed { operation: &'static str },

    /// 同一调用的请求体被接收了两次。
    #[error("request body has already been received for this call")]
    DoubleReceive,

    /// 执行结束后的值无法转换为目标类型。
    #[error("no transformation found from `{from}` to `{to}`")]
    NoTransformation {
        from: Cow<'static, str>,
        to: Cow<'static, str>,
    },

    /// 消息体内容无法解释为目标类型，例如请求体不是合法 UTF-8。
    #[error("content cannot be converted to `{to}`: {source}")]
    InvalidContent {
        to: Cow<'static, str>,
        #[source]
        source: Box<dyn Error + Send + Sync + 'static>,
    },

    /// 同一调用重复响应。
    #[error("response has already been sent for this call")]
    ResponseAlreadySent,

    /// 调用或通道被主动取消。
    #[error("call cancelled: {0}")]
    Cancelled(Cause),

    /// 截止时间到期。
    #[error("call exceeded its deadline of {0:?}")]
    Timeout(Duration),

    /// 通道读写失败。
    #[error(transparent)]
    Channel(ChannelError),

    /// 拦截器返回的错误。
    #[error("interceptor failed: {0}")]
    Interceptor(#[source] Box<dyn Error + Send + Sync + 'static>),

    /// 配置非法。
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// 引擎目录中没有匹配的引擎。
    #[error("no engine named `{name}` is available")]
    EngineNotFound { name: String },

    /// 对象池误用；池配置错误归入 [`PipelineError::Configuration`]。
    #[error(transparent)]
    Pool(PoolError),
}

impl PipelineError {
    /// 包装拦截器的业务错误。
    pub fn interceptor<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::Interceptor(Box::new(error))
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPhase { .. } => codes::PIPELINE_INVALID_PHASE,
            Self::DuplicatePhase { .. } => codes::PIPELINE_DUPLICATE_PHASE,
            Self::Sealed { .. } => codes::PIPELINE_SEALED,
            Self::DoubleReceive => codes::PIPELINE_DOUBLE_RECEIVE,
            Self::NoTransformation { .. } => codes::PIPELINE_NO_TRANSFORMATION,
            Self::InvalidContent { .. } => codes::PIPELINE_INVALID_CONTENT,
            Self::ResponseAlreadySent => codes::PIPELINE_RESPONSE_ALREADY_SENT,
            Self::Cancelled(_) => codes::PIPELINE_CANCELLED,
            Self::Timeout(_) => codes::PIPELINE_TIMEOUT,
            Self::Channel(inner) => inner.code(),
            Self::Interceptor(_) => codes::PIPELINE_INTERCEPTOR,
            Self::Configuration(_) => codes::PIPELINE_CONFIGURATION,
            Self::EngineNotFound { .. } => codes::PIPELINE_ENGINE_NOT_FOUND,
            Self::Pool(inner) => inner.code(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPhase { .. }
            | Self::DuplicatePhase { .. }
            | Self::Sealed { .. }
            | Self::Configuration(_)
            | Self::EngineNotFound { .. } => ErrorKind::Configuration,
            Self::DoubleReceive
            | Self::NoTransformation { .. }
            | Self::InvalidContent { .. }
            | Self::ResponseAlreadySent => ErrorKind::Transformation,
            Self::Cancelled(_) => ErrorKind::Cancellation,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Channel(_) => ErrorKind::Io,
            Self::Interceptor(_) => ErrorKind::Interceptor,
            Self::Pool(_) => ErrorKind::Pool,
        }
    }
}

impl From<ChannelError> for PipelineError {
    /// 取消与超时提升为独立变体，其余通道错误归入 I/O。
    fn from(error: ChannelError) -> Self {
        match error {
            ChannelError::Cancelled(cause) => match cause.downcast_ref::<TimeoutError>() {
                Some(timeout) => Self::Timeout(timeout.limit()),
                None => Self::Cancelled(cause),
            },
            other => Self::Channel(other),
        }
    }
}

impl From<PoolError> for PipelineError {
    /// 池配置错误属于启动期配置问题，其余归入池误用。
    fn from(error: PoolError) -> Self {
        match error {
            PoolError::InvalidConfig { .. } => Self::Configuration(format!("[pool] {error}")),
            other => Self::Pool(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use spark_buffer::{ObjectPool, PoolConfig, PoolPolicy};
    use spark_io::CancellationError;

    use super::*;

    #[test]
    fn channel_cancellation_is_distinguished_from_io_failure() {
        let cancelled: PipelineError = ChannelError::cancelled("user").into();
        assert_eq!(cancelled.kind(), ErrorKind::Cancellation);
        assert!(matches!(
            &cancelled,
            PipelineError::Cancelled(cause) if cause.is::<CancellationError>()
        ));

        let timeout: PipelineError =
            ChannelError::Cancelled(Cause::new(TimeoutError::new(Duration::from_secs(2)))).into();
        assert!(matches!(timeout, PipelineError::Timeout(limit) if limit == Duration::from_secs(2)));

        let failed: PipelineError =
            ChannelError::failed(io::Error::from(io::ErrorKind::BrokenPipe)).into();
        assert_eq!(failed.kind(), ErrorKind::Io);
        assert_eq!(failed.code(), spark_io::error::codes::CHANNEL_FAILED);
    }

    struct Plain;

    impl PoolPolicy<Vec<u8>> for Plain {
        fn produce(&self) -> Vec<u8> {
            Vec::new()
        }
    }

    fn recycle_into(pool: &ObjectPool<Vec<u8>>) -> Result<()> {
        let lease = pool.borrow();
        pool.dispose();
        pool.recycle(lease)?;
        Ok(())
    }

    #[test]
    fn pool_misuse_and_pool_config_are_classified_apart() {
        let pool = ObjectPool::new(PoolConfig::with_capacity(1), Plain).expect("构造池失败");
        let misuse = recycle_into(&pool).expect_err("销毁后归还应报错");
        assert_eq!(misuse.kind(), ErrorKind::Pool);
        assert_eq!(misuse.code(), spark_buffer::error::codes::POOL_DISPOSED);

        let config: PipelineError = PoolError::InvalidConfig { reason: "capacity" }.into();
        assert_eq!(config.kind(), ErrorKind::Configuration);
    }
}
