//! `spark-pipeline` 是调用执行内核的调度层。
//!
//! # 教案式说明
//! - **意图（Why）**：认证、日志、重试、压缩等插件都以拦截器的形式挂到具名阶段上；
//!   本 crate 负责保证这些拦截器按确定顺序、单次通过地执行，并把请求体/响应体的读写交给 `spark-io`。
//! - **逻辑（How）**：
//!   - [`Pipeline`] 在启动期配置阶段与拦截器，首次执行时封存为扁平快照；
//!   - [`PipelineContext`] 是单次执行的游标，拦截器在其上 `proceed`、`finish` 或替换主体；
//!   - [`Call`] 承载一次交换的请求、响应、通道与属性，作为三条标准管道（[`phases`]）的共享上下文；
//!   - [`TransformTable`] 按显式声明的类型层级分派内容转换；
//!   - [`EngineCatalog`] 在启动期接收显式注入的引擎工厂，替代全局注册。
//! - **契约（What）**：
//!   - 所有配置错误在首次执行之前暴露，错误类型统一为 [`PipelineError`]，可按 [`ErrorKind`] 分类；
//!   - 默认特性 `tokio-time` 提供调用级截止时间；关闭后其余功能与运行时无关。
//!
//! # 依赖方向
//! `spark-pipeline → spark-io → spark-buffer`。

mod attributes;
mod call;
mod config;
mod content;
mod context;
pub mod engine;
pub mod error;
mod headers;
mod hierarchy;
mod interceptor;
pub mod logging;
mod phase;
pub mod phases;
mod pipeline;
mod transform;

pub use attributes::{AttributeKey, Attributes};
pub use call::{Call, CallBuilder, RequestHead, ResponseFailed, ResponseHead};
pub use config::{CallConfig, EngineConfig};
pub use content::{Content, ReceiveRequest, TypeKey};
pub use context::PipelineContext;
pub use engine::{CallEngine, EngineCatalog, EngineFactory, PipelineEngine, PipelineEngineFactory};
pub use error::{ErrorKind, PipelineError, Result};
pub use headers::Headers;
pub use hierarchy::TypeHierarchy;
pub use interceptor::Interceptor;
pub use phase::Phase;
pub use phases::{CallPipelines, CallPhases, ReceivePhases, SendPhases};
pub use pipeline::{InterceptorRegistration, Pipeline, PipelineId};
pub use transform::{TransformInterceptor, TransformTable};

pub use spark_buffer::{BufferPool, PoolConfig};
pub use spark_io::{ByteChannel, ChannelConfig, ChannelError};
