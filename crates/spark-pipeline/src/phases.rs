//! 调用分发层使用的三条标准管道。
//!
//! # 教案式说明
//! - **意图（Why）**：插件按约定的阶段名挂载，调用分发层只需持有三条管道：
//!   调用管道（每个调用执行一次）、接收管道（把请求体还原成目标类型）、发送管道（把响应值渲染成字节）；
//! - **逻辑（How）**：
//!   - 调用管道：`Setup → Monitoring → Plugins → Call → Fallback`，主体为 `()`，状态全部在 [`Call`] 上；
//!   - 接收管道：`Before → Transform → After`，`Transform` 预置默认读取器，
//!     目标类型为 `Bytes`、`String`、`Vec<u8>` 时从请求体通道读出全部内容；
//!   - 发送管道：`Before → Transform → Render → ContentEncoding → TransferEncoding → After → Engine`，
//!     `Render` 预置 [`TransformInterceptor`]；
//! - **契约（What）**：预置拦截器先于同阶段后注册的拦截器执行；需要完全自定义时用 [`Pipeline::new`] 自建。

use std::{any::type_name, borrow::Cow, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use spark_io::ByteChannel;

use crate::{
    Call, Content, Interceptor, Phase, Pipeline, PipelineContext, PipelineError, ReceiveRequest,
    Result, TransformInterceptor, TransformTable, TypeKey,
};

/// 调用管道：主体为 `()`。
pub type CallPipeline = Pipeline<(), Call>;
/// 接收管道：主体为 [`ReceiveRequest`]。
pub type ReceivePipeline = Pipeline<ReceiveRequest, Call>;
/// 发送管道：主体为 [`Content`]。
pub type SendPipeline = Pipeline<Content, Call>;

/// 调用管道的阶段。
pub struct CallPhases;

impl CallPhases {
    pub const SETUP: Phase = Phase::new("Setup");
    pub const MONITORING: Phase = Phase::new("Monitoring");
    pub const PLUGINS: Phase = Phase::new("Plugins");
    pub const CALL: Phase = Phase::new("Call");
    pub const FALLBACK: Phase = Phase::new("Fallback");

    pub const ALL: [Phase; 5] = [
        Self::SETUP,
        Self::MONITORING,
        Self::PLUGINS,
        Self::CALL,
        Self::FALLBACK,
    ];
}

/// 接收管道的阶段。
pub struct ReceivePhases;

impl ReceivePhases {
    pub const BEFORE: Phase = Phase::new("Before");
    pub const TRANSFORM: Phase = Phase::new("Transform");
    pub const AFTER: Phase = Phase::new("After");

    pub const ALL: [Phase; 3] = [Self::BEFORE, Self::TRANSFORM, Self::AFTER];
}

/// 发送管道的阶段。
pub struct SendPhases;

impl SendPhases {
    pub const BEFORE: Phase = Phase::new("Before");
    pub const TRANSFORM: Phase = Phase::new("Transform");
    pub const RENDER: Phase = Phase::new("Render");
    pub const CONTENT_ENCODING: Phase = Phase::new("ContentEncoding");
    pub const TRANSFER_ENCODING: Phase = Phase::new("TransferEncoding");
    pub const AFTER: Phase = Phase::new("After");
    pub const ENGINE: Phase = Phase::new("Engine");

    pub const ALL: [Phase; 7] = [
        Self::BEFORE,
        Self::TRANSFORM,
        Self::RENDER,
        Self::CONTENT_ENCODING,
        Self::TRANSFER_ENCODING,
        Self::AFTER,
        Self::ENGINE,
    ];
}

pub fn call_pipeline() -> Result<CallPipeline> {
    Pipeline::new(CallPhases::ALL)
}

/// 带默认请求体读取器的接收管道。
pub fn receive_pipeline() -> Result<ReceivePipeline> {
    let mut pipeline = Pipeline::new(ReceivePhases::ALL)?;
    pipeline.intercept(&ReceivePhases::TRANSFORM, ReceiveBody)?;
    Ok(pipeline)
}

/// 在 `Render` 阶段挂载转换表的发送管道。
pub fn send_pipeline(table: Arc<TransformTable>) -> Result<SendPipeline> {
    let mut pipeline = Pipeline::new(SendPhases::ALL)?;
    pipeline.intercept(&SendPhases::RENDER, TransformInterceptor::new(table))?;
    Ok(pipeline)
}

/// 一个应用（或客户端）持有的三条管道。
#[derive(Debug)]
pub struct CallPipelines {
    pub call: CallPipeline,
    pub receive: ReceivePipeline,
    pub send: SendPipeline,
}

impl CallPipelines {
    pub fn new(table: Arc<TransformTable>) -> Result<Self> {
        Ok(Self {
            call: call_pipeline()?,
            receive: receive_pipeline()?,
            send: send_pipeline(table)?,
        })
    }

    /// 发送管道使用 [`TransformTable::with_defaults`]。
    pub fn with_defaults() -> Result<Self> {
        Self::new(Arc::new(TransformTable::with_defaults()))
    }
}

/// 把请求体通道读成 `Bytes`、`String` 或 `Vec<u8>`。
struct ReceiveBody;

#[async_trait]
impl Interceptor<ReceiveRequest, Call> for ReceiveBody {
    fn label(&self) -> &str {
        "receive-body"
    }

    async fn intercept(&self, ctx: &mut PipelineContext<ReceiveRequest, Call>) -> Result<()> {
        let request = ctx.subject();
        if request.is_satisfied() {
            return Ok(());
        }
        let target = request.target;
        let Some(channel) = request.content.downcast_ref::<ByteChannel>().cloned() else {
            return Ok(());
        };

        let content = if target == TypeKey::of::<Bytes>() {
            Content::new(channel.read_remaining(usize::MAX).await?)
        } else if target == TypeKey::of::<Vec<u8>>() {
            Content::new(channel.read_remaining(usize::MAX).await?.to_vec())
        } else if target == TypeKey::of::<String>() {
            let raw = channel.read_remaining(usize::MAX).await?.to_vec();
            let text = String::from_utf8(raw).map_err(|err| PipelineError::InvalidContent {
                to: Cow::Borrowed(type_name::<String>()),
                source: Box::new(err),
            })?;
            Content::new(text)
        } else {
            return Ok(());
        };
        ctx.set_subject(ReceiveRequest::new(target, content));
        Ok(())
    }
}
