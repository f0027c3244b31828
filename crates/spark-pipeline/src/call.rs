// 教案级说明：调用上下文
//
// ## 意图（Why）
// - 一次请求/响应交换的全部可变状态集中在 `Call` 上：请求头、请求体通道、响应头、响应体通道与属性袋；
// - 管道执行时以 `Arc<Call>` 作为上下文，拦截器之间通过它共享状态，子任务也可以克隆句柄。
//
// ## 解析逻辑（How）
// - `received` / `responded` / `cancelled` 三个原子标志分别保证“请求体只消费一次”“响应只发送一次”“取消只执行一次”；
// - 取消与截止到期走同一条路径：以 `CancellationError` 或 `TimeoutError` 为原因取消两条通道，
//   挂在通道上的拦截器随即得到对应错误。
//
// ## 契约（What）
// - 同一 `Call` 同一时刻只有一条逻辑控制流执行其管道；`Call` 本身可以跨线程共享；
// - 响应头通过短暂加锁的访问器读写，锁不会跨越 `.await`。
use std::{
    any::type_name,
    borrow::Cow,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
#[cfg(feature = "tokio-time")]
use std::{future::Future, time::Duration};

use bytes::Bytes;
use parking_lot::Mutex;
use spark_io::{ByteChannel, CancellationError, Cause, TimeoutError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    Attributes, CallConfig, CallPipelines, Content, Headers, Pipeline, PipelineError,
    ReceiveRequest, Result, TypeKey,
};

/// 请求描述。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub uri: String,
    pub headers: Headers,
}

impl Default for RequestHead {
    fn default() -> Self {
        Self {
            method: "GET".to_owned(),
            uri: "/".to_owned(),
            headers: Headers::new(),
        }
    }
}

/// 响应描述。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Headers,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Headers::new(),
        }
    }
}

/// 一次请求/响应交换的调用上下文。
pub struct Call {
    request: RequestHead,
    request_body: ByteChannel,
    response: Mutex<ResponseHead>,
    response_body: ByteChannel,
    attributes: Attributes,
    config: CallConfig,
    pipelines: Option<Arc<CallPipelines>>,
    received: AtomicBool,
    responded: AtomicBool,
    cancelled: AtomicBool,
}

impl Call {
    pub fn builder() -> CallBuilder {
        CallBuilder::default()
    }

    pub fn request(&self) -> &RequestHead {
        &self.request
    }

    pub fn request_body(&self) -> &ByteChannel {
        &self.request_body
    }

    pub fn response_body(&self) -> &ByteChannel {
        &self.response_body
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// 创建本调用的引擎所持有的标准管道。
    pub fn pipelines(&self) -> Option<&Arc<CallPipelines>> {
        self.pipelines.as_ref()
    }

    pub fn status(&self) -> u16 {
        self.response.lock().status
    }

    pub fn set_status(&self, status: u16) {
        self.response.lock().status = status;
    }

    /// 响应头快照。
    pub fn response_head(&self) -> ResponseHead {
        self.response.lock().clone()
    }

    /// 在锁内修改响应头。
    pub fn update_response<R>(&self, update: impl FnOnce(&mut ResponseHead) -> R) -> R {
        update(&mut self.response.lock())
    }

    pub fn is_received(&self) -> bool {
        self.received.load(Ordering::Acquire)
    }

    pub fn is_responded(&self) -> bool {
        self.responded.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// 以 `T` 接收请求体。
    ///
    /// # 契约说明（What）
    /// - 接收管道的初始主体是请求体通道本身，目标类型为 `T`；
    /// - 同一调用第二次接收返回 [`PipelineError::DoubleReceive`]，不会触碰请求体；
    /// - 管道结束后的值不是 `T` 时返回 [`PipelineError::NoTransformation`]。
    pub async fn receive<T>(self: &Arc<Self>, pipeline: &Pipeline<ReceiveRequest, Call>) -> Result<T>
    where
        T: Send + Sync + 'static,
    {
        if self.received.swap(true, Ordering::AcqRel) {
            return Err(PipelineError::DoubleReceive);
        }
        let subject = ReceiveRequest::new(
            TypeKey::of::<T>(),
            Content::new(self.request_body.clone()),
        );
        let received = pipeline.execute(Arc::clone(self), subject).await?;
        received
            .content
            .downcast::<T>()
            .map_err(|content| PipelineError::NoTransformation {
                from: Cow::Borrowed(content.type_name()),
                to: Cow::Borrowed(type_name::<T>()),
            })
    }

    /// 经发送管道渲染后写出响应体并关闭。
    ///
    /// # 契约说明（What）
    /// - 第二次响应返回 [`PipelineError::ResponseAlreadySent`]；
    /// - 渲染结果可以是 `Bytes`、`String`、`Vec<u8>`、`&'static str`、`()` 或 [`ByteChannel`]；
    ///   通道会被完整复制到响应体；其余类型返回 [`PipelineError::NoTransformation`]；
    /// - 渲染或写出失败时响应体以该错误为原因关闭，读取响应体的一方随即得到失败而不是一直等待。
    pub async fn respond(self: &Arc<Self>, pipeline: &Pipeline<Content, Call>, content: Content) -> Result<()> {
        if self.responded.swap(true, Ordering::AcqRel) {
            return Err(PipelineError::ResponseAlreadySent);
        }
        let outcome = self.render_and_write(pipeline, content).await;
        if let Err(error) = &outcome {
            if self.response_body.close_with(response_failure(error)) {
                warn!(
                    call.uri = %self.request.uri,
                    error.code = error.code(),
                    error = %error,
                    "response failed"
                );
            }
        }
        outcome
    }

    async fn render_and_write(
        self: &Arc<Self>,
        pipeline: &Pipeline<Content, Call>,
        content: Content,
    ) -> Result<()> {
        let rendered = pipeline.execute(Arc::clone(self), content).await?;
        debug!(
            call.uri = %self.request.uri,
            call.status = self.status(),
            content.type_name = rendered.type_name(),
            "response rendered"
        );
        self.write_response(rendered).await
    }

    async fn write_response(&self, content: Content) -> Result<()> {
        let bytes = match content.downcast::<Bytes>() {
            Ok(bytes) => bytes,
            Err(content) => match content.downcast::<String>() {
                Ok(text) => Bytes::from(text),
                Err(content) => match content.downcast::<Vec<u8>>() {
                    Ok(raw) => Bytes::from(raw),
                    Err(content) => match content.downcast::<&'static str>() {
                        Ok(text) => Bytes::from_static(text.as_bytes()),
                        Err(content) => match content.downcast::<ByteChannel>() {
                            Ok(source) => {
                                source.copy_and_close(&self.response_body).await?;
                                return Ok(());
                            }
                            Err(content) if content.is::<()>() => Bytes::new(),
                            Err(content) => {
                                return Err(PipelineError::NoTransformation {
                                    from: Cow::Borrowed(content.type_name()),
                                    to: Cow::Borrowed(type_name::<Bytes>()),
                                });
                            }
                        },
                    },
                },
            },
        };
        if !bytes.is_empty() {
            self.response_body.write(bytes).await?;
        }
        self.response_body.close();
        Ok(())
    }

    /// 取消调用：两条通道以 [`CancellationError`] 为原因取消。返回 `false` 表示此前已取消。
    pub fn cancel(&self, reason: impl Into<Cow<'static, str>>) -> bool {
        self.cancel_with(Cause::new(CancellationError::new(reason)))
    }

    fn cancel_with(&self, cause: Cause) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.request_body.cancel(cause.clone());
        self.response_body.cancel(cause.clone());
        warn!(
            call.method = %self.request.method,
            call.uri = %self.request.uri,
            error = %cause,
            "call cancelled"
        );
        true
    }

    /// 为任意挂起操作施加截止时间；到期时以 [`TimeoutError`] 取消调用并返回 [`PipelineError::Timeout`]。
    #[cfg(feature = "tokio-time")]
    pub async fn run_with_deadline<F, T>(&self, limit: Duration, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(limit, future).await {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(
                    call.uri = %self.request.uri,
                    timeout.limit_ms = limit.as_millis() as u64,
                    "call deadline expired"
                );
                self.cancel_with(Cause::new(TimeoutError::new(limit)));
                Err(PipelineError::Timeout(limit))
            }
        }
    }

    /// 按 [`CallConfig::request_timeout`] 施加截止时间；未配置时直接等待。
    #[cfg(feature = "tokio-time")]
    pub async fn run_with_request_timeout<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.config.request_timeout() {
            Some(limit) => self.run_with_deadline(limit, future).await,
            None => future.await,
        }
    }
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("request", &self.request)
            .field("response", &*self.response.lock())
            .field("received", &self.is_received())
            .field("responded", &self.is_responded())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// [`Call`] 构造器。
#[derive(Default)]
pub struct CallBuilder {
    request: RequestHead,
    request_body: Option<ByteChannel>,
    response_body: Option<ByteChannel>,
    config: CallConfig,
    pipelines: Option<Arc<CallPipelines>>,
}

impl CallBuilder {
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.request.method = method.into();
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.request.uri = uri.into();
        self
    }

    pub fn header(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        self.request.headers.append(name, value);
        self
    }

    /// 请求体通道；缺省为已关闭的空通道。
    pub fn body(mut self, body: ByteChannel) -> Self {
        self.request_body = Some(body);
        self
    }

    /// 响应体通道；缺省按默认配置新建。
    pub fn response_body(mut self, body: ByteChannel) -> Self {
        self.response_body = Some(body);
        self
    }

    pub fn config(mut self, config: CallConfig) -> Self {
        self.config = config;
        self
    }

    /// 关联标准管道，拦截器可经 [`Call::pipelines`] 取用接收与发送管道。
    pub fn pipelines(mut self, pipelines: Arc<CallPipelines>) -> Self {
        self.pipelines = Some(pipelines);
        self
    }

    pub fn build(self) -> Arc<Call> {
        Arc::new(Call {
            request: self.request,
            request_body: self.request_body.unwrap_or_else(ByteChannel::empty),
            response: Mutex::new(ResponseHead::default()),
            response_body: self.response_body.unwrap_or_default(),
            attributes: Attributes::new(),
            config: self.config,
            pipelines: self.pipelines,
            received: AtomicBool::new(false),
            responded: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        })
    }
}

/// 响应失败时交给响应体读者的原因。
#[derive(Debug, Error)]
#[error("response failed ({code}): {message}")]
pub struct ResponseFailed {
    code: &'static str,
    message: String,
}

impl ResponseFailed {
    pub fn code(&self) -> &'static str {
        self.code
    }
}

/// 通道错误与取消沿用原有原因，其余错误以 [`ResponseFailed`] 包装。
fn response_failure(error: &PipelineError) -> Cause {
    match error {
        PipelineError::Channel(inner) => inner.clone().into_cause(),
        PipelineError::Cancelled(cause) => cause.clone(),
        PipelineError::Timeout(limit) => Cause::new(TimeoutError::new(*limit)),
        other => Cause::new(ResponseFailed {
            code: other.code(),
            message: other.to_string(),
        }),
    }
}
