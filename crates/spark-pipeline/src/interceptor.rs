use std::{any::type_name, borrow::Cow};

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::{PipelineContext, Result};

/// 拦截器合约。
///
/// # 教案式说明
/// - **意图（Why）**：插件（认证、日志、压缩、重试）以拦截器的形式挂到某个阶段，
///   既能就地修改主体，也能把“后续链路”当作一次可等待的调用包裹起来（计时、错误翻译、重试）。
/// - **逻辑（How）**：
///   - 拦截器返回即视为“继续”：管道自动调用下一个拦截器；
///   - 在函数体内调用 [`PipelineContext::proceed`] 会立即执行剩余链路，返回后可以做收尾处理，
///     也可以对其错误进行匹配与翻译；
///   - 调用 [`PipelineContext::finish`] 后剩余拦截器不再执行。
/// - **契约（What）**：
///   - 实现必须是 `Send + Sync + 'static`，同一实例会被多个调用并发复用；
///   - 返回的错误原样传播给 `execute` 的调用方，管道不会重试。
#[async_trait]
pub trait Interceptor<S, C>: Send + Sync + 'static {
    /// 用于日志与注册表快照的标签。
    fn label(&self) -> &str {
        type_name::<Self>()
    }

    async fn intercept(&self, ctx: &mut PipelineContext<S, C>) -> Result<()>;
}

/// 以闭包实现的拦截器。
pub(crate) struct FnInterceptor<F> {
    label: Cow<'static, str>,
    body: F,
}

impl<F> FnInterceptor<F> {
    pub(crate) fn new(label: Cow<'static, str>, body: F) -> Self {
        Self { label, body }
    }
}

#[async_trait]
impl<S, C, F> Interceptor<S, C> for FnInterceptor<F>
where
    S: Send + 'static,
    C: Send + Sync + 'static,
    F: for<'a> Fn(&'a mut PipelineContext<S, C>) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync
        + 'static,
{
    fn label(&self) -> &str {
        &self.label
    }

    async fn intercept(&self, ctx: &mut PipelineContext<S, C>) -> Result<()> {
        (self.body)(ctx).await
    }
}
