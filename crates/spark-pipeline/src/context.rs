use std::{fmt, sync::Arc};

use tracing::trace;

use crate::{Result, pipeline::InterceptorEntry};

/// 单次管道执行的游标与主体。
///
/// # 教案式说明
/// - **意图（Why）**：每次 `execute` 拥有独立的游标与主体，不同调用之间互不干扰；
///   拦截器通过它读写主体、访问调用上下文，并决定何时执行剩余链路。
/// - **逻辑（How）**：
///   - `interceptors` 是管道封存后的扁平化快照，按阶段顺序、阶段内注册顺序排列；
///   - `index` 指向下一个待执行的拦截器；[`proceed`](Self::proceed) 逐个推进，
///     嵌套调用时内层循环会把游标推到末尾，外层循环随之结束，因此每个拦截器在一次执行中至多运行一次；
///   - [`finish`](Self::finish) 直接把游标置于末尾。
/// - **契约（What）**：
///   - 上下文以 `Arc<C>` 共享，拦截器可克隆后交给子任务；
///   - 主体始终存在，替换通过 [`set_subject`](Self::set_subject) 或 [`proceed_with`](Self::proceed_with)。
pub struct PipelineContext<S, C> {
    context: Arc<C>,
    subject: S,
    interceptors: Arc<Vec<InterceptorEntry<S, C>>>,
    index: usize,
}

impl<S, C> PipelineContext<S, C>
where
    S: Send + 'static,
    C: Send + Sync + 'static,
{
    pub(crate) fn new(
        context: Arc<C>,
        subject: S,
        interceptors: Arc<Vec<InterceptorEntry<S, C>>>,
    ) -> Self {
        Self {
            context,
            subject,
            interceptors,
            index: 0,
        }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    /// 共享上下文句柄。
    pub fn context_handle(&self) -> Arc<C> {
        Arc::clone(&self.context)
    }

    pub fn subject(&self) -> &S {
        &self.subject
    }

    pub fn subject_mut(&mut self) -> &mut S {
        &mut self.subject
    }

    /// 替换主体，返回旧值。
    pub fn set_subject(&mut self, subject: S) -> S {
        std::mem::replace(&mut self.subject, subject)
    }

    /// 执行剩余链路；返回时游标已到末尾或链路中途出错。
    ///
    /// 出错返回时游标停在出错拦截器之后。捕获该错误后若不希望继续执行剩余拦截器，应调用
    /// [`finish`](Self::finish)。
    pub async fn proceed(&mut self) -> Result<()> {
        while self.index < self.interceptors.len() {
            let entry = self.interceptors[self.index].clone();
            self.index += 1;
            trace!(
                pipeline.phase = %entry.phase,
                pipeline.interceptor = entry.interceptor.label(),
                pipeline.index = self.index - 1,
                "interceptor invoked"
            );
            entry.interceptor.intercept(self).await?;
        }
        Ok(())
    }

    /// 替换主体后执行剩余链路。
    pub async fn proceed_with(&mut self, subject: S) -> Result<()> {
        self.subject = subject;
        self.proceed().await
    }

    /// 结束本次执行，剩余拦截器不再运行。
    pub fn finish(&mut self) {
        self.index = self.interceptors.len();
    }

    pub fn is_finished(&self) -> bool {
        self.index >= self.interceptors.len()
    }

    pub(crate) fn into_subject(self) -> S {
        self.subject
    }
}

impl<S, C> fmt::Debug for PipelineContext<S, C>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("subject", &self.subject)
            .field("index", &self.index)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}
