use std::sync::Mutex;

use async_trait::async_trait;
use spark_pipeline::{Interceptor, PipelineContext, Result};
use thiserror::Error;

/// 测试上下文：按执行顺序记录拦截器名称。
#[derive(Debug, Default)]
pub struct Trace {
    entries: Mutex<Vec<String>>,
}

impl Trace {
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().expect("轨迹锁中毒").push(entry.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().expect("轨迹锁中毒").clone()
    }
}

/// 记录自身名称，并在记录前主动让出执行权若干次。
pub struct Record {
    pub name: &'static str,
    pub yields: usize,
}

impl Record {
    pub fn new(name: &'static str) -> Self {
        Self { name, yields: 0 }
    }

    pub fn yielding(name: &'static str, yields: usize) -> Self {
        Self { name, yields }
    }
}

#[async_trait]
impl<S: Send + 'static> Interceptor<S, Trace> for Record {
    fn label(&self) -> &str {
        self.name
    }

    async fn intercept(&self, ctx: &mut PipelineContext<S, Trace>) -> Result<()> {
        for _ in 0..self.yields {
            tokio::task::yield_now().await;
        }
        ctx.context().push(self.name);
        Ok(())
    }
}

/// 拦截器业务错误。
#[derive(Debug, Error)]
#[error("interceptor `{0}` failed")]
pub struct Boom(pub &'static str);
