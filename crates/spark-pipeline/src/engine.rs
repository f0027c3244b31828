//! 引擎目录：启动期显式注入的引擎工厂列表。
//!
//! # 教案式说明
//! - **意图（Why）**：网络引擎不再在初始化时把自己登记进进程级全局列表，
//!   而是由宿主在启动时把可用工厂显式交给 [`EngineCatalog`]，依赖关系一目了然，测试也能自由替换；
//! - **逻辑（How）**：[`EngineCatalog::create`] 按 [`EngineConfig::engine`] 选择工厂，未指定时取第一个；
//!   本 crate 自带的 [`PipelineEngine`] 把调用交给调用管道执行，并按调用配置施加截止时间；
//! - **契约（What）**：目录构造后只读；找不到引擎返回 [`PipelineError::EngineNotFound`]。

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use spark_buffer::BufferPool;
use tracing::{Instrument, debug, debug_span};

use crate::{Call, CallBuilder, CallPipelines, EngineConfig, PipelineError, Result};

/// 执行调用的引擎。
#[async_trait]
pub trait CallEngine: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// 按引擎配置预置的调用构造器。
    fn call_builder(&self) -> Result<CallBuilder> {
        Ok(Call::builder())
    }

    /// 完整执行一次调用。
    async fn dispatch(&self, call: Arc<Call>) -> Result<()>;
}

/// 引擎工厂。
pub trait EngineFactory: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn create(&self, config: &EngineConfig) -> Result<Arc<dyn CallEngine>>;
}

/// 可用引擎工厂的有序列表。
#[derive(Clone, Default)]
pub struct EngineCatalog {
    factories: Vec<Arc<dyn EngineFactory>>,
}

impl EngineCatalog {
    pub fn new(factories: impl IntoIterator<Item = Arc<dyn EngineFactory>>) -> Self {
        Self {
            factories: factories.into_iter().collect(),
        }
    }

    pub fn with_factory(mut self, factory: impl EngineFactory) -> Self {
        self.factories.push(Arc::new(factory));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|factory| factory.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// 按配置创建引擎。
    pub fn create(&self, config: &EngineConfig) -> Result<Arc<dyn CallEngine>> {
        let factory = match config.engine.as_deref() {
            Some(name) => self.factories.iter().find(|factory| factory.name() == name),
            None => self.factories.first(),
        };
        let Some(factory) = factory else {
            return Err(PipelineError::EngineNotFound {
                name: config
                    .engine
                    .clone()
                    .unwrap_or_else(|| "<default>".to_owned()),
            });
        };
        config.validate()?;
        debug!(engine.name = factory.name(), "engine created");
        factory.create(config)
    }
}

impl fmt::Debug for EngineCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineCatalog")
            .field("factories", &self.names())
            .finish()
    }
}

/// 以调用管道执行调用的进程内引擎。
pub struct PipelineEngine {
    pipelines: Arc<CallPipelines>,
    pool: BufferPool,
    config: EngineConfig,
}

impl PipelineEngine {
    pub const NAME: &'static str = "pipeline";

    pub fn new(pipelines: Arc<CallPipelines>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = config.buffer_pool()?;
        Ok(Self {
            pipelines,
            pool,
            config,
        })
    }

    pub fn pipelines(&self) -> &CallPipelines {
        &self.pipelines
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

#[async_trait]
impl CallEngine for PipelineEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    /// 预置调用参数、响应体通道与标准管道。
    fn call_builder(&self) -> Result<CallBuilder> {
        Ok(Call::builder()
            .config(self.config.call)
            .response_body(self.config.channel(&self.pool)?)
            .pipelines(Arc::clone(&self.pipelines)))
    }

    async fn dispatch(&self, call: Arc<Call>) -> Result<()> {
        let span = debug_span!(
            "engine.dispatch",
            call.method = %call.request().method,
            call.uri = %call.request().uri
        );
        let execution = self.pipelines.call.execute(Arc::clone(&call), ());
        #[cfg(feature = "tokio-time")]
        let outcome = call.run_with_request_timeout(execution).instrument(span).await;
        #[cfg(not(feature = "tokio-time"))]
        let outcome = execution.instrument(span).await;
        if outcome.is_ok() && !call.is_responded() {
            debug!(call.uri = %call.request().uri, "call completed without a response");
        }
        outcome
    }
}

impl fmt::Debug for PipelineEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("config", &self.config)
            .finish()
    }
}

/// [`PipelineEngine`] 的工厂；所有引擎共享同一组管道。
#[derive(Clone, Debug)]
pub struct PipelineEngineFactory {
    pipelines: Arc<CallPipelines>,
}

impl PipelineEngineFactory {
    pub fn new(pipelines: Arc<CallPipelines>) -> Self {
        Self { pipelines }
    }
}

impl EngineFactory for PipelineEngineFactory {
    fn name(&self) -> &str {
        PipelineEngine::NAME
    }

    fn create(&self, config: &EngineConfig) -> Result<Arc<dyn CallEngine>> {
        Ok(Arc::new(PipelineEngine::new(
            Arc::clone(&self.pipelines),
            config.clone(),
        )?))
    }
}
