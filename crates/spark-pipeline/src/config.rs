use std::time::Duration;

use serde::Deserialize;
use spark_buffer::{BufferPool, PoolConfig, buffer_pool};
use spark_io::{ByteChannel, ChannelConfig};

use crate::{PipelineError, Result};

/// 单次调用的执行参数。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// 整个调用的截止时间（毫秒）；缺省表示不设截止。
    pub request_timeout_ms: Option<u64>,
}

impl CallConfig {
    pub const fn with_request_timeout(limit: Duration) -> Self {
        Self {
            request_timeout_ms: Some(limit.as_millis() as u64),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == Some(0) {
            return Err(PipelineError::Configuration(
                "call.request_timeout_ms must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

/// 引擎装配配置。
///
/// # 教案式说明
/// - **意图（Why）**：引擎、缓冲池、通道与调用参数在进程启动时一次性读入，
///   非法组合在任何调用执行前暴露；
/// - **逻辑（How）**：各段以 `#[serde(default)]` 反序列化，缺省字段取各自默认值；
///   [`from_toml_str`](Self::from_toml_str) 解析后立即调用 [`validate`](Self::validate)；
/// - **契约（What）**：解析或校验失败统一返回 [`PipelineError::Configuration`]，
///   消息中带上出错的配置段。
///
/// ```toml
/// engine = "pipeline"
///
/// [pool]
/// capacity = 64
///
/// [channel]
/// high_watermark = 65536
/// low_watermark = 32768
///
/// [call]
/// request_timeout_ms = 5000
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 选用的引擎名；缺省时取目录中的第一个引擎。
    pub engine: Option<String>,
    pub pool: PoolConfig,
    pub channel: ChannelConfig,
    pub call: CallConfig,
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|err| PipelineError::Configuration(format!("failed to parse engine config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.channel
            .validate()
            .map_err(|err| PipelineError::Configuration(format!("[channel] {err}")))?;
        self.call.validate()
    }

    /// 按 `[pool]` 与 `[channel].chunk_size` 构造字节缓冲池。
    pub fn buffer_pool(&self) -> Result<BufferPool> {
        Ok(buffer_pool(self.pool, self.channel.chunk_size)?)
    }

    /// 以本配置构造字节通道，暂存缓冲来自 `pool`。
    pub fn channel(&self, pool: &BufferPool) -> Result<ByteChannel> {
        ByteChannel::with_pool(self.channel, pool.clone())
            .map_err(|err| PipelineError::Configuration(format!("[channel] {err}")))
    }
}
