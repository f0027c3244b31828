use serde::Deserialize;

use crate::ChannelError;

/// 字节通道配置。
///
/// # 契约说明（What）
/// - `high_watermark`：缓冲字节数达到该值时写方挂起；
/// - `low_watermark`：读方把缓冲消耗到该值及以下时唤醒写方，必须小于高水位；
/// - `chunk_size`：单次写入在通道内切分的最大分片，同时是暂存缓冲的块大小；
/// - 默认值：64 KiB / 32 KiB / 4 KiB。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub high_watermark: usize,
    pub low_watermark: usize,
    pub chunk_size: usize,
}

impl ChannelConfig {
    pub const DEFAULT_HIGH_WATERMARK: usize = 64 * 1024;
    pub const DEFAULT_LOW_WATERMARK: usize = 32 * 1024;
    pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024;

    pub const fn new(high_watermark: usize, low_watermark: usize, chunk_size: usize) -> Self {
        Self {
            high_watermark,
            low_watermark,
            chunk_size,
        }
    }

    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.chunk_size == 0 {
            return Err(ChannelError::InvalidConfig {
                reason: "chunk_size must be greater than zero",
            });
        }
        if self.high_watermark == 0 {
            return Err(ChannelError::InvalidConfig {
                reason: "high_watermark must be greater than zero",
            });
        }
        if self.low_watermark >= self.high_watermark {
            return Err(ChannelError::InvalidConfig {
                reason: "low_watermark must be below high_watermark",
            });
        }
        Ok(())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_HIGH_WATERMARK,
            Self::DEFAULT_LOW_WATERMARK,
            Self::DEFAULT_CHUNK_SIZE,
        )
    }
}
