use std::sync::OnceLock;

use bytes::BytesMut;

use crate::{ObjectPool, PoolConfig, PoolError, PoolPolicy};

/// 默认字节缓冲块大小。
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// 缓冲被外部写大后超过 `chunk_size * MAX_GROWTH` 即不再缓存，避免池长期持有大块内存。
const MAX_GROWTH: usize = 16;

/// 字节缓冲池。
pub type BufferPool = ObjectPool<BytesMut>;

/// `BytesMut` 的池化策略：固定块大小，复位时清空并补足容量。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BytesMutPolicy {
    chunk_size: usize,
}

impl BytesMutPolicy {
    pub fn new(chunk_size: usize) -> Result<Self, PoolError> {
        if chunk_size == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "chunk size must be greater than zero",
            });
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for BytesMutPolicy {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl PoolPolicy<BytesMut> for BytesMutPolicy {
    fn name(&self) -> &'static str {
        "bytes_mut"
    }

    fn produce(&self) -> BytesMut {
        BytesMut::with_capacity(self.chunk_size)
    }

    fn clear(&self, mut instance: BytesMut) -> BytesMut {
        instance.clear();
        if instance.capacity() < self.chunk_size {
            instance.reserve(self.chunk_size);
        }
        instance
    }

    fn validate(&self, instance: &BytesMut) -> bool {
        instance.capacity() <= self.chunk_size.saturating_mul(MAX_GROWTH)
    }
}

/// 构造独立的字节缓冲池。
pub fn buffer_pool(config: PoolConfig, chunk_size: usize) -> Result<BufferPool, PoolError> {
    ObjectPool::new(config, BytesMutPolicy::new(chunk_size)?)
}

/// 进程级默认字节缓冲池，首次访问时惰性构造。
pub fn default_buffer_pool() -> &'static BufferPool {
    static POOL: OnceLock<BufferPool> = OnceLock::new();
    POOL.get_or_init(|| ObjectPool::build(PoolConfig::default(), Box::new(BytesMutPolicy::default())))
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::*;

    #[test]
    fn recycled_buffer_is_cleared_and_refilled() {
        let pool = buffer_pool(PoolConfig::with_capacity(1), 64).expect("构造缓冲池失败");
        let mut buf = pool.borrow();
        buf.put_slice(b"hello");
        let _ = buf.split();
        drop(buf);

        let again = pool.borrow();
        assert!(again.is_empty());
        assert!(again.capacity() >= 64, "复用的缓冲应补足块大小");
    }

    #[test]
    fn oversized_buffer_is_not_cached() {
        let pool = buffer_pool(PoolConfig::with_capacity(1), 8).expect("构造缓冲池失败");
        let mut buf = pool.borrow();
        buf.reserve(8 * MAX_GROWTH * 4);
        assert_eq!(
            pool.recycle(buf).expect_err("超大缓冲应被拒绝").code(),
            crate::error::codes::POOL_INVALID_INSTANCE
        );
        assert_eq!(pool.cached(), 0);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(BytesMutPolicy::new(0).is_err());
    }
}
