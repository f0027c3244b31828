use serde::Deserialize;

use crate::PoolError;

/// 对象池配置。
///
/// # 契约说明（What）
/// - `capacity`：自由链表最多缓存的实例数量；为 0 时池退化为“从不缓存”；
/// - `verify_origin`：归还时是否校验实例来源。关闭后跨池归还会被静默接收，
///   调用方需自行保证实例来源正确；
/// - 默认值：容量 128，开启来源校验。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub capacity: usize,
    pub verify_origin: bool,
}

impl PoolConfig {
    /// 默认缓存容量。
    pub const DEFAULT_CAPACITY: usize = 128;

    /// 以指定容量构造配置，其余字段取默认值。
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            verify_origin: true,
        }
    }

    /// 关闭来源校验。
    pub const fn without_origin_check(mut self) -> Self {
        self.verify_origin = false;
        self
    }

    /// 自由链表按容量预分配，上限防止配置失误导致的巨量预分配。
    pub const MAX_CAPACITY: usize = 1 << 16;

    /// 校验配置。
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.capacity > Self::MAX_CAPACITY {
            return Err(PoolError::InvalidConfig {
                reason: "capacity exceeds PoolConfig::MAX_CAPACITY",
            });
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}
