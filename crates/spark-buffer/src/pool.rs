use std::{
    any::type_name,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};

use spin::Mutex;
use tracing::{debug, trace};

use crate::{PoolConfig, PoolError, pooled::Pooled};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// 池化对象的生命周期策略。
///
/// # 教案式说明
/// - **意图（Why）**：对象池只负责“缓存多少、何时缓存”，对象如何构造、复位、校验与销毁
///   由具体类型决定；该 trait 把这些钩子集中在一处。
/// - **契约（What）**：
///   - `produce`：自由链表为空或池已销毁时调用，必须返回全新实例；
///   - `clear`：实例进入自由链表前调用，需把实例恢复为可再次租借的初始状态；
///   - `validate`：在 `clear` 之后调用，返回 `false` 的实例不会被缓存；
///   - `dispose`：实例离开池的最终出口（容量已满、校验失败、池已销毁）。
/// - 所有钩子都可能在任意线程调用，且调用期间池不持有任何锁。
pub trait PoolPolicy<T>: Send + Sync + 'static {
    /// 策略名称，用于错误与日志。
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }

    /// 构造新实例。
    fn produce(&self) -> T;

    /// 复位实例。
    fn clear(&self, instance: T) -> T {
        instance
    }

    /// 判定实例是否可以复用。
    fn validate(&self, _instance: &T) -> bool {
        true
    }

    /// 销毁实例。
    fn dispose(&self, instance: T) {
        drop(instance);
    }
}

/// 归还结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recycled {
    /// 实例进入自由链表。
    Cached,
    /// 池已满，或租约在池销毁后被丢弃，实例被交给策略销毁。
    Disposed,
}

/// 池统计快照。
///
/// 字段均为读取瞬间的近似值；并发租借与归还期间，各计数之间不保证严格一致。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub cached: usize,
    pub active_leases: usize,
    pub total_borrowed: u64,
    pub total_created: u64,
    pub total_recycled: u64,
    pub total_disposed: u64,
    pub disposed: bool,
}

/// 有界对象池。
///
/// # 教案式说明
/// - **意图（Why）**：为字节缓冲、编解码暂存区等高频短生命周期对象提供复用入口，
///   避免每次调用都触发堆分配；池是唯一跨调用共享的结构，必须无需调用方持锁即可并发使用。
/// - **逻辑（How）**：
///   1. 自由链表为 `spin::Mutex<Vec<T>>`，临界区只做 `push/pop`，策略钩子一律在锁外执行；
///   2. `borrow` 返回 [`Pooled`] 租约，租约记录来源池，`Drop` 时自动归还；
///   3. `dispose` 先置位销毁标记再清空链表，此后的归还一律直接销毁。
/// - **契约（What）**：
///   - `borrow` 永不失败：链表为空或池已销毁时退化为直接构造；
///   - `recycle` 在开启来源校验时拒绝其他池的实例，返回 [`PoolError::ForeignInstance`]；
///   - 同一实例不可能被重复归还：租约按值移动，所有权保证了这一点。
/// - **风险提示（Trade-offs）**：关闭 `verify_origin` 后，跨池归还会被当前池接收，
///   来源池的统计会提前结束该租约；调用方需自行保证这种跨池流动是预期行为。
pub struct ObjectPool<T: Send + 'static> {
    core: Arc<PoolCore<T>>,
}

impl<T: Send + 'static> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("id", &self.core.id)
            .field("policy", &self.core.policy.name())
            .field("stats", &self.stats())
            .finish()
    }
}

impl<T: Send + 'static> ObjectPool<T> {
    /// 按配置与策略构造对象池。
    pub fn new(config: PoolConfig, policy: impl PoolPolicy<T>) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self::build(config, Box::new(policy)))
    }

    /// 构造从不缓存的池：每次租借都新建实例，每次归还都立即销毁。
    pub fn unpooled(policy: impl PoolPolicy<T>) -> Self {
        Self::build(PoolConfig::with_capacity(0), Box::new(policy))
    }

    pub(crate) fn build(config: PoolConfig, policy: Box<dyn PoolPolicy<T>>) -> Self {
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            pool.id = id,
            pool.capacity = config.capacity,
            pool.policy = policy.name(),
            "object pool created"
        );
        Self {
            core: Arc::new(PoolCore {
                id,
                config,
                free_list: Mutex::new(Vec::with_capacity(config.capacity)),
                disposed: AtomicBool::new(false),
                policy,
                metrics: PoolMetrics::default(),
            }),
        }
    }

    /// 池的进程内唯一标识。
    pub fn id(&self) -> u64 {
        self.core.id
    }

    /// 自由链表容量上限。
    pub fn capacity(&self) -> usize {
        self.core.config.capacity
    }

    /// 当前缓存的实例数量。
    pub fn cached(&self) -> usize {
        self.core.free_list.lock().len()
    }

    /// 池是否已销毁。
    pub fn is_disposed(&self) -> bool {
        self.core.disposed.load(Ordering::Acquire)
    }

    /// 租借实例：优先复用缓存，否则新建。
    pub fn borrow(&self) -> Pooled<T> {
        let cached = if self.is_disposed() {
            None
        } else {
            self.core.free_list.lock().pop()
        };
        let value = match cached {
            Some(value) => value,
            None => {
                self.core.metrics.total_created.fetch_add(1, Ordering::Relaxed);
                self.core.policy.produce()
            }
        };
        self.core.metrics.total_borrowed.fetch_add(1, Ordering::Relaxed);
        self.core.metrics.active_leases.fetch_add(1, Ordering::Relaxed);
        Pooled::new(value, Arc::clone(&self.core))
    }

    /// 显式归还租约。
    ///
    /// # 契约说明（What）
    /// - **前置条件**：开启来源校验时，`pooled` 必须来自本池；否则返回
    ///   [`PoolError::ForeignInstance`]，租约随即按 `Drop` 语义回到其真实来源池；
    /// - **后置条件**：返回 `Ok` 时实例已缓存或已销毁；策略校验失败时实例已销毁，
    ///   返回 [`PoolError::InvalidInstance`]；
    /// - 池已销毁时实例照常交给策略销毁，但返回 [`PoolError::Disposed`]。租约直接 `Drop` 时不报错。
    pub fn recycle(&self, pooled: Pooled<T>) -> Result<Recycled, PoolError> {
        let origin = pooled.pool_id();
        if self.core.config.verify_origin && origin != self.core.id {
            return Err(PoolError::ForeignInstance {
                expected: self.core.id,
                actual: origin,
            });
        }
        let (value, origin) = pooled.into_parts();
        origin.metrics.end_lease();
        if self.is_disposed() {
            self.core.discard(value);
            debug!(pool.id = self.core.id, "instance recycled after dispose");
            return Err(PoolError::Disposed { pool: self.core.id });
        }
        self.core.accept(value)
    }

    /// 销毁池：清空并销毁全部缓存实例，之后的租借直接新建；显式归还销毁实例并报错，`Drop` 归还静默销毁。
    ///
    /// 重复调用是安全的，仅首次调用会真正清空链表。
    pub fn dispose(&self) {
        if self.core.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<T> = self.core.free_list.lock().drain(..).collect();
        let count = drained.len();
        for instance in drained {
            self.core.policy.dispose(instance);
        }
        self.core
            .metrics
            .total_disposed
            .fetch_add(count as u64, Ordering::Relaxed);
        debug!(pool.id = self.core.id, pool.drained = count, "object pool disposed");
    }

    /// 读取统计快照。
    pub fn stats(&self) -> PoolStats {
        let metrics = &self.core.metrics;
        PoolStats {
            capacity: self.core.config.capacity,
            cached: self.cached(),
            active_leases: metrics.active_leases.load(Ordering::Relaxed),
            total_borrowed: metrics.total_borrowed.load(Ordering::Relaxed),
            total_created: metrics.total_created.load(Ordering::Relaxed),
            total_recycled: metrics.total_recycled.load(Ordering::Relaxed),
            total_disposed: metrics.total_disposed.load(Ordering::Relaxed),
            disposed: self.is_disposed(),
        }
    }
}

pub(crate) struct PoolCore<T: Send + 'static> {
    id: u64,
    config: PoolConfig,
    free_list: Mutex<Vec<T>>,
    disposed: AtomicBool,
    policy: Box<dyn PoolPolicy<T>>,
    metrics: PoolMetrics,
}

impl<T: Send + 'static> PoolCore<T> {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// 租约在 `Drop` 中归还时的入口；无法向调用方报错，校验失败的实例被静默销毁。
    pub(crate) fn reclaim(&self, value: T) {
        self.metrics.end_lease();
        if let Err(error) = self.accept(value) {
            trace!(pool.id = self.id, error = %error, "pooled instance dropped by policy");
        }
    }

    pub(crate) fn end_lease(&self) {
        self.metrics.end_lease();
    }

    fn accept(&self, value: T) -> Result<Recycled, PoolError> {
        let value = self.policy.clear(value);
        if !self.policy.validate(&value) {
            self.discard(value);
            return Err(PoolError::InvalidInstance {
                policy: self.policy.name(),
            });
        }

        let rejected = {
            let mut list = self.free_list.lock();
            if !self.disposed.load(Ordering::Acquire) && list.len() < self.config.capacity {
                list.push(value);
                None
            } else {
                Some(value)
            }
        };

        match rejected {
            None => {
                self.metrics.total_recycled.fetch_add(1, Ordering::Relaxed);
                Ok(Recycled::Cached)
            }
            Some(value) => {
                self.discard(value);
                Ok(Recycled::Disposed)
            }
        }
    }

    fn discard(&self, value: T) {
        self.policy.dispose(value);
        self.metrics.total_disposed.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct PoolMetrics {
    active_leases: AtomicUsize,
    total_borrowed: AtomicU64,
    total_created: AtomicU64,
    total_recycled: AtomicU64,
    total_disposed: AtomicU64,
}

impl PoolMetrics {
    fn end_lease(&self) {
        let _ = self
            .active_leases
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |prev| {
                Some(prev.saturating_sub(1))
            });
    }
}
