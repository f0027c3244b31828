//! `spark-buffer` 提供有界对象池与进程级默认字节缓冲池。
//!
//! # 模块定位（Why）
//! - 字节通道、编解码暂存区等组件在每次调用中都会申请同尺寸的临时缓冲，
//!   由池统一复用可以把分配成本摊薄到池的生命周期之上；
//! - 池是调用执行内核中唯一被大量调用并发共享的结构，因此放在依赖树最底层，独立成 crate。
//!
//! # 设计概要（How）
//! - [`ObjectPool`] 持有自由链表与统计计数，具体对象的构造、复位、校验与销毁由 [`PoolPolicy`] 决定；
//! - [`Pooled`] 是租约，`Drop` 时自动归还来源池；
//! - [`BytesMutPolicy`] 与 [`default_buffer_pool`] 为字节通道提供开箱即用的缓冲池。

mod bytes_pool;
mod config;
pub mod error;
mod pool;
mod pooled;

pub use bytes_pool::{
    BufferPool, BytesMutPolicy, DEFAULT_CHUNK_SIZE, buffer_pool, default_buffer_pool,
};
pub use config::PoolConfig;
pub use error::PoolError;
pub use pool::{ObjectPool, PoolPolicy, PoolStats, Recycled};
pub use pooled::Pooled;
