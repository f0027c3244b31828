//! `spark-io` 提供调用执行内核的字节搬运层。
//!
//! # 模块定位（Why）
//! - 网络引擎与消息体消费方之间需要一个带背压、能传播失败与取消的异步缓冲；
//! - 重试、认证等拦截器需要多次读取同一个消息体，由可重放包装统一解决。
//!
//! # 设计概要（How）
//! - [`ByteChannel`]：单读单写通道，高/低水位背压，失败与取消只记录一次并投递给所有读写方；
//! - 读取辅助（`read_fully`、`read_utf8_line`、`copy_to` 等）以 `impl ByteChannel` 扩展在 `read` 模块；
//! - [`ReplayableBody`]：首读者直读并留存，后来者触发整体留存后从内存副本读取；
//! - `with_timeout`（特性 `tokio-time`）：截止时间到期即以超时原因取消通道。
//!
//! # 依赖方向
//! - 暂存缓冲来自 `spark-buffer` 的对象池；本 crate 不依赖管道层。

mod channel;
mod config;
pub mod error;
mod read;
mod replay;
#[cfg(feature = "tokio-time")]
mod timeout;

pub use channel::ByteChannel;
pub use config::ChannelConfig;
pub use error::{Cause, CancellationError, ChannelError, TimeoutError};
pub use replay::{ReplayReader, ReplayableBody};
#[cfg(feature = "tokio-time")]
pub use timeout::with_timeout;
