use std::{future::Future, time::Duration};

use tracing::warn;

use crate::{ByteChannel, Cause, ChannelError, TimeoutError};

/// 为通道上的挂起操作施加截止时间。
///
/// # 契约说明（What）
/// - `future` 在 `limit` 内完成时原样返回其结果；
/// - 到期时以 [`TimeoutError`] 为原因取消 `channel`，并返回 [`ChannelError::Cancelled`]，
///   该错误的 [`ChannelError::is_timeout`] 为 `true`，与手动取消走同一条传播路径；
/// - 需要在 Tokio 运行时内调用，并启用 `time` 驱动。
pub async fn with_timeout<F, T>(
    channel: &ByteChannel,
    limit: Duration,
    future: F,
) -> Result<T, ChannelError>
where
    F: Future<Output = Result<T, ChannelError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_elapsed) => {
            let cause = Cause::new(TimeoutError::new(limit));
            channel.cancel(cause.clone());
            warn!(timeout.limit_ms = limit.as_millis() as u64, "byte channel deadline expired");
            Err(ChannelError::Cancelled(cause))
        }
    }
}
