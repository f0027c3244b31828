use std::{
    collections::VecDeque,
    fmt,
    future::poll_fn,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use spark_buffer::{BufferPool, default_buffer_pool};
use tracing::{debug, trace};

use crate::{Cause, ChannelConfig, ChannelError};

/// 单读单写的异步字节通道。
///
/// # 教案式说明
/// - **意图（Why）**：网络引擎在一端写入、消息体消费方在另一端读取，两端速率不同，
///   需要一个带背压、可传播失败与取消的缓冲管道把二者解耦。
/// - **逻辑（How）**：
///   1. 写入的数据按 `chunk_size` 零拷贝切分为 `Bytes` 分片，排入 `VecDeque`；
///   2. 缓冲量达到高水位时写方登记 `Waker` 并挂起，此后直到读方消耗到低水位及以下才恢复写入；
///   3. 读方在无数据且未关闭时登记 `Waker` 挂起，写入、关闭、取消都会唤醒它；
///   4. 失败与取消只记录一次，之后每次读写都克隆同一个 [`ChannelError`] 返回。
/// - **契约（What）**：
///   - 正常关闭前写入的字节总数等于最终可读出的字节总数，且保持写入顺序；
///   - `close_with` 与 `cancel` 丢弃尚未读出的数据，读方随后得到对应错误而不是数据结束；
///   - 同一时刻最多一个逻辑读方与一个逻辑写方；多个读方或多个写方需要调用方自行串行化。
/// - **风险提示（Trade-offs）**：状态由 `parking_lot::Mutex` 保护，临界区只做指针搬运与计数，
///   唤醒一律在释放锁之后进行。
#[derive(Clone)]
pub struct ByteChannel {
    shared: Arc<Shared>,
}

struct Shared {
    config: ChannelConfig,
    pool: BufferPool,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    chunks: VecDeque<Bytes>,
    buffered: usize,
    closed: bool,
    backpressured: bool,
    terminal: Option<ChannelError>,
    total_read: u64,
    total_written: u64,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

impl State {
    fn register(slot: &mut Option<Waker>, waker: &Waker) {
        match slot {
            Some(existing) if existing.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }

    fn push(&mut self, chunk: Bytes) -> Option<Waker> {
        self.buffered += chunk.len();
        self.total_written += chunk.len() as u64;
        self.chunks.push_back(chunk);
        self.read_waker.take()
    }

    fn copy_into(&mut self, dst: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < dst.len() {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            let n = front.len().min(dst.len() - copied);
            dst[copied..copied + n].copy_from_slice(&front[..n]);
            front.advance(n);
            if front.is_empty() {
                self.chunks.pop_front();
            }
            copied += n;
        }
        copied
    }

    fn take_chunk(&mut self, max: usize) -> Option<Bytes> {
        let front = self.chunks.front_mut()?;
        if front.len() <= max {
            self.chunks.pop_front()
        } else {
            Some(front.split_to(max))
        }
    }

    /// 记录读方消耗的字节；降到低水位及以下时交出写方 `Waker`。
    fn consumed(&mut self, n: usize, low_watermark: usize) -> Option<Waker> {
        self.buffered -= n;
        self.total_read += n as u64;
        if self.buffered <= low_watermark {
            self.backpressured = false;
            self.write_waker.take()
        } else {
            None
        }
    }

    fn discard(&mut self) -> usize {
        let dropped = self.buffered;
        self.chunks.clear();
        self.buffered = 0;
        self.backpressured = false;
        dropped
    }

    fn take_wakers(&mut self) -> [Option<Waker>; 2] {
        [self.read_waker.take(), self.write_waker.take()]
    }
}

fn wake(wakers: impl IntoIterator<Item = Option<Waker>>) {
    for waker in wakers.into_iter().flatten() {
        waker.wake();
    }
}

impl ByteChannel {
    /// 以默认配置与进程级缓冲池构造通道。
    pub fn new() -> Self {
        Self::build(ChannelConfig::default(), default_buffer_pool().clone())
    }

    pub fn with_config(config: ChannelConfig) -> Result<Self, ChannelError> {
        Self::with_pool(config, default_buffer_pool().clone())
    }

    /// 指定暂存缓冲所用的对象池。
    pub fn with_pool(config: ChannelConfig, pool: BufferPool) -> Result<Self, ChannelError> {
        config.validate()?;
        Ok(Self::build(config, pool))
    }

    /// 构造已关闭且内容完整可读的通道。
    pub fn from_bytes(content: impl Into<Bytes>) -> Self {
        let channel = Self::new();
        {
            let mut state = channel.shared.state.lock();
            let content = content.into();
            if !content.is_empty() {
                let _ = state.push(content);
            }
            state.closed = true;
        }
        channel
    }

    /// 构造已关闭的空通道。
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    fn build(config: ChannelConfig, pool: BufferPool) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                pool,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// 写入一段数据；缓冲达到高水位时挂起，直至读方消耗到低水位。
    ///
    /// # 契约说明（What）
    /// - 写端已关闭返回 [`ChannelError::ClosedForWrite`]；已取消或以失败关闭时返回记录的错误；
    /// - 数据按 `chunk_size` 切分，挂起期间通道被取消时，已排入的分片随缓冲一起丢弃。
    pub async fn write(&self, mut data: Bytes) -> Result<(), ChannelError> {
        self.ensure_writable()?;
        while !data.is_empty() {
            let take = data.len().min(self.shared.config.chunk_size);
            let mut chunk = Some(data.split_to(take));
            poll_fn(|cx| self.poll_write_chunk(cx, &mut chunk)).await?;
        }
        Ok(())
    }

    /// 拷贝写入借用的切片，经由池化暂存缓冲组装分片。
    pub async fn write_fully(&self, src: &[u8]) -> Result<(), ChannelError> {
        self.ensure_writable()?;
        let mut staging = self.shared.pool.borrow();
        for part in src.chunks(self.shared.config.chunk_size) {
            staging.extend_from_slice(part);
            let chunk = staging.split().freeze();
            self.write(chunk).await?;
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), ChannelError> {
        let state = self.shared.state.lock();
        if let Some(error) = &state.terminal {
            return Err(error.clone());
        }
        if state.closed {
            return Err(ChannelError::ClosedForWrite);
        }
        Ok(())
    }

    fn poll_write_chunk(
        &self,
        cx: &mut Context<'_>,
        chunk: &mut Option<Bytes>,
    ) -> Poll<Result<(), ChannelError>> {
        let mut state = self.shared.state.lock();
        if let Some(error) = &state.terminal {
            return Poll::Ready(Err(error.clone()));
        }
        if state.closed {
            return Poll::Ready(Err(ChannelError::ClosedForWrite));
        }
        if state.backpressured || state.buffered >= self.shared.config.high_watermark {
            state.backpressured = true;
            State::register(&mut state.write_waker, cx.waker());
            return Poll::Pending;
        }
        let reader = chunk.take().and_then(|bytes| state.push(bytes));
        drop(state);
        wake([reader]);
        Poll::Ready(Ok(()))
    }

    /// 读取当前可用的数据到 `dst`。
    ///
    /// 返回 `Ok(None)` 表示数据已全部读出且写端已正常关闭；无数据且未关闭时挂起。
    pub async fn read_available(&self, dst: &mut [u8]) -> Result<Option<usize>, ChannelError> {
        poll_fn(|cx| self.poll_read(cx, dst)).await
    }

    fn poll_read(
        &self,
        cx: &mut Context<'_>,
        dst: &mut [u8],
    ) -> Poll<Result<Option<usize>, ChannelError>> {
        let mut state = self.shared.state.lock();
        if let Some(error) = &state.terminal {
            return Poll::Ready(Err(error.clone()));
        }
        if state.buffered > 0 {
            let copied = state.copy_into(dst);
            let writer = state.consumed(copied, self.shared.config.low_watermark);
            drop(state);
            wake([writer]);
            return Poll::Ready(Ok(Some(copied)));
        }
        if state.closed {
            return Poll::Ready(Ok(None));
        }
        State::register(&mut state.read_waker, cx.waker());
        Poll::Pending
    }

    /// 零拷贝取出不超过 `max` 字节的下一个分片；`Ok(None)` 表示数据结束。
    pub async fn read_chunk(&self, max: usize) -> Result<Option<Bytes>, ChannelError> {
        poll_fn(|cx| {
            let mut state = self.shared.state.lock();
            if let Some(error) = &state.terminal {
                return Poll::Ready(Err(error.clone()));
            }
            if max == 0 {
                return Poll::Ready(Ok(Some(Bytes::new())));
            }
            if let Some(chunk) = state.take_chunk(max) {
                let writer = state.consumed(chunk.len(), self.shared.config.low_watermark);
                drop(state);
                wake([writer]);
                return Poll::Ready(Ok(Some(chunk)));
            }
            if state.closed {
                return Poll::Ready(Ok(None));
            }
            State::register(&mut state.read_waker, cx.waker());
            Poll::Pending
        })
        .await
    }

    /// 把数据读入 `line` 直到遇到 `delimiter`（含）。
    ///
    /// 返回 `true` 表示找到分隔符，`false` 表示通道结束；累计长度（不含分隔符）超过 `limit`
    /// 时返回 [`ChannelError::LineTooLong`]，已读出的部分不会退回通道。
    pub(crate) fn poll_read_until(
        &self,
        cx: &mut Context<'_>,
        delimiter: u8,
        line: &mut BytesMut,
        limit: usize,
    ) -> Poll<Result<bool, ChannelError>> {
        let mut state = self.shared.state.lock();
        if let Some(error) = &state.terminal {
            return Poll::Ready(Err(error.clone()));
        }

        let mut consumed = 0;
        let mut outcome = None;
        while let Some(front) = state.chunks.front_mut() {
            let (take, found) = match front.iter().position(|byte| *byte == delimiter) {
                Some(pos) => (pos + 1, true),
                None => (front.len(), false),
            };
            let content = line.len() + if found { take - 1 } else { take };
            if content > limit {
                outcome = Some(Err(ChannelError::LineTooLong { limit }));
                break;
            }
            line.extend_from_slice(&front[..take]);
            front.advance(take);
            consumed += take;
            if front.is_empty() {
                state.chunks.pop_front();
            }
            if found {
                outcome = Some(Ok(true));
                break;
            }
        }

        let writer = if consumed > 0 {
            state.consumed(consumed, self.shared.config.low_watermark)
        } else {
            None
        };
        let poll = match outcome {
            Some(result) => Poll::Ready(result),
            None if state.closed => Poll::Ready(Ok(false)),
            None => {
                State::register(&mut state.read_waker, cx.waker());
                Poll::Pending
            }
        };
        drop(state);
        wake([writer]);
        poll
    }

    /// 等待至少一个字节可读或通道进入关闭状态。
    ///
    /// 返回 `true` 表示有数据可读，`false` 表示数据已结束；失败或取消时返回记录的错误。
    pub async fn await_content(&self) -> Result<bool, ChannelError> {
        poll_fn(|cx| {
            let mut state = self.shared.state.lock();
            if let Some(error) = &state.terminal {
                return Poll::Ready(Err(error.clone()));
            }
            if state.buffered > 0 {
                return Poll::Ready(Ok(true));
            }
            if state.closed {
                return Poll::Ready(Ok(false));
            }
            State::register(&mut state.read_waker, cx.waker());
            Poll::Pending
        })
        .await
    }

    /// 正常关闭写端；已缓冲的数据仍可读出。返回 `false` 表示通道此前已关闭。
    pub fn close(&self) -> bool {
        let (wakers, written) = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            (state.take_wakers(), state.total_written)
        };
        wake(wakers);
        trace!(channel.bytes_written = written, "byte channel closed");
        true
    }

    /// 以失败原因关闭：丢弃未读数据，之后的读写都得到 [`ChannelError::Failed`]。
    pub fn close_with(&self, cause: Cause) -> bool {
        self.terminate(ChannelError::Failed(cause), false)
    }

    /// 取消通道：丢弃未读数据，两个方向立即关闭，挂起与后续的读写都得到 [`ChannelError::Cancelled`]。
    ///
    /// 正常关闭后仍可取消，尚未读出的数据随之丢弃。
    pub fn cancel(&self, cause: Cause) -> bool {
        self.terminate(ChannelError::Cancelled(cause), true)
    }

    fn terminate(&self, error: ChannelError, after_close: bool) -> bool {
        let (wakers, dropped) = {
            let mut state = self.shared.state.lock();
            if state.terminal.is_some() || (state.closed && !after_close) {
                return false;
            }
            let dropped = state.discard();
            state.closed = true;
            state.terminal = Some(error.clone());
            (state.take_wakers(), dropped)
        };
        wake(wakers);
        debug!(
            channel.discarded = dropped,
            error.code = error.code(),
            error = %error,
            "byte channel terminated"
        );
        true
    }

    /// 当前缓冲中可立即读出的字节数。
    pub fn available_for_read(&self) -> usize {
        self.shared.state.lock().buffered
    }

    pub fn is_closed_for_write(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// 数据已读完且写端关闭，或通道已失败/取消。
    pub fn is_closed_for_read(&self) -> bool {
        let state = self.shared.state.lock();
        state.terminal.is_some() || (state.closed && state.buffered == 0)
    }

    /// 记录的失败或取消错误。
    pub fn closed_cause(&self) -> Option<ChannelError> {
        self.shared.state.lock().terminal.clone()
    }

    pub fn total_bytes_read(&self) -> u64 {
        self.shared.state.lock().total_read
    }

    pub fn total_bytes_written(&self) -> u64 {
        self.shared.state.lock().total_written
    }
}

impl Default for ByteChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ByteChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ByteChannel")
            .field("buffered", &state.buffered)
            .field("closed", &state.closed)
            .field("terminal", &state.terminal)
            .field("total_read", &state.total_read)
            .field("total_written", &state.total_written)
            .finish()
    }
}
