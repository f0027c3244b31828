use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use bytes::{Bytes, BytesMut};
use futures::lock::Mutex as AsyncMutex;
use parking_lot::Mutex;
use tracing::debug;

use crate::{ByteChannel, ChannelError};

/// 可多次读取的消息体。
///
/// # 教案式说明
/// - **意图（Why）**：重试、日志、认证刷新等拦截器需要多次读取同一个请求/响应体，
///   而底层通道只能被消费一次；该包装在读取的同时把数据留存在内存中。
/// - **逻辑（How）**：
///   1. 第一个读者是“直读者”：每次向源通道取一个分片，追加到留存副本后再交给调用方；
///   2. 之后再打开的读者把整体标记为“不耐烦”，在源通道互斥门内一次性把剩余数据全部读入内存，
///      完成（成功或失败）之前不向该读者交付任何字节；
///   3. 直读者看到“不耐烦”标记后停止直读，改为等待后台读取完成，再从留存副本继续；
///   4. 源通道的失败只记录一次，所有读者在读完已留存的数据后得到同一个错误。
/// - **契约（What）**：
///   - 任一时刻针对源通道最多一个未完成的读取；
///   - 每个读者最终观察到完全相同的字节序列；
///   - 读者彼此独立，各自持有读取位置，可在不同任务中并发使用。
#[derive(Clone)]
pub struct ReplayableBody {
    shared: Arc<ReplayShared>,
}

struct ReplayShared {
    origin: ByteChannel,
    gate: AsyncMutex<()>,
    saved: Mutex<Saved>,
    opened: AtomicUsize,
}

#[derive(Default)]
struct Saved {
    data: BytesMut,
    complete: bool,
    failure: Option<ChannelError>,
    impatient: bool,
}

impl ReplayableBody {
    pub fn new(origin: ByteChannel) -> Self {
        Self {
            shared: Arc::new(ReplayShared {
                origin,
                gate: AsyncMutex::new(()),
                saved: Mutex::new(Saved::default()),
                opened: AtomicUsize::new(0),
            }),
        }
    }

    /// 打开新的读者；第一个读者直读源通道，之后的读者触发整体留存。
    pub fn open(&self) -> ReplayReader {
        let ordinal = self.shared.opened.fetch_add(1, Ordering::AcqRel);
        let direct = ordinal == 0;
        if !direct {
            let mut saved = self.shared.saved.lock();
            if !saved.impatient && !saved.complete {
                saved.impatient = true;
                debug!(
                    replay.readers = ordinal + 1,
                    replay.saved = saved.data.len(),
                    "replayable body switched to impatient copy"
                );
            }
        }
        ReplayReader {
            shared: Arc::clone(&self.shared),
            position: 0,
            direct,
        }
    }

    /// 已留存的字节数。
    pub fn saved_len(&self) -> usize {
        self.shared.saved.lock().data.len()
    }

    /// 源通道是否已被完整读取（成功或失败）。
    pub fn is_complete(&self) -> bool {
        let saved = self.shared.saved.lock();
        saved.complete || saved.failure.is_some()
    }
}

/// [`ReplayableBody`] 的独立读者。
pub struct ReplayReader {
    shared: Arc<ReplayShared>,
    position: usize,
    direct: bool,
}

enum Next {
    Served(usize),
    End,
    Fetch { impatient: bool },
}

impl ReplayReader {
    pub fn is_direct(&self) -> bool {
        self.direct
    }

    /// 读取到 `dst`；`Ok(None)` 表示数据结束。
    pub async fn read_available(&mut self, dst: &mut [u8]) -> Result<Option<usize>, ChannelError> {
        loop {
            match self.serve(dst)? {
                Next::Served(n) => return Ok(Some(n)),
                Next::End => return Ok(None),
                Next::Fetch { impatient } if self.direct && !impatient => self.fetch_one().await,
                Next::Fetch { .. } => self.fetch_all().await,
            }
        }
    }

    /// 读取该读者剩余的全部数据。
    pub async fn read_remaining(&mut self) -> Result<Bytes, ChannelError> {
        let mut out = BytesMut::new();
        let mut buf = [0u8; 4096];
        while let Some(n) = self.read_available(&mut buf).await? {
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out.freeze())
    }

    fn serve(&mut self, dst: &mut [u8]) -> Result<Next, ChannelError> {
        let saved = self.shared.saved.lock();
        let settled = saved.complete || saved.failure.is_some();
        if (self.direct || settled) && self.position < saved.data.len() {
            let n = (saved.data.len() - self.position).min(dst.len());
            dst[..n].copy_from_slice(&saved.data[self.position..self.position + n]);
            self.position += n;
            return Ok(Next::Served(n));
        }
        if let Some(failure) = &saved.failure {
            return Err(failure.clone());
        }
        if saved.complete {
            return Ok(Next::End);
        }
        Ok(Next::Fetch {
            impatient: saved.impatient,
        })
    }

    /// 直读：在互斥门内取一个分片并留存。
    async fn fetch_one(&self) {
        let _gate = self.shared.gate.lock().await;
        if self.has_progress() {
            return;
        }
        let chunk_size = self.shared.origin.config().chunk_size;
        let result = self.shared.origin.read_chunk(chunk_size).await;
        self.record(result);
    }

    /// 不耐烦：在互斥门内把源通道剩余数据全部读入内存。
    async fn fetch_all(&self) {
        let _gate = self.shared.gate.lock().await;
        let chunk_size = self.shared.origin.config().chunk_size;
        loop {
            {
                let saved = self.shared.saved.lock();
                if saved.complete || saved.failure.is_some() {
                    return;
                }
            }
            let result = self.shared.origin.read_chunk(chunk_size).await;
            self.record(result);
        }
    }

    fn has_progress(&self) -> bool {
        let saved = self.shared.saved.lock();
        self.position < saved.data.len() || saved.complete || saved.failure.is_some()
    }

    fn record(&self, result: Result<Option<Bytes>, ChannelError>) {
        let mut saved = self.shared.saved.lock();
        match result {
            Ok(Some(chunk)) => saved.data.extend_from_slice(&chunk),
            Ok(None) => saved.complete = true,
            Err(error) => {
                debug!(error.code = error.code(), "replayable body origin failed");
                saved.failure = Some(error);
            }
        }
    }
}
