//! 建立在 [`ByteChannel`] 基本读写之上的辅助操作。

use std::future::poll_fn;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::{ByteChannel, ChannelError};

impl ByteChannel {
    /// 读满 `dst`；通道提前结束时返回 [`ChannelError::UnexpectedEof`]。
    pub async fn read_fully(&self, dst: &mut [u8]) -> Result<(), ChannelError> {
        let mut filled = 0;
        while filled < dst.len() {
            match self.read_available(&mut dst[filled..]).await? {
                Some(n) => filled += n,
                None => {
                    return Err(ChannelError::UnexpectedEof {
                        missing: dst.len() - filled,
                    });
                }
            }
        }
        Ok(())
    }

    pub async fn read_u8(&self) -> Result<u8, ChannelError> {
        let mut buf = [0u8; 1];
        self.read_fully(&mut buf).await?;
        Ok(buf[0])
    }

    /// 大端序。
    pub async fn read_u16(&self) -> Result<u16, ChannelError> {
        let mut buf = [0u8; 2];
        self.read_fully(&mut buf).await?;
        Ok(u16::from_be_bytes(buf))
    }

    /// 大端序。
    pub async fn read_u32(&self) -> Result<u32, ChannelError> {
        let mut buf = [0u8; 4];
        self.read_fully(&mut buf).await?;
        Ok(u32::from_be_bytes(buf))
    }

    /// 大端序。
    pub async fn read_u64(&self) -> Result<u64, ChannelError> {
        let mut buf = [0u8; 8];
        self.read_fully(&mut buf).await?;
        Ok(u64::from_be_bytes(buf))
    }

    /// 读取剩余数据，最多 `limit` 字节；达到上限时剩余部分留在通道中。
    pub async fn read_remaining(&self, limit: usize) -> Result<Bytes, ChannelError> {
        let mut collected = BytesMut::new();
        while collected.len() < limit {
            match self.read_chunk(limit - collected.len()).await? {
                Some(chunk) if collected.is_empty() && chunk.len() == limit => return Ok(chunk),
                Some(chunk) => collected.extend_from_slice(&chunk),
                None => break,
            }
        }
        Ok(collected.freeze())
    }

    /// 读取一行 UTF-8 文本，去掉结尾的 `\n` 或 `\r\n`。
    ///
    /// # 契约说明（What）
    /// - 返回 `Ok(None)`：通道结束且没有任何未读字节；
    /// - 最后一行没有换行符时按完整行返回；
    /// - 行内容超过 `limit` 字节返回 [`ChannelError::LineTooLong`]，非法 UTF-8 返回 [`ChannelError::InvalidUtf8`]。
    pub async fn read_utf8_line(&self, limit: usize) -> Result<Option<String>, ChannelError> {
        let mut line = BytesMut::new();
        let found = poll_fn(|cx| self.poll_read_until(cx, b'\n', &mut line, limit)).await?;
        if !found && line.is_empty() {
            return Ok(None);
        }
        if found {
            line.truncate(line.len() - 1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
        }
        Ok(Some(String::from_utf8(line.to_vec())?))
    }

    /// 丢弃最多 `max` 字节，返回实际丢弃的数量。
    pub async fn discard(&self, max: u64) -> Result<u64, ChannelError> {
        let mut discarded = 0u64;
        while discarded < max {
            let want = usize::try_from(max - discarded).unwrap_or(usize::MAX);
            match self.read_chunk(want).await? {
                Some(chunk) => discarded += chunk.len() as u64,
                None => break,
            }
        }
        Ok(discarded)
    }

    /// 把最多 `limit` 字节转发到 `dst`，不关闭任何一端。
    ///
    /// 写入 `dst` 失败时以同一原因取消本通道，避免上游写方永久阻塞在背压上。
    pub async fn copy_to(&self, dst: &ByteChannel, limit: u64) -> Result<u64, ChannelError> {
        let mut copied = 0u64;
        let max_chunk = self.config().chunk_size;
        while copied < limit {
            let want = usize::try_from(limit - copied)
                .unwrap_or(usize::MAX)
                .min(max_chunk);
            let Some(chunk) = self.read_chunk(want).await? else {
                break;
            };
            let len = chunk.len() as u64;
            if let Err(error) = dst.write(chunk).await {
                self.cancel(error.clone().into_cause());
                return Err(error);
            }
            copied += len;
        }
        trace!(channel.bytes_copied = copied, "byte channel copy finished");
        Ok(copied)
    }

    /// 转发全部数据后关闭 `dst`；任一端失败时 `dst` 以同一原因关闭。
    pub async fn copy_and_close(&self, dst: &ByteChannel) -> Result<u64, ChannelError> {
        match self.copy_to(dst, u64::MAX).await {
            Ok(copied) => {
                dst.close();
                Ok(copied)
            }
            Err(error) => {
                dst.close_with(error.clone().into_cause());
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::ChannelConfig;

    #[test]
    fn numbers_are_big_endian() {
        let channel = ByteChannel::from_bytes(vec![0x01, 0x02, 0x00, 0x00, 0x00, 0x03, 0xff]);
        assert_eq!(block_on(channel.read_u16()).expect("读取 u16 失败"), 0x0102);
        assert_eq!(block_on(channel.read_u32()).expect("读取 u32 失败"), 3);
        assert_eq!(block_on(channel.read_u8()).expect("读取 u8 失败"), 0xff);
        let err = block_on(channel.read_u64()).expect_err("数据不足应失败");
        assert!(matches!(err, ChannelError::UnexpectedEof { missing: 8 }));
    }

    #[test]
    fn lines_strip_terminators() {
        let channel = ByteChannel::from_bytes("GET / HTTP/1.1\r\nHost: a\nlast");
        assert_eq!(
            block_on(channel.read_utf8_line(64)).expect("读取行失败").as_deref(),
            Some("GET / HTTP/1.1")
        );
        assert_eq!(
            block_on(channel.read_utf8_line(64)).expect("读取行失败").as_deref(),
            Some("Host: a")
        );
        assert_eq!(
            block_on(channel.read_utf8_line(64)).expect("读取行失败").as_deref(),
            Some("last")
        );
        assert_eq!(block_on(channel.read_utf8_line(64)).expect("读取行失败"), None);
    }

    #[test]
    fn line_spanning_chunks_is_joined_and_limited() {
        let channel =
            ByteChannel::with_config(ChannelConfig::new(64, 32, 3)).expect("构造通道失败");
        block_on(channel.write(Bytes::from_static(b"abcdefg\nhijklmnop\n"))).expect("写入失败");
        channel.close();
        assert_eq!(
            block_on(channel.read_utf8_line(16)).expect("读取行失败").as_deref(),
            Some("abcdefg")
        );
        let err = block_on(channel.read_utf8_line(4)).expect_err("超长行应失败");
        assert!(matches!(err, ChannelError::LineTooLong { limit: 4 }));
    }

    #[test]
    fn read_remaining_respects_limit() {
        let channel = ByteChannel::from_bytes("0123456789");
        let head = block_on(channel.read_remaining(4)).expect("读取失败");
        assert_eq!(&head[..], b"0123");
        assert_eq!(channel.available_for_read(), 6);
        assert_eq!(block_on(channel.discard(100)).expect("丢弃失败"), 6);
    }
}
