// Newline framing with a per-line length cap

use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use super::protocol::ProtocolError;

/// Splits a byte stream into lines of at most `limit` bytes.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    limit: usize,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, limit: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            limit: limit.max(1),
            buf: Vec::new(),
        }
    }

    /// Next line without its terminator, `None` at end of stream.
    ///
    /// An oversized or non UTF-8 line is consumed whole and returned as a
    /// `ProtocolError`; the reader stays positioned at the following line.
    /// Only I/O failures end the stream early.
    pub async fn next_frame(&mut self) -> io::Result<Option<Result<String, ProtocolError>>> {
        self.buf.clear();
        let read = (&mut self.inner)
            .take(self.limit as u64 + 1)
            .read_until(b'\n', &mut self.buf)
            .await?;
        if read == 0 {
            return Ok(None);
        }

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        } else if self.buf.len() > self.limit {
            self.skip_line().await?;
            return Ok(Some(Err(ProtocolError::TooLong(self.limit))));
        }

        match String::from_utf8(std::mem::take(&mut self.buf)) {
            Ok(line) => Ok(Some(Ok(line))),
            Err(_) => Ok(Some(Err(ProtocolError::InvalidUtf8))),
        }
    }

    // Drop bytes up to and including the next newline
    async fn skip_line(&mut self) -> io::Result<()> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    self.inner.consume(pos + 1);
                    return Ok(());
                }
                None => {
                    let len = available.len();
                    self.inner.consume(len);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(input: &[u8], limit: usize) -> Vec<Result<String, String>> {
        let mut reader = FrameReader::new(input, limit);
        let mut frames = Vec::new();
        while let Some(frame) = reader.next_frame().await.unwrap() {
            frames.push(frame.map_err(|e| e.to_string()));
        }
        frames
    }

    #[tokio::test]
    async fn test_splits_lines() {
        let frames = collect(b"one\r\ntwo\n\nthree", 16).await;
        assert_eq!(
            frames,
            vec![
                Ok("one".to_string()),
                Ok("two".to_string()),
                Ok(String::new()),
                Ok("three".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_long_line_is_skipped() {
        let frames = collect(b"short\nthis line is far too long\nafter\n", 8).await;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], Ok("short".to_string()));
        assert!(frames[1].is_err());
        assert_eq!(frames[2], Ok("after".to_string()));
    }

    #[tokio::test]
    async fn test_line_at_limit_is_accepted() {
        let frames = collect(b"12345678\n", 8).await;
        assert_eq!(frames, vec![Ok("12345678".to_string())]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_reported() {
        let frames = collect(b"\xff\xfe\nok\n", 16).await;
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_err());
        assert_eq!(frames[1], Ok("ok".to_string()));
    }
}
