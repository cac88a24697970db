use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::resp::{FrameError, Parser, Value, MAX_FRAME_LEN};

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),

    #[error("connection reset by peer mid-frame")]
    Reset,
}

/// A TCP stream that sends and receives whole RESP frames.
///
/// Bytes that arrive ahead of a complete frame are kept until the rest of
/// the frame shows up, up to the frame limit.
pub struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
    max_frame_len: usize,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(8 * 1024),
            max_frame_len: MAX_FRAME_LEN,
        }
    }

    /// Cap the size of incoming frames; anything larger is a protocol error
    pub fn set_max_frame_len(&mut self, len: usize) {
        self.max_frame_len = len;
    }

    /// Read the next frame. `Ok(None)` means the peer closed the connection
    /// cleanly between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Value>, ConnectionError> {
        loop {
            if let Some((value, consumed)) =
                Parser::parse_with_limit(&self.buffer, self.max_frame_len)?
            {
                self.buffer.advance(consumed);
                return Ok(Some(value));
            }
            if self.buffer.len() >= self.max_frame_len {
                return Err(FrameError::FrameTooLarge(self.buffer.len()).into());
            }

            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(ConnectionError::Reset)
                };
            }
        }
    }

    pub async fn write_frame(&mut self, value: &Value) -> Result<(), ConnectionError> {
        self.stream.write_all(&value.encode()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Write a request and wait for its reply
    pub async fn request(&mut self, value: &Value) -> Result<Value, ConnectionError> {
        self.write_frame(value).await?;
        self.read_frame().await?.ok_or(ConnectionError::Reset)
    }

    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}
