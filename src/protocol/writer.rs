use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::protocol::response::Response;
use crate::protocol::{push_header, status_line};

/// Serializes a response: status line, headers, blank line, raw body.
pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut head = status_line(resp.status, &resp.reason);
    for (name, value) in &resp.headers {
        push_header(&mut head, name, value);
    }
    head.push_str("\r\n");

    let mut frame = head.into_bytes();
    frame.extend_from_slice(&resp.body);
    frame
}

pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self::from_bytes(serialize_response(response))
    }

    /// Wraps bytes that are already serialized, e.g. the handshake acknowledgment.
    pub fn from_bytes(buffer: Vec<u8>) -> Self {
        Self { buffer, written: 0 }
    }

    /// Writes the whole frame and flushes.
    ///
    /// Each write is awaited, so a slow reader holds the connection here
    /// instead of letting output pile up in memory.
    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }
}
