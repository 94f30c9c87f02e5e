use crate::codec::{read_varint, varint_len, write_varint};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

/// A framed Minecraft protocol connection. The server is offline-mode only
/// (no encryption) and never enables compression, so framing is just
/// `VarInt length` + body.
pub struct Connection {
    stream: Option<TcpStream>,
    read_buf: BytesMut,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
            read_buf: BytesMut::with_capacity(4096),
        }
    }

    /// Create a dummy connection (used as a placeholder after `into_split`).
    pub fn new_dummy() -> Self {
        Self {
            stream: None,
            read_buf: BytesMut::new(),
        }
    }

    /// Read a single packet frame, returning (packet_id, payload).
    pub async fn read_packet(&mut self) -> anyhow::Result<(i32, BytesMut)> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("connection has been split"))?;
        loop {
            if let Some(result) = try_parse_packet(&mut self.read_buf)? {
                return Ok(result);
            }
            let mut tmp = [0u8; 4096];
            let n = stream.read(&mut tmp).await?;
            if n == 0 {
                return Err(anyhow::anyhow!("connection closed"));
            }
            self.read_buf.extend_from_slice(&tmp[..n]);
        }
    }

    /// Write a packet with the given ID and payload.
    pub async fn write_packet(&mut self, packet_id: i32, payload: &[u8]) -> anyhow::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("connection has been split"))?;
        let frame = build_frame(packet_id, payload);
        stream.write_all(&frame).await?;
        Ok(())
    }

    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.stream
            .as_ref()
            .map(|s| s.peer_addr())
            .unwrap_or(Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "dummy connection",
            )))
    }

    /// Split the connection into read and write halves for concurrent I/O.
    /// The write half becomes the single point that serializes outbound
    /// packet order (§C5's outbound queue requirement).
    pub fn into_split(mut self) -> (ConnectionReader, ConnectionWriter) {
        let stream = self.stream.take().expect("cannot split a dummy connection");
        let (read_half, write_half) = stream.into_split();
        (
            ConnectionReader {
                stream: read_half,
                read_buf: self.read_buf,
            },
            ConnectionWriter { stream: write_half },
        )
    }
}

/// Read half of a split connection.
pub struct ConnectionReader {
    stream: OwnedReadHalf,
    read_buf: BytesMut,
}

impl ConnectionReader {
    pub async fn read_packet(&mut self) -> anyhow::Result<(i32, BytesMut)> {
        loop {
            if let Some(result) = try_parse_packet(&mut self.read_buf)? {
                return Ok(result);
            }
            let mut tmp = [0u8; 4096];
            let n = self.stream.read(&mut tmp).await?;
            if n == 0 {
                return Err(anyhow::anyhow!("connection closed"));
            }
            self.read_buf.extend_from_slice(&tmp[..n]);
        }
    }
}

/// Write half of a split connection.
pub struct ConnectionWriter {
    stream: OwnedWriteHalf,
}

impl ConnectionWriter {
    pub async fn write_packet(&mut self, packet_id: i32, payload: &[u8]) -> anyhow::Result<()> {
        let frame = build_frame(packet_id, payload);
        self.stream.write_all(&frame).await?;
        Ok(())
    }
}

// === Shared helpers ===

fn try_parse_packet(read_buf: &mut BytesMut) -> anyhow::Result<Option<(i32, BytesMut)>> {
    if read_buf.is_empty() {
        return Ok(None);
    }

    let mut peek = read_buf.clone();
    let length = match read_varint(&mut peek) {
        Ok(len) => len as usize,
        Err(_) => return Ok(None),
    };

    let varint_bytes = read_buf.len() - peek.len();

    if peek.remaining() < length {
        return Ok(None);
    }

    read_buf.advance(varint_bytes);
    let mut packet_data = read_buf.split_to(length);

    let packet_id = read_varint(&mut packet_data)?;
    trace!(
        "read packet id=0x{:02X} len={}",
        packet_id,
        packet_data.len()
    );

    Ok(Some((packet_id, packet_data)))
}

fn build_frame(packet_id: i32, payload: &[u8]) -> BytesMut {
    let mut packet_buf = BytesMut::new();
    write_varint(&mut packet_buf, packet_id);
    packet_buf.extend_from_slice(payload);

    let mut frame = BytesMut::new();
    write_varint(&mut frame, packet_buf.len() as i32);
    frame.extend_from_slice(&packet_buf);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_frame_length_prefix() {
        let frame = build_frame(5, &[1, 2, 3]);
        let mut buf = frame.clone();
        let len = read_varint(&mut buf).unwrap();
        assert_eq!(len as usize, varint_len(5) + 3);
    }
}
