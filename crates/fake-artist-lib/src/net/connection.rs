//! Length-prefixed bincode framing over a TCP stream.

use bytes::{Buf, Bytes, BytesMut};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::{io::AsyncReadExt, io::AsyncWriteExt, io::BufWriter, net::TcpStream};

use super::{FrameError, Message};

/// Largest frame either side will send or accept. Stroke logs make frames
/// much larger than a plain state message, so this is generous.
pub const MAX_FRAME_LEN: usize = 1 << 20;

const LEN_PREFIX: usize = std::mem::size_of::<u32>();

pub fn from_socket(socket: TcpStream) -> (ConnectionTx, ConnectionRx) {
    let (read_stream, write_stream) = socket.into_split();

    (
        ConnectionTx {
            write_stream: BufWriter::new(write_stream),
        },
        ConnectionRx {
            read_stream,
            buffer: BytesMut::with_capacity(256),
        },
    )
}

#[derive(Debug)]
pub struct ConnectionTx {
    write_stream: BufWriter<OwnedWriteHalf>,
}

#[derive(Debug)]
pub struct ConnectionRx {
    read_stream: OwnedReadHalf,
    buffer: BytesMut,
}

impl ConnectionTx {
    pub async fn write_frame(&mut self, frame: impl Into<Message>) -> Result<(), FrameError> {
        let mut bytes: Bytes = bincode::serialize(&frame.into())?.into();
        if bytes.len() > MAX_FRAME_LEN {
            return Err(FrameError::FrameLength);
        }
        let len = (bytes.len() as u32).to_be_bytes();
        self.write_stream.write_all(&len).await?;
        self.write_stream.write_buf(&mut bytes).await?;
        self.write_stream.flush().await?;
        Ok(())
    }
}

impl ConnectionRx {
    /// Returns `Ok(None)` when the remote closed the connection cleanly.
    pub async fn read_frame(&mut self) -> Result<Option<Message>, FrameError> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            if self.read_stream.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    // Remote closed Connection
                    return Ok(None);
                } else {
                    // Connection closed while still sending data
                    return Err(FrameError::ConnectionReset);
                }
            }
        }
    }

    fn parse_frame(&mut self) -> Result<Option<Message>, FrameError> {
        parse_frame(&mut self.buffer)
    }
}

fn parse_frame(buffer: &mut BytesMut) -> Result<Option<Message>, FrameError> {
    if buffer.len() < LEN_PREFIX {
        return Ok(None);
    }

    // Peek at the length without consuming it until the full frame is present
    let message_len = (&buffer[..LEN_PREFIX]).get_u32() as usize;
    if message_len > MAX_FRAME_LEN {
        return Err(FrameError::FrameLength);
    }
    if buffer.len() < message_len + LEN_PREFIX {
        return Ok(None);
    }

    buffer.advance(LEN_PREFIX);
    let message = bincode::deserialize::<Message>(&buffer[..message_len])?;
    buffer.advance(message_len);

    Ok(Some(message))
}
