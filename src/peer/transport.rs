use super::error::PeerError;
use super::message::{Handshake, Message, HANDSHAKE_LEN};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Upper bound on one frame's payload. The largest legitimate frame is a
/// piece response: piece bytes plus a sibling path of at most a few
/// kilobytes, so anything near this limit is a protocol violation.
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

const READ_TIMEOUT: Duration = Duration::from_secs(90);
const WRITE_TIMEOUT: Duration = Duration::from_secs(20);

/// Fills `buf` exactly, mapping a clean EOF to [`PeerError::ConnectionClosed`].
async fn read_full<R>(source: &mut R, buf: &mut [u8]) -> Result<(), PeerError>
where
    R: AsyncRead + Unpin,
{
    match timeout(READ_TIMEOUT, source.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) if e.kind() == ErrorKind::UnexpectedEof => Err(PeerError::ConnectionClosed),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(PeerError::Timeout),
    }
}

/// Reads one length-prefixed frame and returns its payload.
async fn read_frame<R>(source: &mut R) -> Result<Bytes, PeerError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    read_full(source, &mut prefix).await?;
    let length = u32::from_be_bytes(prefix) as usize;
    if length > MAX_FRAME_BYTES {
        return Err(PeerError::Protocol(format!(
            "frame of {} bytes exceeds limit",
            length
        )));
    }
    let mut payload = vec![0u8; length];
    read_full(source, &mut payload).await?;
    Ok(Bytes::from(payload))
}

async fn write_timed<W>(sink: &mut W, data: &[u8]) -> Result<(), PeerError>
where
    W: AsyncWrite + Unpin,
{
    timeout(WRITE_TIMEOUT, sink.write_all(data))
        .await
        .map_err(|_| PeerError::Timeout)??;
    Ok(())
}

/// The handshake-phase transport over a fresh TCP stream.
///
/// Once handshakes have gone both ways, split it so the session's reader
/// and writer can run in separate tasks.
pub struct FrameTransport {
    stream: TcpStream,
}

impl FrameTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn send_handshake(&mut self, handshake: &Handshake) -> Result<(), PeerError> {
        write_timed(&mut self.stream, &handshake.encode()).await
    }

    pub async fn receive_handshake(&mut self) -> Result<Handshake, PeerError> {
        let mut raw = [0u8; HANDSHAKE_LEN];
        read_full(&mut self.stream, &mut raw).await?;
        Handshake::decode(&raw)
    }

    /// Splits into independently usable read and write halves.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (read, write) = self.stream.into_split();
        (FrameReader { half: read }, FrameWriter { half: write })
    }
}

/// The receiving half of a split transport.
pub struct FrameReader {
    half: OwnedReadHalf,
}

impl FrameReader {
    /// Reads and decodes the next message.
    ///
    /// A payload that fails to decode was still fully consumed, so the
    /// stream stays aligned and the caller can keep receiving.
    pub async fn receive_message(&mut self) -> Result<Message, PeerError> {
        let payload = read_frame(&mut self.half).await?;
        Message::decode(payload)
    }
}

/// The sending half of a split transport.
pub struct FrameWriter {
    half: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send_message(&mut self, message: &Message) -> Result<(), PeerError> {
        let payload = message.encode();
        let mut frame = BytesMut::with_capacity(4 + payload.len());
        frame.put_u32(payload.len() as u32);
        frame.put_slice(&payload);
        write_timed(&mut self.half, &frame).await
    }

    /// Half-closes the connection: flushes and sends FIN.
    pub async fn shutdown(&mut self) -> Result<(), PeerError> {
        self.half.shutdown().await?;
        Ok(())
    }
}
