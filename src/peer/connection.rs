use super::context::PeerContext;
use super::error::PeerError;
use super::message::Message;
use super::peer_id::PeerId;
use super::transport::{FrameReader, FrameTransport, FrameWriter};
use crate::merkle::PieceHash;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A live session with one remote peer.
///
/// `receive` is an asynchronous pull sequence: `Some(Ok(_))` is a decoded
/// message, `Some(Err(_))` a per-element receive error the caller may skip,
/// `None` the end of the sequence (peer closed, stream poisoned, or
/// cancellation observed). `send` and `receive` may be called from two
/// tasks of the same session concurrently.
#[async_trait]
pub trait Peer: Send + Sync {
    /// The remote endpoint, for logging.
    fn addr(&self) -> SocketAddr;

    /// Session state shared with the message handlers.
    fn context(&self) -> &PeerContext;

    /// True once the session is shut down locally or the stream died.
    fn is_closed(&self) -> bool;

    async fn send(&self, message: Message) -> Result<(), PeerError>;

    async fn receive(&self, shutdown: &CancellationToken) -> Option<Result<Message, PeerError>>;

    /// Half-closes the connection and marks the session finished.
    async fn close(&self);
}

/// TCP-backed [`Peer`] over the framed transport.
pub struct TcpPeer {
    addr: SocketAddr,
    remote_id: PeerId,
    remote_downloading: Option<PieceHash>,
    context: PeerContext,
    reader: Mutex<FrameReader>,
    writer: Mutex<FrameWriter>,
    closed: AtomicBool,
}

impl TcpPeer {
    pub(crate) fn new(
        transport: FrameTransport,
        addr: SocketAddr,
        remote_id: PeerId,
        remote_downloading: Option<PieceHash>,
        context: PeerContext,
    ) -> Arc<Self> {
        let (reader, writer) = transport.into_split();
        Arc::new(Self {
            addr,
            remote_id,
            remote_downloading,
            context,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        })
    }

    /// The identifier the remote end presented in its handshake.
    pub fn remote_id(&self) -> PeerId {
        self.remote_id
    }

    /// The download target the remote end advertised, if any.
    pub fn remote_downloading(&self) -> Option<PieceHash> {
        self.remote_downloading
    }
}

#[async_trait]
impl Peer for TcpPeer {
    fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn context(&self) -> &PeerContext {
        &self.context
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn send(&self, message: Message) -> Result<(), PeerError> {
        if self.is_closed() {
            return Err(PeerError::ConnectionClosed);
        }
        let mut writer = self.writer.lock().await;
        let result = writer.send_message(&message).await;
        if result.is_err() {
            self.closed.store(true, Ordering::Release);
        }
        result
    }

    async fn receive(&self, shutdown: &CancellationToken) -> Option<Result<Message, PeerError>> {
        if self.is_closed() {
            return None;
        }
        let mut reader = tokio::select! {
            _ = shutdown.cancelled() => return None,
            guard = self.reader.lock() => guard,
        };
        let result = tokio::select! {
            _ = shutdown.cancelled() => return None,
            result = reader.receive_message() => result,
        };
        match result {
            Ok(message) => Some(Ok(message)),
            // Decode failures consumed their frame; the sequence goes on.
            Err(e @ (PeerError::InvalidMessage(_) | PeerError::InvalidMessageId(_))) => {
                Some(Err(e))
            }
            Err(PeerError::ConnectionClosed) => {
                self.closed.store(true, Ordering::Release);
                None
            }
            // Anything else poisons the stream: surface it once, then end.
            Err(e) => {
                self.closed.store(true, Ordering::Release);
                Some(Err(e))
            }
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}
