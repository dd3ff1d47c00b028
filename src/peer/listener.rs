use super::connection::{Peer, TcpPeer};
use super::context::{PeerContext, SharedFile};
use super::error::PeerError;
use super::message::Handshake;
use super::peer_id::PeerId;
use super::transport::FrameTransport;
use crate::merkle::PieceHash;
use crate::repository::HashTreeRepository;
use crate::store::PieceStore;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Accepts inbound peer sessions.
///
/// `downloading` is the caller's current download target, passed through
/// as an advertisement on the accepted connection; it does not filter
/// what gets served.
#[async_trait]
pub trait PeerServer: Send + Sync {
    async fn accept(
        &self,
        local_id: PeerId,
        downloading: Option<PieceHash>,
        shutdown: &CancellationToken,
    ) -> Result<Arc<dyn Peer>, PeerError>;
}

/// TCP [`PeerServer`]: accepts a connection, reads the handshake, and
/// builds the session context for the file the remote asked for.
pub struct TcpPeerListener {
    listener: TcpListener,
    repository: Arc<dyn HashTreeRepository>,
    store: Arc<dyn PieceStore>,
}

impl TcpPeerListener {
    pub async fn bind(
        addr: SocketAddr,
        repository: Arc<dyn HashTreeRepository>,
        store: Arc<dyn PieceStore>,
    ) -> Result<Self, PeerError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            repository,
            store,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl PeerServer for TcpPeerListener {
    async fn accept(
        &self,
        local_id: PeerId,
        downloading: Option<PieceHash>,
        shutdown: &CancellationToken,
    ) -> Result<Arc<dyn Peer>, PeerError> {
        let (stream, addr) = tokio::select! {
            _ = shutdown.cancelled() => return Err(PeerError::ConnectionClosed),
            accepted = self.listener.accept() => accepted?,
        };
        let mut transport = FrameTransport::new(stream);

        let theirs = tokio::select! {
            _ = shutdown.cancelled() => return Err(PeerError::ConnectionClosed),
            handshake = transport.receive_handshake() => handshake?,
        };

        let tree = self
            .repository
            .load(theirs.file_hash)
            .await
            .map_err(|e| PeerError::HandshakeRejected(e.to_string()))?
            .ok_or_else(|| {
                PeerError::HandshakeRejected(format!("unknown file root {}", theirs.file_hash))
            })?;

        let ours = Handshake::new(local_id, theirs.file_hash, downloading);
        transport.send_handshake(&ours).await?;
        debug!(peer = %addr, file = %theirs.file_hash, "accepted peer");

        let context = PeerContext::new(
            Arc::new(SharedFile::new(tree)),
            Arc::clone(&self.store),
        );
        Ok(TcpPeer::new(
            transport,
            addr,
            theirs.peer_id,
            theirs.downloading,
            context,
        ))
    }
}
