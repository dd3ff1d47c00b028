use super::connection::{Peer, TcpPeer};
use super::context::{PeerContext, SharedFile};
use super::error::PeerError;
use super::message::Handshake;
use super::peer_id::PeerId;
use super::transport::FrameTransport;
use crate::store::PieceStore;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Dials outbound peer sessions for a file being downloaded.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Connects to `host` to download `shared_file`.
    ///
    /// Fails with [`PeerError::DialTimeout`] when the host cannot be
    /// reached in time.
    async fn connect(
        &self,
        shared_file: Arc<SharedFile>,
        host: SocketAddr,
        shutdown: &CancellationToken,
    ) -> Result<Arc<dyn Peer>, PeerError>;
}

/// TCP [`PeerConnector`] with a bounded dial.
pub struct TcpPeerConnector {
    local_id: PeerId,
    store: Arc<dyn PieceStore>,
    dial_timeout: Duration,
}

impl TcpPeerConnector {
    pub fn new(local_id: PeerId, store: Arc<dyn PieceStore>) -> Self {
        Self {
            local_id,
            store,
            dial_timeout: DIAL_TIMEOUT,
        }
    }

    pub fn with_dial_timeout(mut self, dial_timeout: Duration) -> Self {
        self.dial_timeout = dial_timeout;
        self
    }
}

#[async_trait]
impl PeerConnector for TcpPeerConnector {
    async fn connect(
        &self,
        shared_file: Arc<SharedFile>,
        host: SocketAddr,
        shutdown: &CancellationToken,
    ) -> Result<Arc<dyn Peer>, PeerError> {
        let dialled = tokio::select! {
            _ = shutdown.cancelled() => return Err(PeerError::ConnectionClosed),
            dialled = timeout(self.dial_timeout, TcpStream::connect(host)) => dialled,
        };
        let stream = dialled.map_err(|_| PeerError::DialTimeout)??;
        let mut transport = FrameTransport::new(stream);

        // We are downloading this very file; advertise it.
        let ours = Handshake::new(self.local_id, shared_file.hash(), Some(shared_file.hash()));
        transport.send_handshake(&ours).await?;

        let theirs = tokio::select! {
            _ = shutdown.cancelled() => return Err(PeerError::ConnectionClosed),
            handshake = transport.receive_handshake() => handshake?,
        };
        if theirs.file_hash != shared_file.hash() {
            return Err(PeerError::FileHashMismatch);
        }
        debug!(peer = %host, file = %shared_file.hash(), "connected to peer");

        let context = PeerContext::new(shared_file, Arc::clone(&self.store));
        Ok(TcpPeer::new(
            transport,
            host,
            theirs.peer_id,
            theirs.downloading,
            context,
        ))
    }
}
