//! The piece exchanger: concurrent session orchestration.
//!
//! One exchanger drives both roles at once. The serving loop accepts
//! peers forever and detaches a receive session per peer; the downloading
//! side runs at most one task, walking a list of candidate hosts and
//! racing a receive session against a request sender per connected peer.
//! Retargeting the download cancels and drains the prior task before the
//! next one starts, and the verified hash tree is persisted after every
//! session.

use crate::handler::{HandlerError, HandlerResolver};
use crate::merkle::PieceHash;
use crate::peer::{Message, Peer, PeerConnector, PeerContext, PeerError, PeerId, PeerServer, SharedFile};
use crate::repository::{HashTreeRepository, RepositoryError};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

/// Errors ending a peer session.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("peer error: {0}")]
    Peer(#[from] PeerError),

    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// The download slot: one logical cell holding everything about the
/// currently running download. Mutated only by `start_downloading` and a
/// download task's terminal cleanup; the generation counter lets a stale
/// task recognise that a newer retarget already owns the slot.
#[derive(Default)]
struct DownloadSlot {
    downloading: Option<PieceHash>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    generation: u64,
}

/// Session-level orchestrator for serving and downloading pieces.
///
/// Construct one per node, wrap it in an [`Arc`], run
/// [`PieceExchanger::start_distributing`] in a task, and point
/// [`PieceExchanger::start_downloading`] at whatever file the user wants
/// next.
pub struct PieceExchanger {
    peer_id: PeerId,
    server: Arc<dyn PeerServer>,
    connector: Arc<dyn PeerConnector>,
    repository: Arc<dyn HashTreeRepository>,
    resolver: Arc<HandlerResolver>,
    slot: Mutex<DownloadSlot>,
    // Serialises retargets; never held by the download task itself.
    retarget: tokio::sync::Mutex<()>,
}

impl PieceExchanger {
    pub fn new(
        server: Arc<dyn PeerServer>,
        connector: Arc<dyn PeerConnector>,
        repository: Arc<dyn HashTreeRepository>,
    ) -> Self {
        Self::with_resolver(server, connector, repository, HandlerResolver::with_defaults())
    }

    /// Like [`PieceExchanger::new`] with a custom set of message handlers.
    pub fn with_resolver(
        server: Arc<dyn PeerServer>,
        connector: Arc<dyn PeerConnector>,
        repository: Arc<dyn HashTreeRepository>,
        resolver: HandlerResolver,
    ) -> Self {
        Self {
            peer_id: PeerId::generate(),
            server,
            connector,
            repository,
            resolver: Arc::new(resolver),
            slot: Mutex::new(DownloadSlot::default()),
            retarget: tokio::sync::Mutex::new(()),
        }
    }

    /// This node's identifier, presented in every handshake.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Root hash of the file currently being downloaded, if any.
    pub fn downloading_file(&self) -> Option<PieceHash> {
        self.slot.lock().downloading
    }

    /// Serves inbound peers until `shutdown` fires.
    ///
    /// Each accepted peer gets a detached receive session; errors inside
    /// a session are logged and contained so the accept loop survives
    /// them. The peer's hash tree is persisted after each accept.
    pub async fn start_distributing(self: &Arc<Self>, shutdown: &CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.server.accept(self.peer_id, self.downloading_file(), shutdown) => accepted,
            };
            let peer = match accepted {
                Ok(peer) => peer,
                Err(e) => {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    warn!(error = %e, "failed to accept peer");
                    continue;
                }
            };

            debug!(peer = %peer.addr(), "serving session started");
            let resolver = Arc::clone(&self.resolver);
            let session = shutdown.child_token();
            let served = Arc::clone(&peer);
            let span = info_span!("serve", peer = %peer.addr());
            tokio::spawn(
                async move {
                    if let Err(e) = receive_loop(served.as_ref(), &resolver, &session).await {
                        warn!(error = %e, "serving session ended with error");
                    }
                }
                .instrument(span),
            );

            self.persist_tree(peer.context()).await;
        }
    }

    /// Retargets the download to `shared_file`, fetching from `hosts`.
    ///
    /// Any prior download task is cancelled and fully drained before the
    /// new one is installed and launched, so two download sessions never
    /// overlap. Returns once the new task is scheduled.
    pub async fn start_downloading(
        self: &Arc<Self>,
        hosts: Vec<SocketAddr>,
        shared_file: Arc<SharedFile>,
        shutdown: &CancellationToken,
    ) {
        let _retarget = self.retarget.lock().await;

        let (prior_task, prior_cancel) = {
            let mut slot = self.slot.lock();
            slot.generation += 1;
            (slot.task.take(), slot.cancel.take())
        };
        if let Some(cancel) = prior_cancel {
            cancel.cancel();
        }
        if let Some(task) = prior_task {
            if task.await.is_err() {
                warn!("previous download task panicked");
            }
        }

        let token = shutdown.child_token();
        let mut slot = self.slot.lock();
        slot.downloading = Some(shared_file.hash());
        slot.cancel = Some(token.clone());
        let generation = slot.generation;
        let exchanger = Arc::clone(self);
        slot.task = Some(tokio::spawn(
            async move {
                exchanger
                    .try_download(hosts, shared_file, token, generation)
                    .await;
            }
            .instrument(info_span!("download")),
        ));
    }

    /// Walks `hosts` in order until one session runs to completion.
    ///
    /// Dial timeouts and other per-host failures are logged and skipped.
    /// Whatever happens, the download slot is cleared on the way out
    /// (unless a newer retarget owns it already).
    async fn try_download(
        self: Arc<Self>,
        hosts: Vec<SocketAddr>,
        shared_file: Arc<SharedFile>,
        token: CancellationToken,
        generation: u64,
    ) {
        for host in hosts {
            if token.is_cancelled() {
                break;
            }
            let peer = match self
                .connector
                .connect(Arc::clone(&shared_file), host, &token)
                .await
            {
                Ok(peer) => peer,
                Err(PeerError::DialTimeout) => {
                    warn!(%host, "dial timed out, trying next host");
                    continue;
                }
                Err(e) => {
                    warn!(%host, error = %e, "failed to connect");
                    continue;
                }
            };

            debug!(peer = %peer.addr(), "downloading session started");
            if let Err(e) = self.handle_downloading_peer(&peer, &token).await {
                warn!(peer = %peer.addr(), error = %e, "downloading session ended with error");
            }
            self.persist_tree(peer.context()).await;
            break;
        }

        let mut slot = self.slot.lock();
        if slot.generation == generation {
            slot.downloading = None;
            slot.cancel = None;
            slot.task = None;
        }
    }

    /// One downloading session: a receive task dispatching responses and
    /// a sender requesting every missing piece, raced against each other.
    /// Whichever finishes first tears the other down through the linked
    /// token; both are joined before returning.
    async fn handle_downloading_peer(
        &self,
        peer: &Arc<dyn Peer>,
        token: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        let session = token.child_token();

        let mut receiver = tokio::spawn({
            let peer = Arc::clone(peer);
            let resolver = Arc::clone(&self.resolver);
            let session = session.clone();
            async move { receive_loop(peer.as_ref(), &resolver, &session).await }
        });
        let mut sender = tokio::spawn({
            let peer = Arc::clone(peer);
            let session = session.clone();
            async move { request_missing_pieces(peer.as_ref(), &session).await }
        });

        let (first, second) = tokio::select! {
            finished = &mut receiver => {
                session.cancel();
                (finished, sender.await)
            }
            finished = &mut sender => {
                session.cancel();
                (finished, receiver.await)
            }
        };
        join_outcome(first)?;
        join_outcome(second)?;
        Ok(())
    }

    async fn persist_tree(&self, context: &PeerContext) {
        let snapshot = context.shared_file.snapshot();
        if let Err(e) = self.repository.create_or_replace(snapshot).await {
            warn!(error = %e, "failed to persist hash tree");
        }
    }
}

/// The single dispatch point for inbound traffic, shared by both roles.
///
/// Receive errors are non-fatal: the element is logged and the loop
/// continues. Handler errors and reply-send failures end the session.
async fn receive_loop(
    peer: &dyn Peer,
    resolver: &HandlerResolver,
    token: &CancellationToken,
) -> Result<(), ExchangeError> {
    loop {
        let Some(item) = peer.receive(token).await else {
            break;
        };
        let message = match item {
            Ok(message) => message,
            Err(e) => {
                warn!(peer = %peer.addr(), error = %e, "dropping undecodable message");
                continue;
            }
        };
        if let Some(reply) = resolver.dispatch(peer.context(), message).await? {
            peer.send(reply).await?;
        }
    }
    Ok(())
}

/// Sends a request for every piece the local tree is missing, then
/// closes the peer.
async fn request_missing_pieces(
    peer: &dyn Peer,
    token: &CancellationToken,
) -> Result<(), ExchangeError> {
    let states = peer.context().shared_file.leaf_states();
    for index in states.missing() {
        let request = Message::PieceRequest {
            index: index as u64,
        };
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            sent = peer.send(request) => sent.map_err(ExchangeError::from)?,
        }
    }
    if !peer.is_closed() {
        peer.close().await;
    }
    Ok(())
}

fn join_outcome(joined: Result<Result<(), ExchangeError>, JoinError>) -> Result<(), ExchangeError> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => {
            warn!(error = %e, "session task panicked");
            Ok(())
        }
    }
}
