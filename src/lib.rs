//! swarmbit - Merkle-verified peer-to-peer piece exchange
//!
//! A node downloads a file assembled from fixed-size pieces by pulling
//! pieces from remote peers while serving the pieces it already holds.
//! Every piece is verified against a Merkle commitment of the whole file
//! before it is accepted, so a hostile or corrupt peer can never damage
//! local state.
//!
//! # Modules
//!
//! - [`merkle`] - Piece hashes and the two-level Merkle hash tree
//! - [`peer`] - Peer sessions, handshake, and wire framing
//! - [`handler`] - Per-message-kind handlers and their resolver
//! - [`store`] - Raw piece byte storage
//! - [`repository`] - Durable hash-tree snapshots
//! - [`exchanger`] - The serving/downloading session orchestrator
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use swarmbit::{
//!     FilePieceStore, FileTreeRepository, HashTree, PeerId, PieceExchanger, PieceHash,
//!     SharedFile, TcpPeerConnector, TcpPeerListener,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(root: PieceHash) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FilePieceStore::new("pieces"));
//! let repository = Arc::new(FileTreeRepository::new("trees"));
//! let peer_id = PeerId::generate();
//!
//! let listener = TcpPeerListener::bind(
//!     "0.0.0.0:6901".parse()?,
//!     repository.clone(),
//!     store.clone(),
//! )
//! .await?;
//! let connector = Arc::new(TcpPeerConnector::new(peer_id, store));
//! let exchanger = Arc::new(PieceExchanger::new(Arc::new(listener), connector, repository));
//!
//! // Serve forever; point the download at a file and some hosts.
//! let shutdown = CancellationToken::new();
//! let file = Arc::new(SharedFile::new(HashTree::empty(1024, root)));
//! exchanger
//!     .start_downloading(vec!["203.0.113.7:6901".parse()?], file, &shutdown)
//!     .await;
//! exchanger.start_distributing(&shutdown).await;
//! # Ok(())
//! # }
//! ```

pub mod exchanger;
pub mod handler;
pub mod merkle;
pub mod peer;
pub mod repository;
pub mod store;

pub use exchanger::{ExchangeError, PieceExchanger};
pub use handler::{
    HandlerError, HandlerResolver, MessageHandler, PieceRequestHandler, PieceResponseHandler,
};
pub use merkle::{HashTree, LeafStates, PieceHash, TreeFormatError, HASH_LEN};
pub use peer::{
    Handshake, Message, MessageKind, Peer, PeerConnector, PeerContext, PeerError, PeerId,
    PeerServer, SharedFile, TcpPeer, TcpPeerConnector, TcpPeerListener,
};
pub use repository::{FileTreeRepository, HashTreeRepository, MemoryTreeRepository, RepositoryError};
pub use store::{FilePieceStore, MemoryPieceStore, PieceStore, StoreError};
