//! Peer sessions and the exchange wire protocol.
//!
//! A session starts with a handshake naming the file (by Merkle root),
//! then carries length-prefixed frames in both directions. The [`Peer`]
//! trait is what the exchanger and the handlers program against; the
//! TCP implementations live alongside it.

mod connection;
mod connector;
mod context;
mod error;
mod listener;
mod message;
mod peer_id;
mod transport;

pub use connection::{Peer, TcpPeer};
pub use connector::{PeerConnector, TcpPeerConnector};
pub use context::{PeerContext, SharedFile};
pub use error::PeerError;
pub use listener::{PeerServer, TcpPeerListener};
pub use message::{Handshake, Message, MessageKind, HANDSHAKE_LEN, PROTOCOL};
pub use peer_id::{PeerId, PEER_ID_LEN};
pub use transport::{FrameReader, FrameTransport, FrameWriter};
