use super::error::PeerError;
use super::peer_id::{PeerId, PEER_ID_LEN};
use crate::merkle::{PieceHash, HASH_LEN};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// The protocol identifier sent at the start of every connection.
pub const PROTOCOL: &[u8] = b"swarmbit protocol";
/// Length of the handshake message in bytes.
pub const HANDSHAKE_LEN: usize = 1 + PROTOCOL.len() + 8 + PEER_ID_LEN + HASH_LEN + 1 + HASH_LEN;

/// Deepest sibling path a response may carry. A file would need more than
/// 2^50 pieces to exceed this.
const MAX_PATH_LEN: usize = 64;

/// Message type identifiers in the piece exchange protocol.
///
/// Each message (except KeepAlive) has a one-byte ID following the length
/// prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Zero-length liveness frame; never dispatched to a handler.
    KeepAlive = 0,
    /// Ask the peer for one piece.
    PieceRequest = 1,
    /// A piece with the proof needed to verify it.
    PieceResponse = 2,
}

impl TryFrom<u8> for MessageKind {
    type Error = PeerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::KeepAlive),
            1 => Ok(MessageKind::PieceRequest),
            2 => Ok(MessageKind::PieceResponse),
            _ => Err(PeerError::InvalidMessageId(value)),
        }
    }
}

/// The handshake exchanged once per connection, in both directions.
///
/// It names the file being shared (by its Merkle root) and optionally
/// advertises the sender's current download target, so the accepting side
/// can note a mutual interest.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// The sender's peer ID.
    pub peer_id: PeerId,
    /// Root hash of the file this connection is about.
    pub file_hash: PieceHash,
    /// The file the sender is currently downloading, if any.
    pub downloading: Option<PieceHash>,
}

impl Handshake {
    pub fn new(peer_id: PeerId, file_hash: PieceHash, downloading: Option<PieceHash>) -> Self {
        Self {
            peer_id,
            file_hash,
            downloading,
        }
    }

    /// Encodes the handshake to bytes for transmission.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_u8(PROTOCOL.len() as u8);
        buf.put_slice(PROTOCOL);
        buf.put_slice(&[0u8; 8]);
        buf.put_slice(self.peer_id.as_bytes());
        buf.put_slice(self.file_hash.as_bytes());
        match self.downloading {
            Some(hash) => {
                buf.put_u8(1);
                buf.put_slice(hash.as_bytes());
            }
            None => {
                buf.put_u8(0);
                buf.put_slice(&[0u8; HASH_LEN]);
            }
        }
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, PeerError> {
        if data.len() < HANDSHAKE_LEN {
            return Err(PeerError::InvalidHandshake);
        }
        if data[0] as usize != PROTOCOL.len() || &data[1..1 + PROTOCOL.len()] != PROTOCOL {
            return Err(PeerError::InvalidHandshake);
        }

        let mut buf = &data[1 + PROTOCOL.len() + 8..];
        let peer_id =
            PeerId::from_bytes(&buf[..PEER_ID_LEN]).ok_or(PeerError::InvalidHandshake)?;
        buf.advance(PEER_ID_LEN);
        let file_hash = read_hash(&mut buf);
        let downloading = match buf.get_u8() {
            0 => {
                buf.advance(HASH_LEN);
                None
            }
            _ => {
                let hash = read_hash(&mut buf);
                (!hash.is_empty()).then_some(hash)
            }
        };

        Ok(Self {
            peer_id,
            file_hash,
            downloading,
        })
    }
}

/// A protocol message.
///
/// On the wire every message is one frame: a 4-byte big-endian length
/// prefix (owned by the transport) and the payload encoded here, a
/// one-byte kind tag followed by the body. A `KeepAlive` is the empty
/// payload. New kinds can be added without touching the exchanger;
/// dispatch happens in the handler resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    PieceRequest {
        index: u64,
    },
    PieceResponse {
        index: u64,
        leaf_hash: PieceHash,
        path: Vec<PieceHash>,
        data: Bytes,
    },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::KeepAlive => MessageKind::KeepAlive,
            Message::PieceRequest { .. } => MessageKind::PieceRequest,
            Message::PieceResponse { .. } => MessageKind::PieceResponse,
        }
    }

    /// Encodes the message payload; the transport adds the length prefix.
    pub fn encode(&self) -> Bytes {
        match self {
            Message::KeepAlive => Bytes::new(),
            Message::PieceRequest { index } => {
                let mut buf = BytesMut::with_capacity(1 + 8);
                buf.put_u8(MessageKind::PieceRequest as u8);
                buf.put_u64(*index);
                buf.freeze()
            }
            Message::PieceResponse {
                index,
                leaf_hash,
                path,
                data,
            } => {
                let body = 1 + 8 + HASH_LEN + 4 + path.len() * HASH_LEN + data.len();
                let mut buf = BytesMut::with_capacity(body);
                buf.put_u8(MessageKind::PieceResponse as u8);
                buf.put_u64(*index);
                buf.put_slice(leaf_hash.as_bytes());
                buf.put_u32(path.len() as u32);
                for hash in path {
                    buf.put_slice(hash.as_bytes());
                }
                buf.put_slice(data);
                buf.freeze()
            }
        }
    }

    /// Decodes one frame's payload, without its length prefix.
    pub fn decode(mut data: Bytes) -> Result<Self, PeerError> {
        if data.is_empty() {
            return Ok(Message::KeepAlive);
        }

        let kind = MessageKind::try_from(data.get_u8())?;
        match kind {
            MessageKind::KeepAlive => Ok(Message::KeepAlive),
            MessageKind::PieceRequest => {
                if data.remaining() != 8 {
                    return Err(PeerError::InvalidMessage("bad request length".into()));
                }
                Ok(Message::PieceRequest {
                    index: data.get_u64(),
                })
            }
            MessageKind::PieceResponse => {
                if data.remaining() < 8 + HASH_LEN + 4 {
                    return Err(PeerError::InvalidMessage("truncated response".into()));
                }
                let index = data.get_u64();
                let leaf_hash = read_hash(&mut data);
                let path_len = data.get_u32() as usize;
                if path_len > MAX_PATH_LEN {
                    return Err(PeerError::InvalidMessage(format!(
                        "path too long: {}",
                        path_len
                    )));
                }
                if data.remaining() < path_len * HASH_LEN {
                    return Err(PeerError::InvalidMessage("truncated path".into()));
                }
                let mut path = Vec::with_capacity(path_len);
                for _ in 0..path_len {
                    path.push(read_hash(&mut data));
                }
                Ok(Message::PieceResponse {
                    index,
                    leaf_hash,
                    path,
                    data,
                })
            }
        }
    }
}

fn read_hash(buf: &mut impl Buf) -> PieceHash {
    let mut arr = [0u8; HASH_LEN];
    buf.copy_to_slice(&mut arr);
    PieceHash(arr)
}
