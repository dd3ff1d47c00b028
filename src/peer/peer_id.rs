use rand::Rng as _;
use std::fmt;

/// Length of a peer identifier in bytes.
pub const PEER_ID_LEN: usize = 16;

/// A 128-bit random identifier, generated once per exchanger.
///
/// Peers carry no client branding or version tag; all the exchange
/// protocol asks of an id is that collisions across any realistic peer
/// population stay negligible, which 128 random bits provide.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; PEER_ID_LEN]);

impl PeerId {
    pub fn generate() -> Self {
        let mut id = [0u8; PEER_ID_LEN];
        rand::rng().fill(&mut id[..]);
        Self(id)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != PEER_ID_LEN {
            return None;
        }
        let mut id = [0u8; PEER_ID_LEN];
        id.copy_from_slice(bytes);
        Some(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; PEER_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self)
    }
}
