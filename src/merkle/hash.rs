use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a piece hash in bytes (SHA-256).
pub const HASH_LEN: usize = 32;

/// A 32-byte SHA-256 digest identifying a piece or an interior tree node.
///
/// The all-zero value is reserved as the *empty* sentinel, marking a tree
/// slot whose hash is not yet known. [`PieceHash::concat`] must never be
/// fed the sentinel; callers check with [`PieceHash::is_empty`] first.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PieceHash(pub [u8; HASH_LEN]);

impl PieceHash {
    /// The empty sentinel: a slot with no known hash.
    pub const EMPTY: PieceHash = PieceHash([0u8; HASH_LEN]);

    /// Hashes a byte slice into a piece hash.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Returns `true` if this is the empty sentinel.
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    /// Computes `SHA-256(self ‖ other)`, the parent of two tree nodes.
    ///
    /// Both operands must be real digests; combining the empty sentinel
    /// is a caller contract violation.
    pub fn concat(&self, other: &PieceHash) -> PieceHash {
        debug_assert!(!self.is_empty() && !other.is_empty());
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hasher.update(other.0);
        PieceHash(hasher.finalize().into())
    }

    /// Converts to a lowercase hexadecimal string.
    pub fn to_hex(&self) -> String {
        self.0
            .iter()
            .fold(String::with_capacity(HASH_LEN * 2), |mut s, b| {
                use std::fmt::Write;
                let _ = write!(s, "{:02x}", b);
                s
            })
    }
}

impl fmt::Debug for PieceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PieceHash({})", self.to_hex())
    }
}

impl fmt::Display for PieceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
