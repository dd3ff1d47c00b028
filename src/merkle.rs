//! Merkle piece commitment.
//!
//! A shared file is committed to by a two-level Merkle structure over its
//! piece hashes. The layout tolerates piece counts that are not powers of
//! two: one complete subtree per set bit of the count, combined by a small
//! upper tree. A single piece can be verified against the published root
//! with only its sibling path, so a downloader accepts or rejects each
//! piece locally without trusting the peer that sent it.

mod hash;
mod leaf_states;
mod tree;

pub use hash::{PieceHash, HASH_LEN};
pub use leaf_states::LeafStates;
pub use tree::{HashTree, TreeFormatError};

#[cfg(test)]
mod tests;
