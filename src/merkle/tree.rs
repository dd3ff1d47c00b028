use super::hash::{PieceHash, HASH_LEN};
use super::leaf_states::LeafStates;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

const SNAPSHOT_MAGIC: &[u8; 4] = b"SBTR";
const SNAPSHOT_VERSION: u8 = 1;

/// Errors decoding a persisted tree snapshot.
#[derive(Debug, Error)]
pub enum TreeFormatError {
    #[error("not a tree snapshot")]
    BadMagic,

    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u8),

    #[error("snapshot truncated")]
    Truncated,

    #[error("invalid piece count: {0}")]
    InvalidPieceCount(u64),

    #[error("snapshot root hash is empty")]
    EmptyRoot,
}

/// A two-level Merkle commitment over N fixed-size pieces.
///
/// N need not be a power of two. The pieces are partitioned contiguously
/// into one complete binary subtree per set bit of N, largest first, and a
/// small upper tree combines the subtree roots into the published root
/// hash. Piece slots start out empty on the downloading side and are
/// filled one at a time through [`HashTree::try_add`], which verifies the
/// piece hash against the root using a caller-supplied sibling path before
/// committing anything.
///
/// Subtrees are stored level-order with leaves in the top half: a subtree
/// with L leaves occupies `2L - 1` slots, leaves at `[L - 1, 2L - 1)`.
/// The upper tree has `2T - 1` slots for T subtrees; the root of subtree k
/// sits at slot `2k + 1`, except the last subtree, which is promoted to
/// slot `2k` when `2k` is the final slot. Slot 0 is the overall root.
#[derive(Debug, Clone)]
pub struct HashTree {
    root_hash: PieceHash,
    pieces: Vec<PieceHash>,
    leaf_counts: Vec<usize>,
    trees: Vec<Vec<PieceHash>>,
    root_tree: Vec<PieceHash>,
}

impl HashTree {
    /// Creates a tree with a known root and every piece slot empty.
    ///
    /// This is the downloading side: pieces arrive from remote peers and
    /// are admitted through [`HashTree::try_add`].
    ///
    /// # Panics
    ///
    /// Panics if `piece_count` is zero.
    pub fn empty(piece_count: usize, root_hash: PieceHash) -> Self {
        assert!(piece_count > 0, "a file has at least one piece");
        let leaf_counts = leaf_counts_for(piece_count);
        let trees = leaf_counts
            .iter()
            .map(|&lc| vec![PieceHash::EMPTY; 2 * lc - 1])
            .collect::<Vec<_>>();
        let root_tree = vec![PieceHash::EMPTY; 2 * leaf_counts.len() - 1];
        Self {
            root_hash,
            pieces: vec![PieceHash::EMPTY; piece_count],
            leaf_counts,
            trees,
            root_tree,
        }
    }

    /// Builds a complete tree from the full sequence of piece hashes and
    /// fixes the root.
    ///
    /// This is the seeding side: every interior node is computed, so the
    /// tree can produce a sibling path for any piece.
    ///
    /// # Panics
    ///
    /// Panics if `piece_hashes` is empty.
    pub fn from_piece_hashes(piece_hashes: Vec<PieceHash>) -> Self {
        assert!(!piece_hashes.is_empty(), "a file has at least one piece");
        let leaf_counts = leaf_counts_for(piece_hashes.len());

        let mut trees = Vec::with_capacity(leaf_counts.len());
        let mut base = 0;
        for &lc in &leaf_counts {
            let mut nodes = vec![PieceHash::EMPTY; 2 * lc - 1];
            nodes[lc - 1..].copy_from_slice(&piece_hashes[base..base + lc]);
            for idx in (0..lc - 1).rev() {
                nodes[idx] = nodes[2 * idx + 1].concat(&nodes[2 * idx + 2]);
            }
            trees.push(nodes);
            base += lc;
        }

        let tree_count = leaf_counts.len();
        let mut root_tree = vec![PieceHash::EMPTY; 2 * tree_count - 1];
        for (k, nodes) in trees.iter().enumerate() {
            root_tree[root_slot(k, tree_count)] = nodes[0];
        }
        // Interior slots of the upper tree are the even indices below the
        // last; slot j combines slots j+1 and j+2.
        let mut j = root_tree.len() as isize - 3;
        while j >= 0 {
            let j_us = j as usize;
            root_tree[j_us] = root_tree[j_us + 1].concat(&root_tree[j_us + 2]);
            j -= 2;
        }

        Self {
            root_hash: root_tree[0],
            pieces: piece_hashes,
            leaf_counts,
            trees,
            root_tree,
        }
    }

    /// The published commitment for the whole file.
    pub fn root_hash(&self) -> PieceHash {
        self.root_hash
    }

    /// Total number of pieces committed to.
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// The hash of piece `index`, or the empty sentinel if not yet held.
    ///
    /// `index` must be in range; out-of-range access is a caller bug.
    pub fn piece_hash(&self, index: usize) -> PieceHash {
        self.pieces[index]
    }

    /// One bit per piece: set iff the piece has been verified and stored.
    pub fn leaf_states(&self) -> LeafStates {
        let mut states = LeafStates::new(self.pieces.len());
        for (i, hash) in self.pieces.iter().enumerate() {
            if !hash.is_empty() {
                states.set(i);
            }
        }
        states
    }

    /// The sibling hashes along the path from leaf `index` to the root,
    /// bottom-up.
    ///
    /// Entries are empty sentinels wherever the corresponding interior
    /// node has not been learned yet; a path is only usable for serving
    /// once every entry is a real digest.
    pub fn path(&self, index: usize) -> Vec<PieceHash> {
        let (k, offset) = self.locate(index);
        let nodes = &self.trees[k];
        let mut path = Vec::new();

        let mut idx = offset + self.leaf_counts[k] - 1;
        while idx > 0 {
            let sibling = if idx % 2 == 1 { idx + 1 } else { idx - 1 };
            path.push(nodes[sibling]);
            idx = (idx - 1) / 2;
        }

        let mut slot = root_slot(k, self.trees.len());
        while slot > 0 {
            if slot % 2 == 1 {
                path.push(self.root_tree[slot + 1]);
                slot -= 1;
            } else {
                path.push(self.root_tree[slot - 1]);
                slot -= 2;
            }
        }

        path
    }

    /// Verifies `item_hash` for piece `index` against the root using the
    /// sibling `path`, and commits it together with every interior node
    /// visited on the way up.
    ///
    /// Returns `false` without touching any slot when the path has the
    /// wrong length, contains an empty sentinel, or does not recompute the
    /// root. Writes are buffered and applied only after the root matches.
    pub fn try_add(&mut self, index: usize, item_hash: PieceHash, path: &[PieceHash]) -> bool {
        if item_hash.is_empty() {
            return false;
        }
        let (k, offset) = self.locate(index);
        let leaf_count = self.leaf_counts[k];

        let mut subtree_writes: Vec<(usize, PieceHash)> = Vec::new();
        let mut root_writes: Vec<(usize, PieceHash)> = Vec::new();
        let mut current = item_hash;
        let mut consumed = 0;

        let mut idx = offset + leaf_count - 1;
        subtree_writes.push((idx, current));
        while idx > 0 {
            let Some(&sibling) = path.get(consumed) else {
                return false;
            };
            consumed += 1;
            if sibling.is_empty() {
                return false;
            }
            // Odd index: current node is the left child.
            let (sibling_idx, parent) = if idx % 2 == 1 {
                (idx + 1, current.concat(&sibling))
            } else {
                (idx - 1, sibling.concat(&current))
            };
            subtree_writes.push((sibling_idx, sibling));
            idx = (idx - 1) / 2;
            current = parent;
            subtree_writes.push((idx, current));
        }

        let mut slot = root_slot(k, self.trees.len());
        root_writes.push((slot, current));
        while slot > 0 {
            let Some(&sibling) = path.get(consumed) else {
                return false;
            };
            consumed += 1;
            if sibling.is_empty() {
                return false;
            }
            if slot % 2 == 1 {
                root_writes.push((slot + 1, sibling));
                current = current.concat(&sibling);
                slot -= 1;
            } else {
                root_writes.push((slot - 1, sibling));
                current = sibling.concat(&current);
                slot -= 2;
            }
            root_writes.push((slot, current));
        }

        if consumed != path.len() || current != self.root_hash {
            return false;
        }

        for (node, hash) in subtree_writes {
            self.trees[k][node] = hash;
        }
        for (node, hash) in root_writes {
            self.root_tree[node] = hash;
        }
        self.pieces[index] = item_hash;
        true
    }

    /// Serialises the whole structure, including interior nodes learned
    /// from verified paths, into a versioned binary snapshot.
    pub fn encode(&self) -> Bytes {
        let node_count: usize = self.trees.iter().map(Vec::len).sum::<usize>()
            + self.pieces.len()
            + self.root_tree.len();
        let mut buf = BytesMut::with_capacity(4 + 1 + HASH_LEN + 8 + node_count * HASH_LEN);
        buf.put_slice(SNAPSHOT_MAGIC);
        buf.put_u8(SNAPSHOT_VERSION);
        buf.put_slice(self.root_hash.as_bytes());
        buf.put_u64(self.pieces.len() as u64);
        for hash in &self.pieces {
            buf.put_slice(hash.as_bytes());
        }
        for nodes in &self.trees {
            for hash in nodes {
                buf.put_slice(hash.as_bytes());
            }
        }
        for hash in &self.root_tree {
            buf.put_slice(hash.as_bytes());
        }
        buf.freeze()
    }

    /// Reconstructs a tree from a snapshot produced by [`HashTree::encode`].
    pub fn decode(data: &[u8]) -> Result<Self, TreeFormatError> {
        let mut buf = data;
        if buf.remaining() < 4 + 1 + HASH_LEN + 8 {
            return Err(TreeFormatError::Truncated);
        }
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != SNAPSHOT_MAGIC {
            return Err(TreeFormatError::BadMagic);
        }
        let version = buf.get_u8();
        if version != SNAPSHOT_VERSION {
            return Err(TreeFormatError::UnsupportedVersion(version));
        }

        let root_hash = read_hash(&mut buf)?;
        if root_hash.is_empty() {
            return Err(TreeFormatError::EmptyRoot);
        }
        let piece_count = buf.get_u64();
        if piece_count == 0 || piece_count > usize::MAX as u64 {
            return Err(TreeFormatError::InvalidPieceCount(piece_count));
        }
        let piece_count = piece_count as usize;
        let leaf_counts = leaf_counts_for(piece_count);

        let mut pieces = Vec::with_capacity(piece_count);
        for _ in 0..piece_count {
            pieces.push(read_hash(&mut buf)?);
        }
        let mut trees = Vec::with_capacity(leaf_counts.len());
        for &lc in &leaf_counts {
            let mut nodes = Vec::with_capacity(2 * lc - 1);
            for _ in 0..2 * lc - 1 {
                nodes.push(read_hash(&mut buf)?);
            }
            trees.push(nodes);
        }
        let mut root_tree = Vec::with_capacity(2 * leaf_counts.len() - 1);
        for _ in 0..2 * leaf_counts.len() - 1 {
            root_tree.push(read_hash(&mut buf)?);
        }

        Ok(Self {
            root_hash,
            pieces,
            leaf_counts,
            trees,
            root_tree,
        })
    }

    /// Maps a piece index to its subtree and the leaf offset within it.
    fn locate(&self, index: usize) -> (usize, usize) {
        let mut base = 0;
        for (k, &lc) in self.leaf_counts.iter().enumerate() {
            if index < base + lc {
                return (k, index - base);
            }
            base += lc;
        }
        panic!("piece index {index} out of range for {} pieces", base);
    }
}

/// One power of two per set bit of `n`, most significant first. These
/// partition the pieces contiguously into complete subtrees.
fn leaf_counts_for(n: usize) -> Vec<usize> {
    (0..usize::BITS)
        .rev()
        .filter(|&b| n & (1 << b) != 0)
        .map(|b| 1usize << b)
        .collect()
}

/// Upper-tree slot holding the root of subtree `k` out of `tree_count`.
fn root_slot(k: usize, tree_count: usize) -> usize {
    let last = 2 * tree_count - 2;
    if 2 * k == last {
        2 * k
    } else {
        2 * k + 1
    }
}

fn read_hash(buf: &mut impl Buf) -> Result<PieceHash, TreeFormatError> {
    if buf.remaining() < HASH_LEN {
        return Err(TreeFormatError::Truncated);
    }
    let mut arr = [0u8; HASH_LEN];
    buf.copy_to_slice(&mut arr);
    Ok(PieceHash(arr))
}
