use crate::merkle::{HashTree, LeafStates, PieceHash};
use crate::store::PieceStore;
use parking_lot::Mutex;
use std::sync::Arc;

/// A file being shared, identified by the root hash of its Merkle tree.
///
/// The tree sits behind a mutex so the response handler can admit pieces
/// while other session code reads states or paths; each accessor takes
/// the lock only for the duration of one tree operation.
pub struct SharedFile {
    hash: PieceHash,
    tree: Mutex<HashTree>,
}

impl SharedFile {
    pub fn new(tree: HashTree) -> Self {
        Self {
            hash: tree.root_hash(),
            tree: Mutex::new(tree),
        }
    }

    /// The root hash, used as the file's identity everywhere.
    pub fn hash(&self) -> PieceHash {
        self.hash
    }

    pub fn piece_count(&self) -> usize {
        self.tree.lock().piece_count()
    }

    pub fn leaf_states(&self) -> LeafStates {
        self.tree.lock().leaf_states()
    }

    pub fn piece_hash(&self, index: usize) -> PieceHash {
        self.tree.lock().piece_hash(index)
    }

    pub fn path(&self, index: usize) -> Vec<PieceHash> {
        self.tree.lock().path(index)
    }

    pub fn try_add(&self, index: usize, item_hash: PieceHash, path: &[PieceHash]) -> bool {
        self.tree.lock().try_add(index, item_hash, path)
    }

    /// A consistent copy of the tree, for persistence.
    pub fn snapshot(&self) -> HashTree {
        self.tree.lock().clone()
    }
}

/// Per-session state handed to message handlers.
#[derive(Clone)]
pub struct PeerContext {
    pub shared_file: Arc<SharedFile>,
    pub store: Arc<dyn PieceStore>,
}

impl PeerContext {
    pub fn new(shared_file: Arc<SharedFile>, store: Arc<dyn PieceStore>) -> Self {
        Self { shared_file, store }
    }
}
