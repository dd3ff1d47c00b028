//! Durable storage for hash trees.
//!
//! Trees are keyed by their root hash. Persistence is best-effort: a lost
//! tree just means the pieces get re-verified or re-downloaded.

use crate::merkle::{HashTree, PieceHash, TreeFormatError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from persisting or loading a hash tree.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored tree is corrupt: {0}")]
    Format(#[from] TreeFormatError),
}

/// Keyed create-or-replace storage for [`HashTree`] snapshots.
///
/// Concurrent calls for the same key serialize; the last writer wins.
/// Implementations must be safe to call from multiple sessions at once.
#[async_trait]
pub trait HashTreeRepository: Send + Sync {
    /// Persists `tree` under its root hash, replacing any prior snapshot.
    async fn create_or_replace(&self, tree: HashTree) -> Result<(), RepositoryError>;

    /// Loads the snapshot stored under `root_hash`, if any.
    async fn load(&self, root_hash: PieceHash) -> Result<Option<HashTree>, RepositoryError>;
}

/// Process-lifetime repository backed by a concurrent map.
#[derive(Default)]
pub struct MemoryTreeRepository {
    trees: DashMap<PieceHash, HashTree>,
}

impl MemoryTreeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HashTreeRepository for MemoryTreeRepository {
    async fn create_or_replace(&self, tree: HashTree) -> Result<(), RepositoryError> {
        self.trees.insert(tree.root_hash(), tree);
        Ok(())
    }

    async fn load(&self, root_hash: PieceHash) -> Result<Option<HashTree>, RepositoryError> {
        Ok(self.trees.get(&root_hash).map(|entry| entry.clone()))
    }
}

/// Disk-backed repository: one snapshot file per tree, written to a
/// temporary name and renamed into place so a replace is atomic.
pub struct FileTreeRepository {
    base: PathBuf,
}

impl FileTreeRepository {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn tree_path(&self, root_hash: PieceHash) -> PathBuf {
        self.base.join(format!("{}.tree", root_hash.to_hex()))
    }
}

#[async_trait]
impl HashTreeRepository for FileTreeRepository {
    async fn create_or_replace(&self, tree: HashTree) -> Result<(), RepositoryError> {
        tokio::fs::create_dir_all(&self.base).await?;
        let path = self.tree_path(tree.root_hash());
        // Unique staging name: concurrent writers for the same key must
        // not trample each other's half-written snapshot.
        let staging = path.with_extension(format!("tmp.{:016x}", rand::random::<u64>()));
        tokio::fs::write(&staging, tree.encode()).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn load(&self, root_hash: PieceHash) -> Result<Option<HashTree>, RepositoryError> {
        match tokio::fs::read(self.tree_path(root_hash)).await {
            Ok(data) => Ok(Some(HashTree::decode(&data)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree(n: usize) -> HashTree {
        let hashes = (0..n).map(|i| PieceHash::digest(&[i as u8])).collect();
        HashTree::from_piece_hashes(hashes)
    }

    #[tokio::test]
    async fn memory_round_trip() {
        let repository = MemoryTreeRepository::new();
        let tree = sample_tree(5);
        let root = tree.root_hash();

        assert!(repository.load(root).await.unwrap().is_none());
        repository.create_or_replace(tree).await.unwrap();

        let loaded = repository.load(root).await.unwrap().unwrap();
        assert_eq!(loaded.root_hash(), root);
        assert!(loaded.leaf_states().is_complete());
    }

    #[tokio::test]
    async fn file_round_trip_and_replace() {
        let temp = tempfile::TempDir::new().unwrap();
        let repository = FileTreeRepository::new(temp.path());

        let full = sample_tree(6);
        let root = full.root_hash();
        let mut partial = HashTree::empty(6, root);
        assert!(partial.try_add(0, full.piece_hash(0), &full.path(0)));

        repository.create_or_replace(partial).await.unwrap();
        let loaded = repository.load(root).await.unwrap().unwrap();
        assert_eq!(loaded.leaf_states().count(), 1);

        // Replacing with a fuller snapshot wins.
        repository.create_or_replace(full).await.unwrap();
        let loaded = repository.load(root).await.unwrap().unwrap();
        assert!(loaded.leaf_states().is_complete());
    }

    #[tokio::test]
    async fn file_load_missing_is_none() {
        let temp = tempfile::TempDir::new().unwrap();
        let repository = FileTreeRepository::new(temp.path());
        let missing = repository.load(PieceHash::digest(b"nothing")).await.unwrap();
        assert!(missing.is_none());
    }
}
