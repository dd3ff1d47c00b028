//! Piece byte storage.
//!
//! The exchanger and the message handlers treat piece bytes as opaque:
//! verified pieces go in, requested pieces come out, keyed by the file's
//! root hash and the piece index. How the bytes are laid out is the
//! store's concern alone.

use crate::merkle::PieceHash;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from reading or writing piece bytes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Keyed storage for the raw bytes of verified pieces.
///
/// Implementations must be safe to call from concurrent peer sessions.
#[async_trait]
pub trait PieceStore: Send + Sync {
    /// Returns the bytes of a piece, or `None` if the store has no copy.
    async fn read_piece(&self, file: PieceHash, index: u64) -> Result<Option<Bytes>, StoreError>;

    /// Stores the bytes of a verified piece, replacing any prior copy.
    async fn write_piece(&self, file: PieceHash, index: u64, data: Bytes)
        -> Result<(), StoreError>;
}

/// Disk-backed piece store: one directory per file root hash, one file
/// per piece.
pub struct FilePieceStore {
    base: PathBuf,
}

impl FilePieceStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn piece_path(&self, file: PieceHash, index: u64) -> PathBuf {
        self.base.join(file.to_hex()).join(format!("{index:08}.piece"))
    }
}

#[async_trait]
impl PieceStore for FilePieceStore {
    async fn read_piece(&self, file: PieceHash, index: u64) -> Result<Option<Bytes>, StoreError> {
        match tokio::fs::read(self.piece_path(file, index)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_piece(
        &self,
        file: PieceHash,
        index: u64,
        data: Bytes,
    ) -> Result<(), StoreError> {
        let path = self.piece_path(file, index);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }
}

/// In-memory piece store, used by tests and short-lived seeders.
#[derive(Default)]
pub struct MemoryPieceStore {
    pieces: DashMap<(PieceHash, u64), Bytes>,
}

impl MemoryPieceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PieceStore for MemoryPieceStore {
    async fn read_piece(&self, file: PieceHash, index: u64) -> Result<Option<Bytes>, StoreError> {
        Ok(self.pieces.get(&(file, index)).map(|entry| entry.clone()))
    }

    async fn write_piece(
        &self,
        file: PieceHash,
        index: u64,
        data: Bytes,
    ) -> Result<(), StoreError> {
        self.pieces.insert((file, index), data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_round_trip() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = FilePieceStore::new(temp.path());
        let file = PieceHash::digest(b"file");

        assert!(store.read_piece(file, 0).await.unwrap().is_none());

        store
            .write_piece(file, 0, Bytes::from_static(b"piece zero"))
            .await
            .unwrap();
        let read = store.read_piece(file, 0).await.unwrap().unwrap();
        assert_eq!(&read[..], b"piece zero");

        store
            .write_piece(file, 0, Bytes::from_static(b"replaced"))
            .await
            .unwrap();
        let read = store.read_piece(file, 0).await.unwrap().unwrap();
        assert_eq!(&read[..], b"replaced");
    }

    #[tokio::test]
    async fn memory_store_keys_by_file_and_index() {
        let store = MemoryPieceStore::new();
        let a = PieceHash::digest(b"a");
        let b = PieceHash::digest(b"b");

        store.write_piece(a, 1, Bytes::from_static(b"x")).await.unwrap();
        assert!(store.read_piece(b, 1).await.unwrap().is_none());
        assert!(store.read_piece(a, 2).await.unwrap().is_none());
        assert!(store.read_piece(a, 1).await.unwrap().is_some());
    }
}
