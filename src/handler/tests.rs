use super::*;
use crate::merkle::{HashTree, PieceHash};
use crate::peer::{Message, PeerContext, SharedFile};
use crate::store::{MemoryPieceStore, PieceStore};
use bytes::Bytes;
use std::sync::Arc;

fn piece_bytes(n: usize) -> Vec<Bytes> {
    (0..n)
        .map(|i| Bytes::from(format!("piece {i} contents")))
        .collect()
}

async fn seeder_context(pieces: &[Bytes]) -> PeerContext {
    let hashes = pieces.iter().map(|p| PieceHash::digest(p)).collect();
    let tree = HashTree::from_piece_hashes(hashes);
    let file = Arc::new(SharedFile::new(tree));
    let store = Arc::new(MemoryPieceStore::new());
    for (i, piece) in pieces.iter().enumerate() {
        store
            .write_piece(file.hash(), i as u64, piece.clone())
            .await
            .unwrap();
    }
    PeerContext::new(file, store)
}

fn downloader_context(piece_count: usize, root: PieceHash) -> PeerContext {
    let file = Arc::new(SharedFile::new(HashTree::empty(piece_count, root)));
    PeerContext::new(file, Arc::new(MemoryPieceStore::new()))
}

#[tokio::test]
async fn request_handler_serves_held_piece() {
    let pieces = piece_bytes(5);
    let seeder = seeder_context(&pieces).await;
    let resolver = HandlerResolver::with_defaults();

    let reply = resolver
        .dispatch(&seeder, Message::PieceRequest { index: 3 })
        .await
        .unwrap();

    let Some(Message::PieceResponse {
        index,
        leaf_hash,
        path,
        data,
    }) = reply
    else {
        panic!("expected a piece response");
    };
    assert_eq!(index, 3);
    assert_eq!(leaf_hash, PieceHash::digest(&pieces[3]));
    assert_eq!(path, seeder.shared_file.path(3));
    assert_eq!(data, pieces[3]);
}

#[tokio::test]
async fn request_handler_declines_missing_or_bogus() {
    let pieces = piece_bytes(4);
    let seeder = seeder_context(&pieces).await;
    let downloader = downloader_context(4, seeder.shared_file.hash());
    let resolver = HandlerResolver::with_defaults();

    // Downloader holds nothing, so it cannot serve.
    let reply = resolver
        .dispatch(&downloader, Message::PieceRequest { index: 0 })
        .await
        .unwrap();
    assert!(reply.is_none());

    // Out-of-range index from a hostile peer is ignored.
    let reply = resolver
        .dispatch(&seeder, Message::PieceRequest { index: 4000 })
        .await
        .unwrap();
    assert!(reply.is_none());
}

#[tokio::test]
async fn response_handler_verifies_and_stores() {
    let pieces = piece_bytes(3);
    let seeder = seeder_context(&pieces).await;
    let downloader = downloader_context(3, seeder.shared_file.hash());
    let resolver = HandlerResolver::with_defaults();

    let response = resolver
        .dispatch(&seeder, Message::PieceRequest { index: 1 })
        .await
        .unwrap()
        .expect("seeder serves piece 1");
    let reply = resolver.dispatch(&downloader, response).await.unwrap();
    assert!(reply.is_none());

    assert!(downloader.shared_file.leaf_states().has(1));
    let stored = downloader
        .store
        .read_piece(downloader.shared_file.hash(), 1)
        .await
        .unwrap()
        .expect("verified piece is stored");
    assert_eq!(stored, pieces[1]);
}

#[tokio::test]
async fn response_handler_drops_tampered_piece() {
    let pieces = piece_bytes(3);
    let seeder = seeder_context(&pieces).await;
    let downloader = downloader_context(3, seeder.shared_file.hash());
    let resolver = HandlerResolver::with_defaults();

    let Some(Message::PieceResponse {
        index,
        leaf_hash,
        path,
        ..
    }) = resolver
        .dispatch(&seeder, Message::PieceRequest { index: 2 })
        .await
        .unwrap()
    else {
        panic!("expected a piece response");
    };

    let forged = Message::PieceResponse {
        index,
        leaf_hash,
        path,
        data: Bytes::from_static(b"not the real piece"),
    };
    resolver.dispatch(&downloader, forged).await.unwrap();

    assert_eq!(downloader.shared_file.leaf_states().count(), 0);
    let stored = downloader
        .store
        .read_piece(downloader.shared_file.hash(), 2)
        .await
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn full_conversation_completes_the_file() {
    let pieces = piece_bytes(11);
    let seeder = seeder_context(&pieces).await;
    let downloader = downloader_context(11, seeder.shared_file.hash());
    let resolver = HandlerResolver::with_defaults();

    for index in downloader.shared_file.leaf_states().missing() {
        let request = Message::PieceRequest {
            index: index as u64,
        };
        let response = resolver
            .dispatch(&seeder, request)
            .await
            .unwrap()
            .expect("seeder holds every piece");
        resolver.dispatch(&downloader, response).await.unwrap();
    }

    assert!(downloader.shared_file.leaf_states().is_complete());
    for (i, piece) in pieces.iter().enumerate() {
        let stored = downloader
            .store
            .read_piece(downloader.shared_file.hash(), i as u64)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&stored, piece);
    }
}

#[tokio::test]
async fn unhandled_kinds_are_ignored() {
    let pieces = piece_bytes(2);
    let seeder = seeder_context(&pieces).await;
    let resolver = HandlerResolver::with_defaults();

    let reply = resolver.dispatch(&seeder, Message::KeepAlive).await.unwrap();
    assert!(reply.is_none());
}
