use super::*;

fn piece_hashes(n: usize) -> Vec<PieceHash> {
    (0..n).map(|i| PieceHash::digest(&[i as u8, 0xAB])).collect()
}

#[test]
fn sentinel_is_distinct() {
    assert!(PieceHash::EMPTY.is_empty());
    assert!(!PieceHash::digest(b"").is_empty());
    assert_ne!(PieceHash::digest(b""), PieceHash::EMPTY);
}

#[test]
fn concat_is_order_sensitive() {
    let a = PieceHash::digest(b"a");
    let b = PieceHash::digest(b"b");
    assert_ne!(a.concat(&b), b.concat(&a));
    assert_eq!(a.concat(&b), a.concat(&b));
}

#[test]
fn single_piece_file() {
    let hashes = piece_hashes(1);
    let tree = HashTree::from_piece_hashes(hashes.clone());

    assert_eq!(tree.root_hash(), hashes[0]);
    assert!(tree.path(0).is_empty());

    let mut fresh = HashTree::empty(1, tree.root_hash());
    assert!(fresh.try_add(0, hashes[0], &[]));
    assert_eq!(fresh.piece_hash(0), hashes[0]);
}

#[test]
fn four_pieces_form_one_subtree() {
    let hashes = piece_hashes(4);
    let tree = HashTree::from_piece_hashes(hashes.clone());

    for i in 0..4 {
        let path = tree.path(i);
        assert_eq!(path.len(), 2);

        let mut fresh = HashTree::empty(4, tree.root_hash());
        assert!(fresh.try_add(i, hashes[i], &path));
    }

    let expected = hashes[0]
        .concat(&hashes[1])
        .concat(&hashes[2].concat(&hashes[3]));
    assert_eq!(tree.root_hash(), expected);
}

#[test]
fn three_pieces_split_into_two_subtrees() {
    let hashes = piece_hashes(3);
    let tree = HashTree::from_piece_hashes(hashes.clone());

    // The lone third piece pairs directly with the first subtree's root.
    let path = tree.path(2);
    assert_eq!(path, vec![hashes[0].concat(&hashes[1])]);
    assert_eq!(tree.root_hash(), hashes[0].concat(&hashes[1]).concat(&hashes[2]));

    assert_eq!(tree.path(0).len(), 2);
}

#[test]
fn five_pieces_promote_the_last_leaf() {
    let hashes = piece_hashes(5);
    let tree = HashTree::from_piece_hashes(hashes.clone());

    let first_subtree_root = hashes[0]
        .concat(&hashes[1])
        .concat(&hashes[2].concat(&hashes[3]));
    assert_eq!(tree.path(4), vec![first_subtree_root]);

    let mut fresh = HashTree::empty(5, tree.root_hash());
    assert!(fresh.try_add(4, hashes[4], &tree.path(4)));
}

#[test]
fn every_piece_round_trips_for_all_small_counts() {
    for n in 1..=16 {
        let hashes = piece_hashes(n);
        let tree = HashTree::from_piece_hashes(hashes.clone());

        for i in 0..n {
            let path = tree.path(i);
            let mut fresh = HashTree::empty(n, tree.root_hash());
            assert!(
                fresh.try_add(i, hashes[i], &path),
                "piece {i} of {n} failed verification"
            );
            assert_eq!(fresh.piece_hash(i), hashes[i]);
            assert_eq!(fresh.leaf_states().count(), 1);
        }
    }
}

#[test]
fn tampered_piece_is_rejected_without_mutation() {
    let hashes = piece_hashes(7);
    let tree = HashTree::from_piece_hashes(hashes.clone());

    for i in 0..7 {
        let mut fresh = HashTree::empty(7, tree.root_hash());
        let wrong = PieceHash::digest(b"tampered");
        assert!(!fresh.try_add(i, wrong, &tree.path(i)));
        assert!(fresh.piece_hash(i).is_empty());
        assert_eq!(fresh.leaf_states().count(), 0);

        // The failed attempt left the tree usable.
        assert!(fresh.try_add(i, hashes[i], &tree.path(i)));
    }
}

#[test]
fn wrong_path_length_is_rejected() {
    let hashes = piece_hashes(4);
    let tree = HashTree::from_piece_hashes(hashes.clone());
    let path = tree.path(0);

    let mut fresh = HashTree::empty(4, tree.root_hash());
    assert!(!fresh.try_add(0, hashes[0], &path[..1]));

    let mut long = path.clone();
    long.push(PieceHash::digest(b"extra"));
    assert!(!fresh.try_add(0, hashes[0], &long));

    assert!(fresh.try_add(0, hashes[0], &path));
}

#[test]
fn empty_hashes_in_path_are_rejected() {
    let hashes = piece_hashes(4);
    let tree = HashTree::from_piece_hashes(hashes.clone());

    let mut fresh = HashTree::empty(4, tree.root_hash());
    // An untouched tree only yields sentinel siblings.
    let hollow = fresh.path(0);
    assert!(hollow.iter().all(PieceHash::is_empty));
    assert!(!fresh.try_add(0, hashes[0], &hollow));
    assert!(!fresh.try_add(0, PieceHash::EMPTY, &tree.path(0)));
}

#[test]
fn leaf_states_track_added_pieces() {
    let hashes = piece_hashes(6);
    let tree = HashTree::from_piece_hashes(hashes.clone());

    let mut fresh = HashTree::empty(6, tree.root_hash());
    for (added, &i) in [5usize, 0, 3].iter().enumerate() {
        assert!(fresh.try_add(i, hashes[i], &tree.path(i)));
        assert_eq!(fresh.leaf_states().count(), added + 1);
    }
    let states = fresh.leaf_states();
    assert!(states.has(0) && states.has(3) && states.has(5));
    assert!(!states.has(1));
}

#[test]
fn verified_path_can_be_served_back() {
    let hashes = piece_hashes(5);
    let tree = HashTree::from_piece_hashes(hashes.clone());

    let mut fresh = HashTree::empty(5, tree.root_hash());
    let path = tree.path(2);
    assert!(fresh.try_add(2, hashes[2], &path));

    // try_add caches every node it visited, so the path regenerates.
    assert_eq!(fresh.path(2), path);
}

#[test]
fn snapshot_round_trips_partial_tree() {
    let hashes = piece_hashes(5);
    let tree = HashTree::from_piece_hashes(hashes.clone());

    let mut partial = HashTree::empty(5, tree.root_hash());
    assert!(partial.try_add(1, hashes[1], &tree.path(1)));
    assert!(partial.try_add(4, hashes[4], &tree.path(4)));

    let restored = HashTree::decode(&partial.encode()).unwrap();
    assert_eq!(restored.root_hash(), tree.root_hash());
    assert_eq!(restored.piece_count(), 5);
    assert_eq!(restored.leaf_states().missing(), vec![0, 2, 3]);
    assert_eq!(restored.path(1), tree.path(1));

    let full = HashTree::decode(&tree.encode()).unwrap();
    assert!(full.leaf_states().is_complete());
}

#[test]
fn snapshot_rejects_garbage() {
    assert!(matches!(
        HashTree::decode(b"nope"),
        Err(TreeFormatError::Truncated)
    ));
    assert!(matches!(
        HashTree::decode(&[0u8; 64]),
        Err(TreeFormatError::BadMagic)
    ));

    let tree = HashTree::from_piece_hashes(piece_hashes(3));
    let encoded = tree.encode();
    assert!(matches!(
        HashTree::decode(&encoded[..encoded.len() - 1]),
        Err(TreeFormatError::Truncated)
    ));
}
