use crate::tree::RawTree;

mod tree;

#[test]
fn strided_insert_then_drain() {
    let mut tree = RawTree::default();
    for k in 0..10_000u64 {
        tree.set(k * 7, k).unwrap();
    }
    tree.check_invariants();
    assert!(tree.alloc.live_bytes() > 0);

    for k in 0..10_000u64 {
        assert!(tree.delete(k * 7));
    }
    tree.check_invariants();
    assert_eq!(tree.alloc.live_bytes(), 0);
}
