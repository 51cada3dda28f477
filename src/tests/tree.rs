use rand::prelude::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::nodes::{Family, NodeKind};
use crate::tree::RawTree;

fn root_count(tree: &RawTree) -> usize {
    let root = tree.root.expect("tree is not empty");
    tree.header(root).count as usize
}

fn root_shift(tree: &RawTree) -> u8 {
    tree.root_shift().expect("tree is not empty")
}

fn leaf_kind_of(tree: &RawTree, key: u64) -> NodeKind {
    let mut node = tree.root.expect("tree is not empty");
    while node.family() == Family::Inner {
        let shift = tree.header(node).shift;
        node = tree.alloc.inner.get(node, (key >> shift) as u8).expect("path exists");
    }
    node.kind()
}

/// Fills one leaf through every class boundary, in mixed order, with values `i + 3`.
fn insert_leaf_grow(tree: &mut RawTree, base: u64) {
    assert!(!tree.set(base, 3).unwrap());
    assert_eq!(tree.lookup(base), Some(3));
    assert_eq!(leaf_kind_of(tree, base), NodeKind::K1);

    let check = |tree: &RawTree, upto: u64| {
        for i in 0..upto {
            assert_eq!(tree.lookup(base + i), Some(i + 3), "key {}", base + i);
        }
        tree.check_invariants();
    };

    for i in 1..4 {
        assert!(!tree.set(base + i, i + 3).unwrap());
    }
    check(tree, 4);
    assert_eq!(leaf_kind_of(tree, base), NodeKind::K4);

    for i in (4..16).rev() {
        assert!(!tree.set(base + i, i + 3).unwrap());
    }
    check(tree, 16);
    assert_eq!(leaf_kind_of(tree, base), NodeKind::K16);

    for i in 16..32 {
        assert!(!tree.set(base + i, i + 3).unwrap());
    }
    check(tree, 32);
    assert_eq!(leaf_kind_of(tree, base), NodeKind::K32);

    for i in 32..128 {
        assert!(!tree.set(base + i, i + 3).unwrap());
    }
    check(tree, 128);
    assert_eq!(leaf_kind_of(tree, base), NodeKind::K128);

    for i in 128..256 {
        assert!(!tree.set(base + i, i + 3).unwrap());
    }
    check(tree, 256);
    assert_eq!(leaf_kind_of(tree, base), NodeKind::K256);
}

#[test]
fn root_leaf_grows() {
    let mut tree = RawTree::default();
    insert_leaf_grow(&mut tree, 0);
    assert_eq!(root_shift(&tree), 0);
    assert_eq!(tree.entries(), 256);
}

#[test]
fn non_root_leaf_grows() {
    let mut tree = RawTree::default();
    assert!(!tree.set(1024, 1024).unwrap());
    insert_leaf_grow(&mut tree, 0);

    assert_eq!(root_shift(&tree), 8);
    assert_eq!(tree.lookup(1024), Some(1024));
    assert_eq!(tree.entries(), 257);
}

#[test]
fn inner_node_grows() {
    let mut tree = RawTree::default();
    let mut cur = 1025u64;
    let mut inserted = vec![];

    let mut insert_while = |tree: &mut RawTree, cond: &dyn Fn(&RawTree) -> bool| {
        while cond(tree) {
            assert!(!tree.set(cur, cur.wrapping_neg()).unwrap());
            inserted.push(cur);
            cur += 256;
        }
        for k in inserted.iter() {
            assert_eq!(tree.lookup(*k), Some(k.wrapping_neg()));
        }
        tree.check_invariants();
    };

    insert_while(&mut tree, &|t| t.root.is_none() || root_shift(t) == 0 || root_count(t) < 4);
    assert_eq!(tree.root.unwrap().kind(), NodeKind::K4);

    insert_while(&mut tree, &|t| root_count(t) < 32);
    assert_eq!(tree.root.unwrap().kind(), NodeKind::K32);

    insert_while(&mut tree, &|t| root_count(t) < 128);
    assert_eq!(tree.root.unwrap().kind(), NodeKind::K128);

    insert_while(&mut tree, &|t| root_count(t) < 256);
    assert_eq!(tree.root.unwrap().kind(), NodeKind::K256);
    assert_eq!(root_shift(&tree), 16);

    insert_while(&mut tree, &|t| root_count(t) == 256);
    assert_eq!(root_shift(&tree), 24);
    assert_eq!(root_count(&tree), 2);
}

#[test]
fn delete_lots() {
    let mut tree = RawTree::default();
    let mut next = 0u64;
    while tree.root.is_none() || root_shift(&tree) != 16 {
        assert!(!tree.set(next, next.wrapping_neg()).unwrap());
        next += 1;
    }
    assert_eq!(next, 0x10001);
    tree.check_invariants();

    for i in 0..next {
        assert_eq!(tree.lookup(i), Some(i.wrapping_neg()));
        assert!(tree.delete(i));
        assert_eq!(tree.lookup(i), None);
    }
    assert!(tree.root.is_none());
    tree.check_invariants();
}

#[test]
fn delete_from_root_leaf() {
    let mut tree = RawTree::default();
    assert!(!tree.set(1, 1).unwrap());
    assert!(tree.delete(1));
    assert_eq!(tree.lookup(1), None);
    assert!(!tree.delete(1));
    assert!(tree.root.is_none());

    assert!(!tree.set(1, 1).unwrap());
    assert!(!tree.set(2, 2).unwrap());
    assert!(tree.delete(1));
    assert_eq!(tree.lookup(1), None);
    assert_eq!(tree.lookup(2), Some(2));
    assert!(tree.delete(2));
    assert!(tree.root.is_none());
    tree.check_invariants();
}

#[test]
fn delete_cascades_to_root() {
    let mut tree = RawTree::default();
    assert!(!tree.set(0xFFFF02, 0xFFFF02).unwrap());
    assert!(!tree.set(1, 1).unwrap());
    assert!(!tree.set(2, 2).unwrap());
    tree.check_invariants();

    assert!(tree.delete(1));
    assert_eq!(tree.lookup(0xFFFF02), Some(0xFFFF02));
    assert_eq!(tree.lookup(2), Some(2));

    // Emptying the low leaf frees it and its chunk-0 ancestors, but the height stays.
    assert!(tree.delete(2));
    assert_eq!(tree.lookup(0xFFFF02), Some(0xFFFF02));
    assert_eq!(root_shift(&tree), 16);
    assert_eq!(root_count(&tree), 1);
    tree.check_invariants();

    assert!(tree.delete(0xFFFF02));
    assert!(!tree.delete(0xFFFF02));
    assert!(tree.root.is_none());
    assert_eq!(tree.max_val, 0);
    tree.check_invariants();
}

#[test]
fn reinsert_after_delete() {
    let mut tree = RawTree::default();
    assert!(!tree.set(0x10000, 0x10000u64.wrapping_neg()).unwrap());
    assert!(!tree.set(0, 0).unwrap());
    assert_eq!(tree.lookup(0), Some(0));
    assert!(tree.delete(0));
    assert_eq!(tree.lookup(0), None);
    assert!(!tree.set(0, 0).unwrap());
    assert!(tree.set(0, 0).unwrap());
    assert_eq!(tree.lookup(0), Some(0));
    tree.check_invariants();
}

#[test]
fn extension_keeps_old_subtree() {
    let mut tree = RawTree::default();
    assert!(!tree.set(3, 1).unwrap());
    assert_eq!(tree.alloc.leaf.live_nodes(NodeKind::K1), 1);
    assert_eq!(tree.alloc.inner.live_nodes(NodeKind::K1), 0);

    assert!(!tree.set(1717, 17).unwrap());
    assert_eq!(tree.lookup(1717), Some(17));
    assert_eq!(tree.lookup(3), Some(1));
    assert_eq!(root_shift(&tree), 8);

    assert!(!tree.set(u64::MAX, 99).unwrap());
    assert_eq!(root_shift(&tree), 56);
    assert_eq!(tree.max_val, u64::MAX);
    assert_eq!(tree.lookup(3), Some(1));
    assert_eq!(tree.lookup(1717), Some(17));
    assert_eq!(tree.lookup(u64::MAX), Some(99));
    tree.check_invariants();
}

#[test]
fn growth_in_any_order() {
    let mut r = StdRng::seed_from_u64(42);
    for n in [1u64, 4, 5, 16, 17, 32, 33, 128, 129, 256, 257, 1000] {
        let mut keys: Vec<u64> = (0..n).collect();
        keys.shuffle(&mut r);

        let mut tree = RawTree::default();
        for k in keys.iter() {
            assert!(!tree.set(*k, k * 10).unwrap());
        }
        tree.check_invariants();
        for k in 0..n {
            assert_eq!(tree.lookup(k), Some(k * 10));
        }

        keys.shuffle(&mut r);
        for k in keys.iter() {
            assert!(tree.delete(*k));
        }
        assert!(tree.root.is_none());
        tree.check_invariants();
    }
}

#[test]
fn class_128_slot_reuse() {
    let mut tree = RawTree::default();
    for k in 0..100u64 {
        tree.set(k, k).unwrap();
    }
    assert_eq!(leaf_kind_of(&tree, 0), NodeKind::K128);
    for k in 0..20u64 {
        assert!(tree.delete(k));
    }
    for k in 200..240u64 {
        tree.set(k, k + 1).unwrap();
    }
    assert_eq!(leaf_kind_of(&tree, 0), NodeKind::K128);

    for k in 20..100u64 {
        assert_eq!(tree.lookup(k), Some(k));
    }
    for k in 200..240u64 {
        assert_eq!(tree.lookup(k), Some(k + 1));
    }
    tree.check_invariants();
}

#[test]
fn no_shrink_on_delete() {
    let mut tree = RawTree::default();
    for k in 0..200u64 {
        tree.set(k, k).unwrap();
    }
    assert_eq!(leaf_kind_of(&tree, 0), NodeKind::K256);
    for k in 1..200u64 {
        tree.delete(k);
    }
    assert_eq!(leaf_kind_of(&tree, 0), NodeKind::K256);
    assert_eq!(tree.lookup(0), Some(0));
    tree.check_invariants();
}

#[test]
fn test_sparse_keys() {
    let key_cnt = 100_000;
    let mut tree = RawTree::default();
    let mut keys = Vec::<u64>::with_capacity(key_cnt);

    let mut r = StdRng::seed_from_u64(42);
    for _i in 0..key_cnt {
        let k = r.gen::<u64>() & 0x7fff_ffff_ffff_ffff;
        keys.push(k);
        tree.set(k, k).unwrap();
    }

    let delete_cnt = key_cnt / 2;
    for k in keys.iter().take(delete_cnt) {
        tree.delete(*k);
    }
    for k in keys.iter().take(delete_cnt) {
        assert!(tree.lookup(*k).is_none());
    }
    for k in keys.iter().skip(delete_cnt) {
        assert_eq!(tree.lookup(*k), Some(*k));
    }
    tree.check_invariants();
}

mod prop {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use crate::tree::RawTree;

    #[derive(Clone, Debug)]
    enum Op {
        Set(u64, u64),
        Delete(u64),
    }

    fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
        let key = prop_oneof![0u64..1024, any::<u64>().prop_map(|k| k >> 44), any::<u64>()];
        let op = prop_oneof![
            3 => (key.clone(), any::<u64>()).prop_map(|(k, v)| Op::Set(k, v)),
            2 => key.prop_map(Op::Delete),
        ];
        prop::collection::vec(op, 0..=500)
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            .. ProptestConfig::default()
        })]

        #[test]
        fn structure_survives_random_ops(ops in ops_strategy()) {
            let mut tree = RawTree::default();
            let mut m = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Set(k, v) => {
                        let was_present = tree.set(k, v).unwrap();
                        prop_assert_eq!(was_present, m.insert(k, v).is_some());
                    }
                    Op::Delete(k) => {
                        prop_assert_eq!(tree.delete(k), m.remove(&k).is_some());
                    }
                }
                tree.check_invariants();
            }

            let mut got = vec![];
            tree.for_each(|k, v| got.push((k, v)));
            let expected: Vec<_> = m.into_iter().collect();
            prop_assert_eq!(got, expected);
        }
    }
}
