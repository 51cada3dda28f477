use std::collections::BTreeMap;

use bfm_tree::BfmTree;
use proptest::prelude::*;
use rand::{
    prelude::{SliceRandom, StdRng},
    Rng, SeedableRng,
};

#[derive(Clone, Debug)]
enum TreeOp {
    Get { key: u64 },
    Insert { key: u64, val: u64 },
    Delete { key: u64 },
}

fn test_runner(ops: &[TreeOp]) {
    let mut tree = BfmTree::default();
    let mut bt_map = BTreeMap::new();

    for m in ops {
        match m {
            TreeOp::Get { key } => {
                assert_eq!(tree.lookup(*key), bt_map.get(key).cloned());
            }
            TreeOp::Insert { key, val } => {
                let was_present = tree.set(*key, *val).expect("This test won't oom!");
                let btree_insert = bt_map.insert(*key, *val);
                assert_eq!(was_present, btree_insert.is_some());
            }
            TreeOp::Delete { key } => {
                let bt_remove = bt_map.remove(key);
                assert_eq!(tree.delete(*key), bt_remove.is_some());
            }
        }
    }

    assert_eq!(tree.len(), bt_map.len());
    for (k, v) in bt_map.iter() {
        assert_eq!(tree.lookup(*k), Some(*v));
    }
    let expected: Vec<(u64, u64)> = bt_map.into_iter().collect();
    assert_eq!(tree.to_vec(), expected);
}

#[test]
fn insert() {
    let key_cnt = 1_000;
    let ops: Vec<_> = (0..key_cnt).map(|i| TreeOp::Insert { key: i, val: i }).collect();
    test_runner(&ops);
}

#[test]
fn large_insert() {
    let key_cnt = 100_000;
    let mut ops: Vec<TreeOp> = (0..key_cnt)
        .map(|i| TreeOp::Insert { key: i, val: i })
        .collect();
    for i in 0..2 * key_cnt {
        ops.push(TreeOp::Get { key: i });
    }
    test_runner(&ops);
}

#[test]
fn rng_insert() {
    let key_cnt = 30_000u64;
    let mut key_space: Vec<u64> = (0..key_cnt).collect();

    let mut r = StdRng::seed_from_u64(42);
    key_space.shuffle(&mut r);

    let mut ops = vec![];
    for k in key_space.iter() {
        ops.push(TreeOp::Insert { key: *k, val: *k });
    }
    for k in key_space.iter() {
        ops.push(TreeOp::Get { key: *k });
    }
    for i in key_cnt..2 * key_cnt {
        ops.push(TreeOp::Get { key: i });
    }
    test_runner(&ops);
}

#[test]
fn sparse_keys_mixed_ops() {
    let mut r = StdRng::seed_from_u64(42);
    let mut ops = vec![];
    let mut live = vec![];
    for _ in 0..50_000 {
        let key = match r.gen_range(0..4) {
            0 => r.gen::<u64>(),
            1 => r.gen::<u64>() >> r.gen_range(0..64u32),
            _ if !live.is_empty() => live[r.gen_range(0..live.len())],
            _ => r.gen::<u32>() as u64,
        };
        match r.gen_range(0..10) {
            0..=5 => {
                live.push(key);
                ops.push(TreeOp::Insert { key, val: r.gen() });
            }
            6..=7 => ops.push(TreeOp::Delete { key }),
            _ => ops.push(TreeOp::Get { key }),
        }
    }
    test_runner(&ops);
}

#[test]
fn delete_then_reinsert_in_class_128() {
    let mut ops = vec![];
    for i in 0..60 {
        ops.push(TreeOp::Insert { key: i, val: 0 });
    }
    for i in 60..120 {
        ops.push(TreeOp::Insert { key: i, val: 1 });
    }
    for i in 24..30 {
        ops.push(TreeOp::Delete { key: i });
    }
    for i in 200..214 {
        ops.push(TreeOp::Insert { key: i, val: 2 });
    }
    for i in 0..256 {
        ops.push(TreeOp::Get { key: i });
    }
    test_runner(&ops);
}

#[test]
fn remove() {
    let key_cnt = 100_000;
    let mut ops = vec![];
    for i in 0..key_cnt {
        ops.push(TreeOp::Insert { key: i, val: i });
    }
    for i in 0..key_cnt / 2 {
        ops.push(TreeOp::Delete { key: i });
    }
    test_runner(&ops);
}

#[test]
fn extreme_keys() {
    let ops = vec![
        TreeOp::Insert { key: u64::MAX, val: 1 },
        TreeOp::Insert { key: 0, val: 2 },
        TreeOp::Insert { key: u64::MAX, val: 3 },
        TreeOp::Get { key: u64::MAX - 1 },
        TreeOp::Insert { key: 1 << 63, val: 4 },
        TreeOp::Delete { key: 0 },
        TreeOp::Get { key: 0 },
        TreeOp::Insert { key: 4294967295, val: 5 },
        TreeOp::Insert { key: 4294967295, val: 6 },
    ];
    test_runner(&ops);
}

fn key_strategy() -> impl Strategy<Value = u64> + Clone {
    // Dense and sparse keys, so both deep and bushy trees show up.
    prop_oneof![
        0u64..512,
        any::<u64>().prop_map(|k| k >> 40),
        any::<u64>(),
    ]
}

fn ops_strategy() -> impl Strategy<Value = Vec<TreeOp>> {
    let key = key_strategy();
    let op = prop_oneof![
        50 => (key.clone(), any::<u64>()).prop_map(|(key, val)| TreeOp::Insert { key, val }),
        25 => key.clone().prop_map(|key| TreeOp::Delete { key }),
        25 => key.prop_map(|key| TreeOp::Get { key }),
    ];
    prop::collection::vec(op, 0..=2000)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(ops in ops_strategy()) {
        test_runner(&ops);
    }
}
