#![no_main]
use arbitrary::Arbitrary;
use bfm_tree::BfmTree;
use libfuzzer_sys::fuzz_target;
use std::collections::BTreeMap;

/// Follow the tutorial from this post: https://tiemoko.com/blog/diff-fuzz/
#[derive(Arbitrary, Debug)]
enum MapMethod {
    Get { key: u64 },
    Insert { key: u64, val: u64 },
    /// Keys near each other land in the same leaves, which exercises growth.
    InsertDense { base: u32, cnt: u16 },
    Delete { key: u64 },
    DeleteDense { base: u32, cnt: u16 },
}

fuzz_target!(|methods: Vec<MapMethod>| {
    let mut tree = BfmTree::with_memory_limit(64 * 1024 * 1024);
    let mut bt_map = BTreeMap::new();

    for m in methods {
        match m {
            MapMethod::Get { key } => {
                assert_eq!(tree.lookup(key), bt_map.get(&key).copied());
            }
            MapMethod::Insert { key, val } => {
                if let Ok(existed) = tree.set(key, val) {
                    assert_eq!(existed, bt_map.insert(key, val).is_some());
                }
            }
            MapMethod::InsertDense { base, cnt } => {
                for key in (base as u64)..(base as u64 + cnt as u64) {
                    match tree.set(key, !key) {
                        Ok(existed) => {
                            assert_eq!(existed, bt_map.insert(key, !key).is_some());
                        }
                        Err(_) => break,
                    }
                }
            }
            MapMethod::Delete { key } => {
                assert_eq!(tree.delete(key), bt_map.remove(&key).is_some());
            }
            MapMethod::DeleteDense { base, cnt } => {
                for key in (base as u64)..(base as u64 + cnt as u64) {
                    assert_eq!(tree.delete(key), bt_map.remove(&key).is_some());
                }
            }
        }
        assert_eq!(tree.len(), bt_map.len());
    }

    let mut pairs = Vec::with_capacity(bt_map.len());
    tree.for_each(|k, v| pairs.push((k, v)));
    assert!(pairs.iter().copied().eq(bt_map.into_iter()));
});
