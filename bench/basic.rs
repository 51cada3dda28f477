use bfm_tree::BfmTree;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use shumai::{config, ShumaiBench};
use std::{cell::UnsafeCell, collections::BTreeMap, fmt::Display};

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Offset bits of an 8 KiB heap page, as used for dead tuple keys.
const OFFSET_BITS: u32 = 9;
const MAX_TUPLES_PER_PAGE: u16 = 291;

#[derive(Serialize, Clone, Copy, Debug, Deserialize)]
pub enum Workload {
    ReadOnly,
    InsertOnly,
    UpdateOnly,
    DeleteInsert,
    /// Probe random tuple ids against a loaded dead tuple set.
    Reaped,
}

impl Display for Workload {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Serialize, Clone, Copy, Debug, Deserialize)]
pub enum IndexType {
    SingleHashMap,
    BTree,
    Bfm,
}

impl Display for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[config(path = "bench/benchmark.toml")]
pub struct Basic {
    pub name: String,
    pub threads: Vec<usize>,
    pub time: usize,
    #[matrix]
    pub workload: Workload,
    #[matrix]
    pub index_type: IndexType,
}

struct TestBench<Index: DBIndex> {
    index: Index,
    initial_cnt: usize,
    workload: Workload,
}

/// Every index here is single threaded; the benchmark only runs with one thread.
trait DBIndex: Send + Sync {
    fn insert(&self, key: u64, v: u64);
    fn get(&self, key: u64) -> Option<u64>;
    fn remove(&self, key: u64) -> bool;

    fn stats(&self) -> Option<serde_json::Value> {
        None
    }
}

struct BTreeMapWrapper {
    map: UnsafeCell<BTreeMap<u64, u64>>, // only allow single thread access
}

impl BTreeMapWrapper {
    fn new() -> Self {
        Self {
            map: UnsafeCell::new(BTreeMap::new()),
        }
    }
}

unsafe impl Send for BTreeMapWrapper {}
unsafe impl Sync for BTreeMapWrapper {}

impl DBIndex for BTreeMapWrapper {
    fn insert(&self, key: u64, v: u64) {
        unsafe {
            (*self.map.get()).insert(key, v);
        }
    }

    fn get(&self, key: u64) -> Option<u64> {
        unsafe { (*self.map.get()).get(&key).cloned() }
    }

    fn remove(&self, key: u64) -> bool {
        unsafe { (*self.map.get()).remove(&key).is_some() }
    }
}

/// A single thread hash map, the usual answer for point lookups.
struct SingleThreadHashMap {
    map: UnsafeCell<ahash::AHashMap<u64, u64>>, // only allow single thread access
}

impl SingleThreadHashMap {
    fn new(cap: usize) -> Self {
        Self {
            map: UnsafeCell::new(ahash::AHashMap::with_capacity(cap)),
        }
    }
}

unsafe impl Send for SingleThreadHashMap {}
unsafe impl Sync for SingleThreadHashMap {}

impl DBIndex for SingleThreadHashMap {
    fn insert(&self, key: u64, v: u64) {
        unsafe {
            (*self.map.get()).insert(key, v);
        }
    }

    fn get(&self, key: u64) -> Option<u64> {
        unsafe { (*self.map.get()).get(&key).cloned() }
    }

    fn remove(&self, key: u64) -> bool {
        unsafe { (*self.map.get()).remove(&key).is_some() }
    }
}

struct BfmWrapper {
    tree: UnsafeCell<BfmTree>, // only allow single thread access
}

unsafe impl Send for BfmWrapper {}
unsafe impl Sync for BfmWrapper {}

impl DBIndex for BfmWrapper {
    fn insert(&self, key: u64, v: u64) {
        unsafe {
            (*self.tree.get()).set(key, v).unwrap();
        }
    }

    fn get(&self, key: u64) -> Option<u64> {
        unsafe { (*self.tree.get()).lookup(key) }
    }

    fn remove(&self, key: u64) -> bool {
        unsafe { (*self.tree.get()).delete(key) }
    }

    fn stats(&self) -> Option<serde_json::Value> {
        let stats = unsafe { (*self.tree.get()).stats() };
        println!("{stats}");
        Some(serde_json::json!({
            "entries": stats.entries(),
            "depth": stats.depth(),
            "bytes": stats.bytes_excluding_overhead(),
            "allocated_bytes": stats.bytes_including_overhead(),
        }))
    }
}

/// Splits a tuple id into a key and a bit of that key's bitmap.
fn tid_key(block: u64, offset: u64) -> (u64, u64) {
    let packed = (block << OFFSET_BITS) | offset;
    (packed >> 6, 1 << (packed & 63))
}

/// Every fifth tuple of a page is dead, at a page dependent phase.
fn is_dead(block: u64, offset: u64) -> bool {
    hash_key(block ^ (offset << 32)) % 5 == 0
}

impl<Index: DBIndex> ShumaiBench for TestBench<Index> {
    type Config = Basic;
    type Result = usize;

    fn load(&mut self) -> Option<serde_json::Value> {
        match self.workload {
            Workload::Reaped => {
                for block in 0..self.initial_cnt as u64 {
                    for offset in 1..=MAX_TUPLES_PER_PAGE as u64 {
                        if is_dead(block, offset) {
                            let (key, bit) = tid_key(block, offset);
                            let old = self.index.get(key).unwrap_or(0);
                            self.index.insert(key, old | bit);
                        }
                    }
                }
            }
            _ => {
                for i in 0..self.initial_cnt as u64 {
                    self.index.insert(hash_key(i), i);
                }
            }
        }
        self.index.stats()
    }

    fn run(&self, context: shumai::Context<Self::Config>) -> Self::Result {
        let mut op_cnt = 0;
        let mut rng = thread_rng();

        context.wait_for_start();

        let mut i = 0;
        while context.is_running() {
            match context.config.workload {
                Workload::ReadOnly => {
                    if i == self.initial_cnt as u64 {
                        i = 0;
                    }
                    assert_eq!(self.index.get(hash_key(i)), Some(i));
                    i += 1;
                }
                Workload::InsertOnly => {
                    let val = rng.gen::<u64>();
                    self.index.insert(val, val);
                }
                Workload::UpdateOnly => {
                    let key = rng.gen_range(0..self.initial_cnt as u64);
                    self.index.insert(hash_key(key), rng.gen());
                }
                Workload::DeleteInsert => {
                    let key = hash_key(rng.gen_range(0..self.initial_cnt as u64));
                    if self.index.remove(key) {
                        self.index.insert(key, key);
                    }
                }
                Workload::Reaped => {
                    let block = rng.gen_range(0..self.initial_cnt as u64);
                    let offset = rng.gen_range(1..=MAX_TUPLES_PER_PAGE as u64);
                    let (key, bit) = tid_key(block, offset);
                    let dead = self.index.get(key).is_some_and(|bits| bits & bit != 0);
                    assert_eq!(dead, is_dead(block, offset));
                }
            }

            op_cnt += 1;
        }
        op_cnt
    }

    fn cleanup(&mut self) -> Option<serde_json::Value> {
        None
    }
}

fn hash_key(key: u64) -> u64 {
    const MULTIPLIER: u64 = 0x9e3779b97f4a7c15;
    key.wrapping_mul(MULTIPLIER)
}

fn main() {
    let config = Basic::load().expect("Failed to parse config!");
    let repeat = 3;
    let initial_cnt = 10_000_000;

    for c in config.iter() {
        if c.threads.len() > 1 || c.threads[0] != 1 {
            panic!("the benchmarked indexes are single threaded!");
        }
        match c.index_type {
            IndexType::BTree => {
                let mut test_bench = TestBench {
                    index: BTreeMapWrapper::new(),
                    initial_cnt,
                    workload: c.workload,
                };
                let result = shumai::run(&mut test_bench, c, repeat);
                result.write_json().unwrap();
            }
            IndexType::SingleHashMap => {
                let mut test_bench = TestBench {
                    index: SingleThreadHashMap::new(initial_cnt),
                    initial_cnt,
                    workload: c.workload,
                };
                let result = shumai::run(&mut test_bench, c, repeat);
                result.write_json().unwrap();
            }
            IndexType::Bfm => {
                let mut test_bench = TestBench {
                    index: BfmWrapper {
                        tree: UnsafeCell::new(BfmTree::new()),
                    },
                    initial_cnt,
                    workload: c.workload,
                };
                let result = shumai::run(&mut test_bench, c, repeat);
                result.write_json().unwrap();
            }
        }
    }
}
