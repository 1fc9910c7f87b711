//! # Tree Index Benchmarks
//!
//! Claims to validate:
//! - Ancestor and descendant reads cost one filtered read, independent of depth
//! - Sorting any subset needs no tree walk
//! - Cached reads are far cheaper than recomputation
//!
//! Stress conditions:
//! - Deep chains (256 levels)
//! - Wide sibling groups forcing renumbers
//! - Subtree moves rewriting hundreds of closure rows

use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use treenode_index::{
    InMemoryRecordStore, LruCacheBackend, NewNode, NodeId, Position, TreeIndexApi,
    TreeIndexConfig, TreeIndexService,
};

type Service = TreeIndexService<InMemoryRecordStore, LruCacheBackend>;

fn service() -> Service {
    TreeIndexService::in_memory(TreeIndexConfig {
        integrity_check_on_read: false,
        ..TreeIndexConfig::default()
    })
    .expect("valid config")
}

/// Single chain of `depth` nodes below one root; returns the chain.
fn chain(service: &Service, depth: usize) -> Vec<NodeId> {
    let mut ids = Vec::with_capacity(depth + 1);
    let mut parent = None;
    for level in 0..=depth {
        let node = service
            .insert(NewNode::new(format!("level {}", level)), parent, Position::LastSibling)
            .expect("insert");
        parent = Some(node.id);
        ids.push(node.id);
    }
    ids
}

/// Random forest of `size` nodes.
fn forest(service: &Service, size: usize, seed: u64) -> Vec<NodeId> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ids: Vec<NodeId> = Vec::with_capacity(size);
    for i in 0..size {
        let parent = if ids.is_empty() || rng.gen_ratio(1, 20) {
            None
        } else {
            Some(ids[rng.gen_range(0..ids.len())])
        };
        let node = service
            .insert(NewNode::new(format!("node {}", i)), parent, Position::LastSibling)
            .expect("insert");
        ids.push(node.id);
    }
    ids
}

pub fn bench_ancestor_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("treenode-ancestor-reads");
    group.measurement_time(Duration::from_secs(5));

    for depth in [16usize, 64, 256] {
        let service = service();
        let ids = chain(&service, depth);
        let leaf = ids[ids.len() - 1];

        group.bench_with_input(BenchmarkId::new("cached", depth), &leaf, |b, &leaf| {
            b.iter(|| black_box(service.ancestors_of(leaf).expect("read")))
        });
        group.bench_with_input(BenchmarkId::new("uncached", depth), &leaf, |b, &leaf| {
            b.iter(|| {
                service.flush_cache().expect("flush");
                black_box(service.ancestors_of(leaf).expect("read"))
            })
        });
    }
    group.finish();
}

pub fn bench_sort_subset(c: &mut Criterion) {
    let mut group = c.benchmark_group("treenode-sort-subset");
    let service = service();
    let ids = forest(&service, 2_000, 42);
    let mut rng = StdRng::seed_from_u64(9);

    for size in [10usize, 100, 1_000] {
        let subset: Vec<NodeId> = (0..size).map(|_| ids[rng.gen_range(0..ids.len())]).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &subset, |b, subset| {
            b.iter(|| {
                service.flush_cache().expect("flush");
                black_box(service.sort_subset(subset).expect("sort"))
            })
        });
    }
    group.finish();
}

pub fn bench_insert_between(c: &mut Criterion) {
    let mut group = c.benchmark_group("treenode-insert-between");

    // Repeated inserts left of the same sibling exhaust the gap and renumber.
    group.bench_function("left_of_fixed_sibling", |b| {
        let service = service();
        let root = chain(&service, 0)[0];
        let anchor = service
            .insert(NewNode::new("anchor"), Some(root), Position::LastSibling)
            .expect("insert")
            .id;
        service
            .insert(NewNode::new("first"), Some(root), Position::FirstSibling)
            .expect("insert");
        b.iter(|| {
            black_box(
                service
                    .insert(NewNode::new("x"), Some(root), Position::LeftSibling(anchor))
                    .expect("insert"),
            )
        })
    });
    group.finish();
}

pub fn bench_subtree_move(c: &mut Criterion) {
    let mut group = c.benchmark_group("treenode-subtree-move");
    group.measurement_time(Duration::from_secs(5));

    for depth in [8usize, 32] {
        let service = service();
        let ids = chain(&service, depth);
        let other = service
            .insert(NewNode::new("other"), None, Position::LastSibling)
            .expect("insert")
            .id;
        let home = ids[0];
        let moving = ids[1];
        let mut flip = false;

        group.bench_with_input(BenchmarkId::from_parameter(depth), &moving, |b, &moving| {
            b.iter(|| {
                flip = !flip;
                let target = if flip { other } else { home };
                black_box(
                    service
                        .move_node(moving, Some(target), Position::LastSibling)
                        .expect("move"),
                )
            })
        });
    }
    group.finish();
}
