//! # Treenode Index Benchmarks
//!
//! | Workload | Claim |
//! |----------|-------|
//! | Ancestor reads | Flat cost in depth; cached reads cheapest |
//! | Subset sort | One batched read, no tree walk |
//! | Insert between | Amortized renumbering |
//! | Subtree move | Linear in subtree rows |

use criterion::{criterion_group, criterion_main};
use treenode_tests::benchmarks::tree_index::{
    bench_ancestor_reads, bench_insert_between, bench_sort_subset, bench_subtree_move,
};

criterion_group!(
    benches,
    bench_ancestor_reads,
    bench_insert_between,
    bench_sort_subset,
    bench_subtree_move
);
criterion_main!(benches);
