//! # Concurrent Mutations
//!
//! Writers on disjoint trees run in parallel; writers on shared trees
//! serialize on scope locks. Either way the committed index stays exact.

#[cfg(test)]
mod tests {
    use super::super::{append, assert_index_consistent, memory_service, MemoryService};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;
    use treenode_index::{
        NewNode, NodeId, Position, TreeError, TreeIndexApi, TreeIndexConfig, TreeIndexService,
    };

    /// Run `op` until it stops failing with a retryable error.
    fn retrying<T>(mut op: impl FnMut() -> Result<T, TreeError>) -> Result<T, TreeError> {
        loop {
            match op() {
                Err(e) if e.is_retryable() => std::thread::yield_now(),
                other => return other,
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disjoint_trees_grow_in_parallel() {
        let service = Arc::new(memory_service());
        let roots: Vec<NodeId> = (0..4)
            .map(|i| append(service.as_ref(), &format!("tree {}", i), None))
            .collect();

        let handles: Vec<_> = roots
            .iter()
            .map(|&root| {
                let service = Arc::clone(&service);
                tokio::task::spawn_blocking(move || {
                    let mut parent = root;
                    for depth in 0..25 {
                        let node = retrying(|| {
                            service.insert(
                                NewNode::new(format!("{}-{}", root, depth)),
                                Some(parent),
                                Position::LastSibling,
                            )
                        })
                        .unwrap();
                        parent = node.id;
                    }
                })
            })
            .collect();

        for handle in handles {
            timeout(Duration::from_secs(30), handle)
                .await
                .expect("writers finished")
                .unwrap();
        }

        assert_eq!(service.store().node_count(), 4 + 4 * 25);
        for root in &roots {
            assert_eq!(service.descendants_of(*root).unwrap().len(), 25);
            service.verify_integrity(*root).unwrap();
        }
        assert_index_consistent(&service);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cross_tree_moves_serialize() {
        let service: Arc<MemoryService> = Arc::new(
            TreeIndexService::in_memory(TreeIndexConfig {
                lock_timeout_ms: 50,
                ..TreeIndexConfig::default()
            })
            .unwrap(),
        );
        let left = append(service.as_ref(), "left", None);
        let right = append(service.as_ref(), "right", None);
        let leaves: Vec<NodeId> = (0..8)
            .map(|i| append(service.as_ref(), &format!("leaf {}", i), Some(left)))
            .collect();

        let handles: Vec<_> = leaves
            .iter()
            .enumerate()
            .map(|(i, &leaf)| {
                let service = Arc::clone(&service);
                tokio::task::spawn_blocking(move || {
                    for round in 0..10 {
                        let target = if (i + round) % 2 == 0 { right } else { left };
                        retrying(|| service.move_node(leaf, Some(target), Position::FirstSibling))
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            timeout(Duration::from_secs(30), handle)
                .await
                .expect("movers finished")
                .unwrap();
        }

        let total = service.children_count(left).unwrap() + service.children_count(right).unwrap();
        assert_eq!(total, leaves.len());
        service.verify_integrity(left).unwrap();
        service.verify_integrity(right).unwrap();
        assert_index_consistent(&service);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_torn_state() {
        let service = Arc::new(memory_service());
        let home = append(service.as_ref(), "home", None);
        let away = append(service.as_ref(), "away", None);
        let branch = append(service.as_ref(), "branch", Some(home));
        let mut parent = branch;
        for depth in 0..6 {
            parent = append(service.as_ref(), &format!("deep {}", depth), Some(parent));
        }
        let leaf = parent;

        let writer = {
            let service = Arc::clone(&service);
            tokio::task::spawn_blocking(move || {
                for round in 0..40 {
                    let target = if round % 2 == 0 { away } else { home };
                    retrying(|| service.move_node(branch, Some(target), Position::LastSibling))
                        .unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::task::spawn_blocking(move || {
                    for _ in 0..200 {
                        let chain = service.ancestors_of(leaf).unwrap();
                        assert_eq!(chain.len(), 7);
                        assert!(chain[0].id == home || chain[0].id == away);
                        let sorted = service.sort_subset(&[leaf, branch]).unwrap();
                        assert_eq!(sorted[0].id, branch);
                    }
                })
            })
            .collect();

        timeout(Duration::from_secs(30), writer)
            .await
            .expect("writer finished")
            .unwrap();
        for reader in readers {
            timeout(Duration::from_secs(30), reader)
                .await
                .expect("reader finished")
                .unwrap();
        }
        assert_index_consistent(&service);
    }
}
