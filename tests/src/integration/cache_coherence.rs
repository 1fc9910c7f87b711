//! # Cache Coherence
//!
//! Cached views must match the committed state after every mutation, even
//! when the cache backend drops requests.

#[cfg(test)]
mod tests {
    use super::super::append;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use treenode_index::cache::{CacheEntry, CacheKey};
    use treenode_index::{
        CacheBackend, CacheError, DeleteMode, InMemoryRecordStore, LruCacheBackend, Node, NodeId,
        Position, TreeError, TreeIndexApi, TreeIndexConfig, TreeIndexService, TreeScope,
    };

    /// LRU backend failing every `every`-th call.
    struct FlakyBackend {
        inner: LruCacheBackend,
        calls: AtomicUsize,
        every: usize,
    }

    impl FlakyBackend {
        fn new(every: usize) -> Self {
            Self {
                inner: LruCacheBackend::new(1024),
                calls: AtomicUsize::new(0),
                every,
            }
        }

        fn trip(&self) -> Result<(), CacheError> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            if n % self.every == 0 {
                Err(CacheError::Unavailable("flaky backend".into()))
            } else {
                Ok(())
            }
        }
    }

    impl CacheBackend for FlakyBackend {
        fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
            self.trip()?;
            self.inner.get(key)
        }

        fn set(
            &self,
            key: CacheKey,
            entry: CacheEntry,
            ttl: Option<Duration>,
        ) -> Result<bool, CacheError> {
            self.trip()?;
            self.inner.set(key, entry, ttl)
        }

        fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
            self.trip()?;
            self.inner.delete(key)
        }

        fn clear_scope(&self, scope: TreeScope) -> Result<usize, CacheError> {
            self.trip()?;
            self.inner.clear_scope(scope)
        }
    }

    type FlakyService = TreeIndexService<InMemoryRecordStore, FlakyBackend>;

    fn flaky_service(every: usize) -> FlakyService {
        TreeIndexService::new(
            InMemoryRecordStore::new(),
            FlakyBackend::new(every),
            TreeIndexConfig::default(),
        )
        .unwrap()
    }

    /// Children of `parent` straight from the committed node table.
    fn committed_children(service: &FlakyService, parent: Option<NodeId>) -> Vec<Node> {
        let mut children: Vec<Node> = service
            .store()
            .nodes()
            .into_iter()
            .filter(|n| n.parent == parent)
            .collect();
        children.sort_by_key(|n| (n.priority, n.id));
        children
    }

    fn assert_views_fresh(service: &FlakyService) {
        assert_eq!(service.children_of(None).unwrap(), committed_children(service, None));
        for node in service.store().nodes() {
            assert_eq!(
                service.children_of(Some(node.id)).unwrap(),
                committed_children(service, Some(node.id)),
                "children of {}",
                node.id
            );
            let ancestors: Vec<NodeId> =
                service.ancestors_of(node.id).unwrap().iter().map(|n| n.id).collect();
            let mut chain = Vec::new();
            let mut current = node.parent;
            while let Some(id) = current {
                chain.push(id);
                current = service.get_node(id).unwrap().parent;
            }
            chain.reverse();
            assert_eq!(ancestors, chain, "ancestors of {}", node.id);
        }
    }

    fn random_step(service: &FlakyService, rng: &mut StdRng, step: usize) {
        let nodes = service.store().nodes();
        if nodes.len() < 3 || rng.gen_bool(0.5) {
            let parent = if nodes.is_empty() || rng.gen_bool(0.2) {
                None
            } else {
                Some(nodes[rng.gen_range(0..nodes.len())].id)
            };
            append(service, &format!("n{}", step), parent);
            return;
        }

        let target = nodes[rng.gen_range(0..nodes.len())].id;
        if rng.gen_bool(0.7) {
            let parent = Some(nodes[rng.gen_range(0..nodes.len())].id).filter(|_| rng.gen_bool(0.9));
            match service.move_node(target, parent, Position::FirstSibling) {
                Ok(_) | Err(TreeError::Cycle { .. }) => {}
                Err(e) => panic!("move failed: {}", e),
            }
        } else {
            let mode = if rng.gen_bool(0.5) {
                DeleteMode::Cascade
            } else {
                DeleteMode::Promote
            };
            service.delete(target, mode).unwrap();
        }
    }

    #[test]
    fn test_cached_views_track_random_mutations() {
        let service = flaky_service(usize::MAX);
        let mut rng = StdRng::seed_from_u64(7);

        for step in 0..60 {
            random_step(&service, &mut rng, step);
            assert_views_fresh(&service);
        }
        // nothing changed since the last pass
        assert_views_fresh(&service);
        assert!(service.metrics().snapshot().cache_hits > 0);
        assert_eq!(service.metrics().snapshot().cache_errors, 0);
    }

    #[test]
    fn test_backend_faults_degrade_to_misses() {
        let service = flaky_service(3);
        let mut rng = StdRng::seed_from_u64(11);

        for step in 0..40 {
            random_step(&service, &mut rng, step);
            assert_views_fresh(&service);
        }
        assert!(service.metrics().snapshot().cache_errors > 0);
        for root in service.children_of(None).unwrap() {
            service.verify_integrity(root.id).unwrap();
        }
    }
}
