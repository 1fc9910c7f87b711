//! # Integration Test Flows
//!
//! A catalog built, reorganized and pruned through `TreeIndexApi`, with the
//! index checked against a plain parent-pointer walk along the way.
//!
//! ## Flows Tested:
//!
//! 1. **Build**: roots, children and sorted siblings
//! 2. **Reorganize**: moves across trees and to the root level
//! 3. **Prune**: cascade and promote deletes
//! 4. **Repair**: corrupted rows detected and rebuilt

#[cfg(test)]
mod tests {
    use super::super::{append, assert_index_consistent, memory_service, MemoryService};
    use treenode_index::{
        DeleteMode, DisplayMode, NewNode, NodeId, Position, RecordStore, TreeError,
        TreeIndexApi, TreeScope, WindowDirection,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct Catalog {
        food: NodeId,
        fruit: NodeId,
        apple: NodeId,
        banana: NodeId,
        veg: NodeId,
        carrot: NodeId,
        tools: NodeId,
    }

    /// food/{fruit/{apple, banana}, veg/{carrot}} and a second root tools.
    fn catalog(service: &MemoryService) -> Catalog {
        let food = append(service, "Food", None);
        let fruit = append(service, "Fruit", Some(food));
        let veg = append(service, "Vegetables", Some(food));
        let banana = append(service, "Banana", Some(fruit));
        let apple = service
            .insert(
                NewNode::new("Apple").with_attribute("sku", "F-001"),
                Some(fruit),
                Position::SortedSibling,
            )
            .unwrap()
            .id;
        let carrot = append(service, "Carrot", Some(veg));
        let tools = append(service, "Tools", None);
        Catalog {
            food,
            fruit,
            apple,
            banana,
            veg,
            carrot,
            tools,
        }
    }

    /// Depth-first order from parent pointers alone.
    fn walk(api: &dyn TreeIndexApi, parent: Option<NodeId>, out: &mut Vec<NodeId>) {
        for child in api.children_of(parent).unwrap() {
            out.push(child.id);
            walk(api, Some(child.id), out);
        }
    }

    fn tree_order(api: &dyn TreeIndexApi) -> Vec<NodeId> {
        let mut out = Vec::new();
        walk(api, None, &mut out);
        out
    }

    fn names(api: &dyn TreeIndexApi, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|id| api.get_node(*id).unwrap().name).collect()
    }

    // =============================================================================
    // BUILD
    // =============================================================================

    #[test]
    fn test_catalog_build_orders_and_indexes() {
        let service = memory_service();
        let c = catalog(&service);

        assert_eq!(
            names(&service, &tree_order(&service)),
            ["Food", "Fruit", "Apple", "Banana", "Vegetables", "Carrot", "Tools"]
        );
        assert_eq!(
            service.breadcrumb_path(c.apple, "name").unwrap(),
            ["Food", "Fruit", "Apple"]
        );
        assert_eq!(
            service.breadcrumb_path(c.apple, "sku").unwrap(),
            [c.food.to_string(), c.fruit.to_string(), "F-001".to_string()]
        );
        assert!(service.is_ancestor(c.food, c.carrot).unwrap());
        assert!(!service.is_ancestor(c.tools, c.carrot).unwrap());
        assert_index_consistent(&service);
    }

    #[test]
    fn test_sort_subset_agrees_with_walk() {
        let service = memory_service();
        let c = catalog(&service);
        let order = tree_order(&service);

        let subset = [c.carrot, c.tools, c.apple, c.food];
        let sorted: Vec<NodeId> = service
            .sort_subset(&subset)
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();

        let expected: Vec<NodeId> = order.into_iter().filter(|id| subset.contains(id)).collect();
        assert_eq!(sorted, expected);
    }

    // =============================================================================
    // REORGANIZE
    // =============================================================================

    #[test]
    fn test_reorganize_across_trees() {
        let service = memory_service();
        let c = catalog(&service);

        // vegetables become a tool category, then a root of their own
        service
            .move_node(c.veg, Some(c.tools), Position::FirstSibling)
            .unwrap();
        assert_eq!(service.get_node(c.carrot).unwrap().depth, 2);
        assert!(service.is_ancestor(c.tools, c.carrot).unwrap());
        assert!(!service.is_ancestor(c.food, c.carrot).unwrap());
        service.verify_integrity(c.tools).unwrap();

        service
            .move_node(c.veg, None, Position::LeftSibling(c.tools))
            .unwrap();
        assert_eq!(
            names(&service, &tree_order(&service)),
            ["Food", "Fruit", "Apple", "Banana", "Vegetables", "Carrot", "Tools"]
        );
        assert!(service.get_node(c.veg).unwrap().is_root());
        assert_index_consistent(&service);
    }

    #[test]
    fn test_rejected_move_leaves_catalog_intact() {
        let service = memory_service();
        let c = catalog(&service);
        let before = service.store().edges();

        let err = service
            .move_node(c.food, Some(c.apple), Position::LastSibling)
            .unwrap_err();

        assert_eq!(
            err,
            TreeError::Cycle {
                node: c.food,
                new_parent: c.apple
            }
        );
        assert_eq!(service.store().edges(), before);
    }

    // =============================================================================
    // PRUNE
    // =============================================================================

    #[test]
    fn test_prune_then_rebuild() {
        let service = memory_service();
        let c = catalog(&service);

        let report = service.delete(c.fruit, DeleteMode::Promote).unwrap();
        assert_eq!(report.promoted, vec![c.apple, c.banana]);
        assert_eq!(
            names(&service, &tree_order(&service)),
            ["Food", "Apple", "Banana", "Vegetables", "Carrot", "Tools"]
        );

        let report = service.delete(c.veg, DeleteMode::Cascade).unwrap();
        assert_eq!(report.removed, vec![c.veg, c.carrot]);
        assert_index_consistent(&service);

        let incremental = service.store().edges();
        assert_eq!(service.rebuild_index().unwrap(), incremental.len());
        assert_eq!(service.store().edges(), incremental);
    }

    // =============================================================================
    // VIEWS
    // =============================================================================

    #[test]
    fn test_views_and_search() {
        let service = memory_service();
        let c = catalog(&service);

        let rows = service
            .children_view(Some(c.food), &DisplayMode::Breadcrumb)
            .unwrap();
        let text: Vec<&str> = rows.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(text, ["Food / Fruit", "Food / Vegetables"]);
        assert!(rows.iter().all(|r| !r.is_leaf));

        let hits = service.search("an").unwrap();
        assert_eq!(
            names(&service, &hits.iter().map(|n| n.id).collect::<Vec<_>>()),
            ["Banana"]
        );

        let window = service
            .search_window("a", Some(c.apple), WindowDirection::Down, 2)
            .unwrap();
        assert_eq!(
            names(&service, &window.results.iter().map(|n| n.id).collect::<Vec<_>>()),
            ["Banana", "Vegetables"]
        );
        assert_eq!(window.reference_id, Some(c.veg));
    }

    // =============================================================================
    // REPAIR
    // =============================================================================

    #[test]
    fn test_corruption_detected_and_repaired() {
        let service = memory_service();
        let c = catalog(&service);

        let mut txn = service.store().begin().unwrap();
        txn.delete_edges(&[(c.food, c.carrot)]).unwrap();
        txn.commit().unwrap();

        let err = service.verify_integrity(c.food).unwrap_err();
        assert!(matches!(
            err,
            TreeError::Integrity { scope: TreeScope::Tree(root), .. } if root == c.food
        ));
        service.verify_integrity(c.tools).unwrap();

        service.rebuild_index().unwrap();
        service.verify_integrity(c.food).unwrap();
        assert_index_consistent(&service);
    }
}
