#[cfg(test)]
mod tests {
    use tree_window::{
        HierarchicalDataProvider,
        InMemoryTreeProvider,
        TreeDataCommunicator,
        WindowConfig,
        Page,
        errors::{ConfigError, ProviderError, WindowError},
        result::ProviderResult,
    };
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct Node {
        path: Vec<usize>,
        label: String,
    }

    fn node(path: &[usize]) -> Node {
        Node {
            path: path.to_vec(),
            label: format!("node {path:?}"),
        }
    }

    fn arc(path: &[usize]) -> Arc<Node> {
        Arc::new(node(path))
    }

    type Provider = InMemoryTreeProvider<Node, Vec<usize>>;
    type Communicator = TreeDataCommunicator<Node, Vec<usize>, Arc<Provider>>;

    fn tree(fanout: &[usize]) -> Arc<Provider> {
        Arc::new(InMemoryTreeProvider::uniform(fanout, |n: &Node| n.path.clone(), node))
    }

    fn config(page_size: usize, padding: usize, max_preload: usize) -> WindowConfig {
        WindowConfig::new()
            .with_page_size(page_size)
            .with_padding(padding)
            .with_max_preload(max_preload)
    }

    fn session(provider: &Arc<Provider>, config: WindowConfig) -> Communicator {
        TreeDataCommunicator::new(Arc::clone(provider), |n: &Node| n.path.clone(), config).unwrap()
    }

    fn path_at(communicator: &Communicator, flat_index: usize) -> Option<Vec<usize>> {
        communicator
            .cache()
            .flat_index_context(flat_index)
            .and_then(|context| context.item().map(|item| item.path.clone()))
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    #[test]
    fn test_config_defaults_and_validation() {
        println!("== Config ==");

        let defaults = WindowConfig::default();
        assert_eq!(defaults.page_size, 50);
        assert_eq!(defaults.padding, 50);
        assert_eq!(defaults.max_preload, 1000);
        assert!(defaults.validate().is_ok());
        assert_eq!(defaults.preload_ceiling(), 1000);

        assert_eq!(WindowConfig::new().with_page_size(0).validate(), Err(ConfigError::ZeroPageSize));
        assert!(matches!(
            config(100, 0, 10).validate(),
            Err(ConfigError::PreloadBelowPage { max_preload: 10, page_size: 100 })
        ));
        assert_eq!(config(500, 0, 1000).preload_ceiling(), 5000);

        let aligned = config(50, 0, 1000);
        assert_eq!(aligned.align_down(49), 0);
        assert_eq!(aligned.align_down(149), 100);
        assert_eq!(aligned.align_up(0), 0);
        assert_eq!(aligned.align_up(101), 150);

        let provider = tree(&[10]);
        let result = TreeDataCommunicator::new(
            Arc::clone(&provider),
            |n: &Node| n.path.clone(),
            WindowConfig::new().with_page_size(0),
        );
        assert!(matches!(result, Err(WindowError::Config(ConfigError::ZeroPageSize))));

        println!("== Config == success");
    }

    // ========================================================================
    // Expand / collapse
    // ========================================================================

    #[test]
    fn test_expand_collapse_idempotent() {
        println!("== Expand Collapse Idempotent ==");

        let provider = tree(&[10, 4]);
        let mut communicator = session(&provider, config(5, 0, 100));
        let rows = communicator.fetch_rows(0, 10).unwrap();
        assert_eq!(rows.len(), 10);
        let third = Arc::clone(&rows[3].item);

        let changed = communicator.expand([Arc::clone(&third)]).unwrap();
        assert_eq!(changed.len(), 1);
        assert!(communicator.is_expanded(&third));
        assert_eq!(communicator.flat_size(), 14);
        let stats = communicator.stats();

        assert!(communicator.expand([Arc::clone(&third)]).unwrap().is_empty());
        assert_eq!(communicator.flat_size(), 14);
        assert_eq!(communicator.stats(), stats);

        let changed = communicator.collapse([Arc::clone(&third)]);
        assert_eq!(changed.len(), 1);
        assert!(!communicator.is_expanded(&third));
        assert_eq!(communicator.flat_size(), 10);

        assert!(communicator.collapse([Arc::clone(&third)]).is_empty());
        assert_eq!(communicator.flat_size(), 10);
        assert_eq!(communicator.stats().node_count, 1);

        println!("== Expand Collapse Idempotent == success");
    }

    #[test]
    fn test_expand_leaf_and_collapse_unknown_are_noops() {
        println!("== Structural Noops ==");

        let provider = tree(&[10]);
        let mut communicator = session(&provider, config(5, 0, 100));
        communicator.fetch_rows(0, 5).unwrap();

        assert!(communicator.expand([arc(&[2])]).unwrap().is_empty());
        assert!(!communicator.is_expanded(&node(&[2])));
        assert!(communicator.collapse([arc(&[3])]).is_empty());
        assert_eq!(communicator.expanded_count(), 0);
        assert_eq!(communicator.flat_size(), 10);

        println!("== Structural Noops == success");
    }

    #[test]
    fn test_expand_before_fetch_materializes_on_preload() {
        println!("== Lazy Expansion ==");

        let provider = tree(&[100, 3]);
        let mut communicator = session(&provider, config(10, 0, 1000));

        // not fetched yet: only the expansion state changes
        assert_eq!(communicator.expand([arc(&[1])]).unwrap().len(), 1);
        assert!(communicator.is_expanded_id(&vec![1]));
        assert_eq!(communicator.flat_size(), 100);

        communicator.preload_flat_range_forward(0, 10).unwrap();
        assert_eq!(communicator.flat_size(), 103);
        assert_eq!(path_at(&communicator, 1), Some(vec![1]));
        assert_eq!(path_at(&communicator, 2), Some(vec![1, 0]));
        assert_eq!(path_at(&communicator, 4), Some(vec![1, 2]));
        assert_eq!(path_at(&communicator, 5), Some(vec![2]));
        assert_eq!(provider.fetch_count(), 2);

        println!("== Lazy Expansion == success");
    }

    #[test]
    fn test_expand_and_collapse_recursively() {
        println!("== Recursive Expansion ==");

        let provider = tree(&[3, 2, 2]);
        let mut communicator = session(&provider, config(10, 0, 1000));

        let changed = communicator.expand_recursively([arc(&[0])], 1).unwrap();
        assert_eq!(changed.len(), 3);
        assert!(communicator.is_expanded_id(&vec![0, 1]));
        assert!(!communicator.is_expanded_id(&vec![0, 1, 0]));

        communicator.fetch_rows(0, 20).unwrap();
        assert_eq!(communicator.flat_size(), 3 + 2 + 2 * 2);

        let changed = communicator.collapse_recursively([arc(&[0])], 1).unwrap();
        assert_eq!(changed.len(), 3);
        assert_eq!(communicator.expanded_count(), 0);
        assert_eq!(communicator.flat_size(), 3);

        println!("== Recursive Expansion == success");
    }

    #[test]
    fn test_expand_recursively_rejected_before_fetch() {
        println!("== Recursive Expansion Ceiling ==");

        let provider = tree(&[1, 500]);
        let mut communicator = session(&provider, config(10, 0, 100));

        let result = communicator.expand_recursively([arc(&[0])], 1);
        assert!(matches!(result, Err(WindowError::PreloadLimitExceeded { requested: 500, max: 100 })));
        assert_eq!(provider.fetch_count(), 0);
        // the level that did expand is rolled back
        assert_eq!(communicator.expanded_count(), 0);
        assert_eq!(communicator.stats().node_count, 1);

        println!("== Recursive Expansion Ceiling == success");
    }

    #[test]
    fn test_expand_recursively_installs_children() {
        println!("== Recursive Expansion Install ==");

        let provider = tree(&[5, 3, 2]);
        let mut communicator = session(&provider, config(10, 0, 1000));
        let rows = communicator.fetch_rows(0, 5).unwrap();
        assert_eq!(provider.fetch_count(), 1);

        let changed = communicator.expand_recursively([Arc::clone(&rows[1].item)], 1).unwrap();
        assert_eq!(changed.len(), 4);
        // one page for the three children of [1], kept in its child node
        assert_eq!(provider.fetch_count(), 2);
        let stats = communicator.stats();
        assert_eq!(stats.loaded_items, 8);
        assert_eq!(stats.node_count, 5);
        assert_eq!(communicator.flat_size(), 5 + 3 + 3 * 2);
        let cached = communicator.cache().item_by_id(&vec![1, 2]).unwrap();
        assert!(changed.iter().any(|item| Arc::ptr_eq(item, &cached)));

        communicator.fetch_rows(0, 14).unwrap();
        assert_eq!(provider.fetch_count(), 5);
        assert_eq!(path_at(&communicator, 2), Some(vec![1, 0]));
        assert_eq!(path_at(&communicator, 3), Some(vec![1, 0, 0]));
        assert_eq!(path_at(&communicator, 13), Some(vec![4]));

        println!("== Recursive Expansion Install == success");
    }

    // Counts fail for one parent, everything else goes to the tree
    struct CountFailsFor {
        tree: Arc<Provider>,
        failing: Vec<usize>,
    }

    impl HierarchicalDataProvider<Node> for CountFailsFor {
        fn fetch_children(&self, parent: Option<&Node>, offset: usize, limit: usize) -> ProviderResult<Page<Node>> {
            self.tree.fetch_children(parent, offset, limit)
        }

        fn has_children(&self, item: &Node) -> bool {
            self.tree.has_children(item)
        }

        fn child_count(&self, parent: Option<&Node>) -> ProviderResult<usize> {
            if parent.is_some_and(|parent| parent.path == self.failing) {
                return Err(ProviderError::Count {
                    reason: "count timed out".to_string(),
                });
            }
            self.tree.child_count(parent)
        }
    }

    #[test]
    fn test_expand_batch_is_atomic() {
        println!("== Atomic Expand ==");

        let provider = CountFailsFor {
            tree: tree(&[10, 4]),
            failing: vec![3],
        };
        let mut communicator = TreeDataCommunicator::new(provider, |n: &Node| n.path.clone(), config(5, 0, 100)).unwrap();
        let items: Vec<Arc<Node>> = communicator
            .fetch_rows(0, 10)
            .unwrap()
            .into_iter()
            .map(|row| row.item)
            .collect();

        let result = communicator.expand([Arc::clone(&items[1]), Arc::clone(&items[2]), Arc::clone(&items[3])]);
        assert!(matches!(result, Err(WindowError::Provider(ProviderError::Count { .. }))));
        assert_eq!(communicator.expanded_count(), 0);
        assert_eq!(communicator.stats().node_count, 1);
        assert_eq!(communicator.flat_size(), 10);

        let changed = communicator.expand([Arc::clone(&items[1]), Arc::clone(&items[2]), Arc::clone(&items[1])]).unwrap();
        assert_eq!(changed.len(), 2);
        assert_eq!(communicator.stats().node_count, 3);
        assert_eq!(communicator.flat_size(), 18);

        println!("== Atomic Expand == success");
    }

    // ========================================================================
    // Preloading
    // ========================================================================

    #[test]
    fn test_preload_forward_page_aligned() {
        println!("== Preload Forward ==");

        let provider = tree(&[100, 3]);
        let mut communicator = session(&provider, config(10, 0, 1000));

        communicator.preload_flat_range_forward(0, 25).unwrap();
        assert_eq!(provider.fetch_count(), 3);
        assert_eq!(provider.fetched_items(), 30);
        assert_eq!(communicator.stats().loaded_items, 30);

        // covered range: no new fetches
        communicator.preload_flat_range_forward(0, 25).unwrap();
        assert_eq!(provider.fetch_count(), 3);

        let provider = tree(&[100, 3]);
        let mut communicator = session(&provider, config(10, 0, 1000));
        communicator.preload_flat_range_forward(15, 3).unwrap();
        assert_eq!(provider.fetch_count(), 1);
        let root = communicator.cache().root();
        assert!(communicator.cache().has_item(root, 10));
        assert!(communicator.cache().has_item(root, 19));
        assert!(!communicator.cache().has_item(root, 9));
        assert!(!communicator.cache().has_item(root, 20));

        println!("== Preload Forward == success");
    }

    #[test]
    fn test_preload_backward_converges_with_forward() {
        println!("== Preload Backward ==");

        let expanded = [vec![1], vec![5], vec![98]];

        let forward_provider = tree(&[100, 3]);
        let mut forward = session(&forward_provider, config(10, 0, 1000));
        let backward_provider = tree(&[100, 3]);
        let mut backward = session(&backward_provider, config(10, 0, 1000));
        for path in &expanded {
            forward.expand([arc(path)]).unwrap();
            backward.expand([arc(path)]).unwrap();
        }

        forward.preload_flat_range_forward(0, usize::MAX).unwrap();
        backward.preload_flat_range_backward(0, usize::MAX).unwrap();

        assert_eq!(forward.flat_size(), 109);
        assert_eq!(backward.flat_size(), 109);
        assert_eq!(forward.stats(), backward.stats());
        for flat_index in 0..forward.flat_size() {
            assert_eq!(path_at(&forward, flat_index), path_at(&backward, flat_index));
            assert!(path_at(&backward, flat_index).is_some(), "row {flat_index} missing");
        }
        assert_eq!(path_at(&backward, 108), Some(vec![99]));
        assert_eq!(path_at(&backward, 107), Some(vec![98, 2]));

        println!("== Preload Backward == success");
    }

    #[test]
    fn test_preload_backward_partial_range() {
        println!("== Preload Backward Partial ==");

        let provider = tree(&[100, 3]);
        let mut communicator = session(&provider, config(10, 0, 1000));
        communicator.expand([arc(&[95])]).unwrap();

        communicator.preload_flat_range_backward(90, 10).unwrap();
        // rows 90..100 plus the three children inserted after row 95
        assert_eq!(communicator.flat_size(), 103);
        assert_eq!(path_at(&communicator, 90), Some(vec![90]));
        assert_eq!(path_at(&communicator, 96), Some(vec![95, 0]));
        assert_eq!(path_at(&communicator, 102), Some(vec![99]));
        let root = communicator.cache().root();
        assert!(!communicator.cache().has_item(root, 89));

        println!("== Preload Backward Partial == success");
    }

    #[test]
    fn test_preload_backward_trims_to_final_range() {
        println!("== Preload Backward Trim ==");

        let provider = tree(&[10, 5]);
        let mut forward = session(&provider, config(1, 0, 100));
        let mut backward = session(&provider, config(1, 0, 100));
        forward.expand([arc(&[0])]).unwrap();
        backward.expand([arc(&[0])]).unwrap();

        forward.preload_flat_range_forward(0, 3).unwrap();
        backward.preload_flat_range_backward(0, 3).unwrap();

        // [0] expands under the walk, rows 0..3 end up as [0], [0, 0], [0, 1]
        assert_eq!(forward.stats().loaded_items, 3);
        assert_eq!(forward.stats(), backward.stats());
        assert_eq!(backward.flat_size(), 15);
        for flat_index in 0..backward.flat_size() {
            assert_eq!(path_at(&forward, flat_index), path_at(&backward, flat_index));
        }
        assert_eq!(path_at(&backward, 2), Some(vec![0, 1]));
        assert_eq!(path_at(&backward, 3), None);
        assert_eq!(path_at(&backward, 6), None);

        println!("== Preload Backward Trim == success");
    }

    #[test]
    fn test_short_pages_stop_gracefully() {
        println!("== Short Pages ==");

        let provider = tree(&[100]);
        provider.set_item_limit(Some(30));
        let mut communicator = session(&provider, config(10, 0, 1000));

        communicator.preload_flat_range_forward(0, 100).unwrap();
        assert_eq!(communicator.stats().loaded_items, 30);
        assert_eq!(communicator.flat_size(), 100);

        let provider = tree(&[100]);
        provider.set_item_limit(Some(30));
        let mut communicator = session(&provider, config(10, 0, 1000));
        communicator.preload_flat_range_backward(0, 100).unwrap();
        assert_eq!(communicator.stats().loaded_items, 0);
        assert_eq!(provider.fetch_count(), 1);

        println!("== Short Pages == success");
    }

    #[test]
    fn test_provider_failure_propagates() {
        println!("== Provider Failure ==");

        let provider = tree(&[20]);
        let mut communicator = session(&provider, config(10, 0, 1000));
        provider.fail_next_fetch();

        let result = communicator.preload_flat_range_forward(0, 5);
        assert!(matches!(result, Err(WindowError::Provider(_))));
        assert_eq!(communicator.stats().loaded_items, 0);

        communicator.preload_flat_range_forward(0, 5).unwrap();
        assert_eq!(communicator.stats().loaded_items, 10);

        println!("== Provider Failure == success");
    }

    // ========================================================================
    // Viewport
    // ========================================================================

    #[test]
    fn test_viewport_ceiling_rejected_before_fetch() {
        println!("== Viewport Ceiling ==");

        let provider = tree(&[10_000]);
        let mut communicator = session(&provider, config(10, 10, 100));

        let result = communicator.set_viewport_range(0, 500);
        match result {
            Err(WindowError::PreloadLimitExceeded { requested, max }) => {
                assert_eq!(requested, 510);
                assert_eq!(max, 100);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(matches!(
            communicator.fetch_rows(0, 101),
            Err(WindowError::PreloadLimitExceeded { .. })
        ));
        assert_eq!(provider.fetch_count(), 0);
        assert_eq!(communicator.stats().loaded_items, 0);

        println!("== Viewport Ceiling == success");
    }

    #[test]
    fn test_viewport_evicts_outside_window() {
        println!("== Viewport Eviction ==");

        let provider = tree(&[1000, 4]);
        let mut communicator = session(&provider, config(10, 10, 100));
        communicator.expand([arc(&[5])]).unwrap();

        let window = communicator.set_viewport_range(0, 20).unwrap();
        assert_eq!(window, 0..30);
        assert_eq!(communicator.viewport(), 0..30);
        assert_eq!(communicator.flat_size(), 1004);
        assert_eq!(communicator.stats().loaded_items, 30);

        let window = communicator.set_viewport_range(500, 20).unwrap();
        assert_eq!(window, 490..530);
        let root = communicator.cache().root();
        // the expanded parent outlives the window it left
        assert!(communicator.cache().has_item(root, 5));
        assert!(!communicator.cache().has_item(root, 4));
        assert_eq!(communicator.stats().loaded_items, 41);
        assert_eq!(communicator.flat_size(), 1004);
        assert_eq!(path_at(&communicator, 490), Some(vec![486]));

        println!("== Viewport Eviction == success");
    }

    #[test]
    fn test_viewport_clipped_to_flat_size() {
        println!("== Viewport Clip ==");

        let provider = tree(&[25]);
        let mut communicator = session(&provider, config(10, 10, 100));
        let window = communicator.set_viewport_range(15, 20).unwrap();
        assert_eq!(window, 0..25);
        assert_eq!(communicator.stats().loaded_items, 25);

        println!("== Viewport Clip == success");
    }

    #[test]
    fn test_fetch_rows_flags() {
        println!("== Fetch Rows ==");

        let provider = tree(&[10, 2]);
        let mut communicator = session(&provider, config(5, 0, 100));
        communicator.expand([arc(&[0])]).unwrap();

        let rows = communicator.fetch_rows(0, 5).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].item.path, vec![0]);
        assert!(rows[0].expanded);
        assert!(rows[0].has_children);
        assert_eq!(rows[0].depth, 0);

        assert_eq!(rows[1].item.path, vec![0, 0]);
        assert_eq!(rows[1].depth, 1);
        assert!(!rows[1].expanded);
        assert!(!rows[1].has_children);

        assert_eq!(rows[3].item.path, vec![1]);
        assert_eq!(rows[3].flat_index, 3);
        assert!(!rows[3].expanded);
        assert!(rows[3].has_children);

        assert_eq!(communicator.flat_index_of(&node(&[0, 1])), Some(2));
        assert_eq!(communicator.flat_index_of(&node(&[7])), None);

        // past the end
        let rows = communicator.fetch_rows(10, 10).unwrap();
        assert_eq!(rows.len(), 2);

        println!("== Fetch Rows == success");
    }

    // ========================================================================
    // Paths
    // ========================================================================

    #[test]
    fn test_resolve_index_path() {
        println!("== Resolve Index Path ==");

        let provider = tree(&[10, 5, 3]);
        let mut communicator = session(&provider, config(5, 0, 100));

        let resolved = communicator.resolve_index_path(&[2, 3, 1]).unwrap();
        assert_eq!(resolved.flat_index, Some(8));
        let expanded: Vec<Vec<usize>> = resolved.expanded.iter().map(|item| item.path.clone()).collect();
        assert_eq!(expanded, vec![vec![2], vec![2, 3]]);
        assert_eq!(path_at(&communicator, 8), Some(vec![2, 3, 1]));
        assert!(communicator.is_expanded_id(&vec![2]));
        assert!(communicator.is_expanded_id(&vec![2, 3]));
        assert!(!communicator.is_expanded_id(&vec![2, 3, 1]));
        assert_eq!(communicator.flat_size(), 10 + 5 + 3);

        // already expanded ancestors are reused
        let resolved = communicator.resolve_index_path(&[2, 3, 1]).unwrap();
        assert_eq!(resolved.flat_index, Some(8));
        assert!(resolved.expanded.is_empty());
        assert_eq!(communicator.resolve_index_path(&[2]).unwrap().flat_index, Some(2));

        println!("== Resolve Index Path == success");
    }

    #[test]
    fn test_resolve_index_path_negative_and_clamped() {
        println!("== Resolve Index Path Edges ==");

        let provider = tree(&[10, 5]);
        let mut communicator = session(&provider, config(5, 0, 100));
        assert_eq!(communicator.resolve_index_path(&[-1]).unwrap().flat_index, Some(9));
        assert_eq!(communicator.resolve_index_path(&[50]).unwrap().flat_index, Some(9));
        assert_eq!(communicator.resolve_index_path(&[-100]).unwrap().flat_index, Some(0));
        assert_eq!(communicator.resolve_index_path(&[-1, -1]).unwrap().flat_index, Some(14));
        assert_eq!(path_at(&communicator, 14), Some(vec![9, 4]));

        // leaf ancestor: stop at the leaf
        let provider = tree(&[10]);
        let mut communicator = session(&provider, config(5, 0, 100));
        assert_eq!(communicator.resolve_index_path(&[3, 2]).unwrap().flat_index, Some(3));
        assert_eq!(communicator.expanded_count(), 0);

        // empty tree
        let empty: Arc<Provider> = Arc::new(InMemoryTreeProvider::new(|n: &Node| n.path.clone()));
        let mut communicator = session(&empty, config(5, 0, 100));
        assert_eq!(communicator.resolve_index_path(&[0]).unwrap().flat_index, None);
        assert_eq!(communicator.resolve_index_path(&[]).unwrap().flat_index, None);

        println!("== Resolve Index Path Edges == success");
    }

    // ========================================================================
    // Refresh, reset, prune
    // ========================================================================

    #[test]
    fn test_refresh_item() {
        println!("== Refresh Item ==");

        let provider = tree(&[5, 2]);
        let mut communicator = session(&provider, config(5, 0, 100));
        communicator.fetch_rows(0, 5).unwrap();
        let before = communicator.cache().item_context(&node(&[1])).cloned().unwrap();

        let renamed = Node {
            path: vec![1],
            label: "renamed".to_string(),
        };
        assert!(provider.replace(renamed.clone()));
        assert!(communicator.refresh_item(renamed.clone(), false).unwrap());
        assert_eq!(communicator.cache().item_context(&node(&[1])).cloned().unwrap(), before);
        assert_eq!(communicator.fetch_rows(1, 1).unwrap()[0].item.label, "renamed");
        assert!(!communicator.refresh_item(node(&[42]), false).unwrap());

        // children reloaded from the provider
        communicator.expand([arc(&[1])]).unwrap();
        assert_eq!(communicator.flat_size(), 7);
        assert!(provider.push_child(Some(&vec![1]), node(&[1, 2])));
        assert!(communicator.refresh_item(renamed, true).unwrap());
        assert_eq!(communicator.flat_size(), 8);
        assert!(communicator.cache().has_cache(before.node(), before.index()));

        println!("== Refresh Item == success");
    }

    #[test]
    fn test_reset_keeps_expansion_state() {
        println!("== Reset ==");

        let provider = tree(&[5, 2]);
        let mut communicator = session(&provider, config(5, 0, 100));
        let rows = communicator.fetch_rows(0, 5).unwrap();
        communicator.expand([Arc::clone(&rows[2].item)]).unwrap();
        assert_eq!(communicator.flat_size(), 7);

        assert!(provider.push_child(None, node(&[5])));
        communicator.reset().unwrap();
        assert_eq!(communicator.flat_size(), 6);
        assert_eq!(communicator.stats().loaded_items, 0);
        assert_eq!(communicator.viewport(), 0..0);
        assert!(communicator.is_expanded(&node(&[2])));

        communicator.fetch_rows(0, 10).unwrap();
        assert_eq!(communicator.flat_size(), 8);
        assert_eq!(path_at(&communicator, 7), Some(vec![5]));

        println!("== Reset == success");
    }

    #[test]
    fn test_prune_removed_parents() {
        println!("== Prune Removed ==");

        let provider = tree(&[5, 2]);
        let mut communicator = session(&provider, config(5, 0, 100));
        communicator.fetch_rows(0, 5).unwrap();
        communicator.expand([arc(&[1]), arc(&[3])]).unwrap();
        assert_eq!(communicator.flat_size(), 9);
        assert_eq!(communicator.stats().node_count, 3);

        assert!(provider.remove(&vec![1]));
        assert!(!provider.contains(&node(&[1, 0])));
        assert_eq!(communicator.prune_removed(), 1);
        assert!(!communicator.is_expanded_id(&vec![1]));
        assert!(communicator.is_expanded_id(&vec![3]));
        assert_eq!(communicator.stats().node_count, 2);
        assert_eq!(communicator.flat_size(), 7);
        assert!(communicator.cache().item_context(&node(&[1, 0])).is_none());

        assert_eq!(communicator.prune_removed(), 0);

        println!("== Prune Removed == success");
    }

    // ========================================================================
    // Provider
    // ========================================================================

    struct Unreachable;

    impl HierarchicalDataProvider<Node> for Unreachable {
        fn fetch_children(&self, _parent: Option<&Node>, offset: usize, limit: usize) -> ProviderResult<Page<Node>> {
            Err(ProviderError::Fetch {
                offset,
                limit,
                reason: "connection refused".to_string(),
            })
        }

        fn has_children(&self, _item: &Node) -> bool {
            false
        }

        fn child_count(&self, _parent: Option<&Node>) -> ProviderResult<usize> {
            Err(ProviderError::Count {
                reason: "connection refused".to_string(),
            })
        }
    }

    #[test]
    fn test_unreachable_provider_fails_construction() {
        println!("== Unreachable Provider ==");

        let result = TreeDataCommunicator::new(Unreachable, |n: &Node| n.path.clone(), WindowConfig::default());
        match result {
            Err(WindowError::Provider(ProviderError::Count { reason })) => assert_eq!(reason, "connection refused"),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("construction should fail"),
        }

        println!("== Unreachable Provider == success");
    }

    #[test]
    fn test_in_memory_provider() {
        println!("== In Memory Provider ==");

        let provider = tree(&[4, 3]);
        assert_eq!(provider.len(), 4 + 12);
        assert_eq!(provider.children_len(None), 4);
        assert_eq!(provider.children_len(Some(&vec![2])), 3);

        let page = provider.fetch_children(Some(&node(&[2])), 1, 10).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].path, vec![2, 1]);
        assert_eq!(provider.child_count(None).unwrap(), 4);
        assert!(provider.has_children(&node(&[0])));
        assert!(!provider.has_children(&node(&[0, 0])));

        assert!(provider.insert_child(None, 0, node(&[9])));
        assert_eq!(provider.fetch_children(None, 0, 1).unwrap().items[0].path, vec![9]);
        assert!(!provider.insert_child(Some(&vec![77]), 0, node(&[77, 0])));

        assert!(provider.remove(&vec![2]));
        assert!(!provider.contains_id(&vec![2, 0]));
        assert_eq!(provider.children_len(None), 4);
        assert!(!provider.remove(&vec![2]));

        let unknown = provider.fetch_children(Some(&node(&[2])), 0, 10).unwrap();
        assert_eq!(unknown.total, 0);
        assert!(unknown.items.is_empty());

        provider.reset_stats();
        assert_eq!(provider.fetch_count(), 0);
        assert!(!provider.is_empty());

        println!("== In Memory Provider == success");
    }
}
