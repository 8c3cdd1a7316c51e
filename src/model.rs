use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub node_count: usize,
    pub loaded_items: usize,
    // Sum of declared sizes over all live nodes
    pub declared_items: usize,
    pub flat_size: usize,
    pub max_depth: usize,
}

impl CacheStats {
    // Nodes other than the root, one per materialized expanded item
    #[inline]
    pub fn expanded_nodes(&self) -> usize {
        self.node_count.saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.loaded_items == 0 && self.node_count <= 1
    }

    // Share of declared slots that currently hold an item
    pub fn load_ratio(&self) -> f64 {
        if self.declared_items == 0 {
            return 1.0;
        }
        self.loaded_items as f64 / self.declared_items as f64
    }
}

// One rendered row of the flattened tree, as handed to the UI binding
#[derive(Debug, Clone)]
pub struct TreeRow<T> {
    pub item: Arc<T>,
    pub flat_index: usize,
    pub depth: usize,
    pub expanded: bool,
    pub has_children: bool,
}

// Outcome of walking an index path: where it ended and which ancestors it expanded
#[derive(Debug, Clone)]
pub struct ResolvedPath<T> {
    pub flat_index: Option<usize>,
    pub expanded: Vec<Arc<T>>,
}
