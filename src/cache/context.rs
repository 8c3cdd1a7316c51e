use super::NodeId;
use std::sync::Arc;

/// Where a fetched item lives: the node holding it and its local index there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemContext<K> {
    item_id: K,
    node: NodeId,
    index: usize,
}

impl<K> ItemContext<K> {
    pub(crate) fn new(item_id: K, node: NodeId, index: usize) -> Self {
        Self { item_id, node, index }
    }

    #[inline]
    pub fn item_id(&self) -> &K {
        &self.item_id
    }

    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub(crate) fn points_at(&self, node: NodeId, index: usize) -> bool {
        self.node == node && self.index == index
    }
}

/// Result of resolving a flat index: the node and local index it maps to.
///
/// The slot is always within the node's declared size, but the item may not
/// have been fetched yet, in which case `item()` is `None`.
#[derive(Debug, Clone)]
pub struct FlatIndexContext<T> {
    node: NodeId,
    index: usize,
    item: Option<Arc<T>>,
}

impl<T> FlatIndexContext<T> {
    pub(crate) fn new(node: NodeId, index: usize, item: Option<Arc<T>>) -> Self {
        Self { node, index, item }
    }

    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn item(&self) -> Option<&Arc<T>> {
        self.item.as_ref()
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.item.is_some()
    }

    pub fn into_item(self) -> Option<Arc<T>> {
        self.item
    }
}
