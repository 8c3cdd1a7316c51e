use super::NodeId;
use ahash::AHashMap;
use smallvec::SmallVec;
use std::{
    collections::BTreeMap,
    hash::Hash,
    ops::Range,
    sync::Arc,
};

pub type Gaps = SmallVec<[Range<usize>; 4]>;

// One level of the tree: the synthetic root or the children of an expanded item.
//
// Only local state lives here. Every mutation that touches the global identity
// index goes through RootCache, which keeps both sides in step.
pub struct CacheNode<T, K> {
    size: usize,
    item_id_to_item: AHashMap<K, Arc<T>>,
    // Sparse window: only fetched indices are present
    index_to_item_id: BTreeMap<usize, K>,
    // Expanded children, ordered by local index
    index_to_cache: BTreeMap<usize, NodeId>,
    parent: Option<(NodeId, usize)>,
}

impl<T, K> CacheNode<T, K>
where
    K: Hash + Eq + Clone,
{
    // Constructors

    pub(crate) fn new(size: usize, parent: Option<(NodeId, usize)>) -> Self {
        Self {
            size,
            item_id_to_item: AHashMap::new(),
            index_to_item_id: BTreeMap::new(),
            index_to_cache: BTreeMap::new(),
            parent,
        }
    }

    // Read access

    // Declared child count reported by the provider, independent of expansion
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn parent(&self) -> Option<(NodeId, usize)> {
        self.parent
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    pub fn item(&self, index: usize) -> Option<&Arc<T>> {
        self.index_to_item_id
            .get(&index)
            .and_then(|id| self.item_id_to_item.get(id))
    }

    #[inline]
    pub fn item_by_id(&self, item_id: &K) -> Option<&Arc<T>> {
        self.item_id_to_item.get(item_id)
    }

    #[inline]
    pub fn item_id(&self, index: usize) -> Option<&K> {
        self.index_to_item_id.get(&index)
    }

    #[inline]
    pub fn has_item(&self, index: usize) -> bool {
        self.index_to_item_id.contains_key(&index)
    }

    #[inline]
    pub fn has_cache(&self, index: usize) -> bool {
        self.index_to_cache.contains_key(&index)
    }

    #[inline]
    pub fn cache_at(&self, index: usize) -> Option<NodeId> {
        self.index_to_cache.get(&index).copied()
    }

    // Child nodes in ascending local index order
    pub fn caches(&self) -> impl DoubleEndedIterator<Item = (usize, NodeId)> + '_ {
        self.index_to_cache.iter().map(|(&index, &node)| (index, node))
    }

    pub fn loaded_indices(&self) -> impl DoubleEndedIterator<Item = usize> + '_ {
        self.index_to_item_id.keys().copied()
    }

    #[inline]
    pub fn loaded_count(&self) -> usize {
        self.index_to_item_id.len()
    }

    #[inline]
    pub fn cache_count(&self) -> usize {
        self.index_to_cache.len()
    }

    // Unfetched sub-ranges of `range`, clipped to the declared size
    pub fn gaps(&self, range: Range<usize>) -> Gaps {
        let end = range.end.min(self.size);
        let mut gaps = Gaps::new();
        let mut cursor = range.start;
        if cursor >= end {
            return gaps;
        }
        for index in self.index_to_item_id.range(cursor..end).map(|(&i, _)| i) {
            if index > cursor {
                gaps.push(cursor..index);
            }
            cursor = index + 1;
        }
        if cursor < end {
            gaps.push(cursor..end);
        }
        gaps
    }

    // Local mutation (RootCache only)

    // Installs an item at `index`, returning the identity it displaced if that was a different one
    pub(crate) fn put_item(&mut self, index: usize, item_id: K, item: Arc<T>) -> Option<K> {
        let displaced = match self.index_to_item_id.insert(index, item_id.clone()) {
            Some(previous) if previous != item_id => {
                self.item_id_to_item.remove(&previous);
                Some(previous)
            }
            _ => None,
        };
        self.item_id_to_item.insert(item_id, item);
        displaced
    }

    pub(crate) fn take_item(&mut self, index: usize) -> Option<K> {
        let item_id = self.index_to_item_id.remove(&index)?;
        self.item_id_to_item.remove(&item_id);
        Some(item_id)
    }

    // Swaps the value for a known identity, placement untouched
    pub(crate) fn replace_item(&mut self, item_id: &K, item: Arc<T>) -> bool {
        match self.item_id_to_item.get_mut(item_id) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    pub(crate) fn attach_cache(&mut self, index: usize, node: NodeId) -> Option<NodeId> {
        self.index_to_cache.insert(index, node)
    }

    pub(crate) fn detach_cache(&mut self, index: usize) -> Option<NodeId> {
        self.index_to_cache.remove(&index)
    }

    pub(crate) fn drain_caches(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.index_to_cache).into_values().collect()
    }

    pub(crate) fn drain_items(&mut self) -> Vec<(usize, K)> {
        self.item_id_to_item.clear();
        std::mem::take(&mut self.index_to_item_id).into_iter().collect()
    }

    // Shrinking drops everything at or past the new size and hands it back for teardown
    pub(crate) fn set_size(&mut self, size: usize) -> (Vec<(usize, K)>, Vec<NodeId>) {
        self.size = size;
        let dropped_ids = self.index_to_item_id.split_off(&size);
        for item_id in dropped_ids.values() {
            self.item_id_to_item.remove(item_id);
        }
        let dropped_caches = self.index_to_cache.split_off(&size);
        (
            dropped_ids.into_iter().collect(),
            dropped_caches.into_values().collect(),
        )
    }
}
