use super::{
    CacheNode,
    FlatIndexContext,
    IdentityFn,
    ItemContext,
    NodeId,
};
use crate::model::CacheStats;
use ahash::AHashMap;
use smallvec::SmallVec;
use std::{
    fmt::Debug,
    hash::Hash,
    ops::Range,
    sync::Arc,
};
use tracing::{debug, trace, warn};

pub type Ancestors = SmallVec<[(NodeId, usize); 8]>;

struct Slot<T, K> {
    generation: u32,
    node: Option<CacheNode<T, K>>,
}

// RootCache - entry point of the tree
//
// Owns every node (arena), the identity function and the global
// identity -> context index. Nodes refer to each other only through NodeId.
pub struct RootCache<T, K> {
    slots: Vec<Slot<T, K>>,
    free_slots: Vec<usize>,
    root: NodeId,
    item_id_to_context: AHashMap<K, ItemContext<K>>,
    identity: IdentityFn<T, K>,
}

impl<T, K> RootCache<T, K>
where
    K: Hash + Eq + Clone + Debug,
{
    // ========================================================================
    // Constructors
    // ========================================================================

    pub fn new<F>(size: usize, identity: F) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self::with_identity(size, Arc::new(identity))
    }

    pub fn with_identity(size: usize, identity: IdentityFn<T, K>) -> Self {
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(CacheNode::new(size, None)),
            }],
            free_slots: Vec::new(),
            root: NodeId::ROOT,
            item_id_to_context: AHashMap::new(),
            identity,
        }
    }

    // ========================================================================
    // Arena
    // ========================================================================

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn node(&self, node: NodeId) -> Option<&CacheNode<T, K>> {
        self.slots
            .get(node.slot())
            .filter(|slot| slot.generation == node.generation())
            .and_then(|slot| slot.node.as_ref())
    }

    #[inline]
    fn node_mut(&mut self, node: NodeId) -> Option<&mut CacheNode<T, K>> {
        self.slots
            .get_mut(node.slot())
            .filter(|slot| slot.generation == node.generation())
            .and_then(|slot| slot.node.as_mut())
    }

    #[inline]
    pub fn is_alive(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    // Live nodes including the root
    #[inline]
    pub fn node_count(&self) -> usize {
        self.slots.len() - self.free_slots.len()
    }

    // None when every u32 slot number is taken
    fn allocate(&mut self, node: CacheNode<T, K>) -> Option<NodeId> {
        if let Some(slot) = self.free_slots.pop() {
            let entry = &mut self.slots[slot];
            entry.node = Some(node);
            return NodeId::new(slot, entry.generation);
        }
        let id = NodeId::new(self.slots.len(), 0)?;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        Some(id)
    }

    fn release(&mut self, node: NodeId) {
        if node == self.root {
            return;
        }
        if let Some(entry) = self.slots.get_mut(node.slot()) {
            if entry.generation == node.generation() && entry.node.is_some() {
                entry.node = None;
                entry.generation = entry.generation.wrapping_add(1);
                self.free_slots.push(node.slot());
            }
        }
    }

    // ========================================================================
    // Identity and global index
    // ========================================================================

    #[inline]
    pub fn item_id(&self, item: &T) -> K {
        (self.identity)(item)
    }

    #[inline]
    pub fn identity(&self) -> &IdentityFn<T, K> {
        &self.identity
    }

    #[inline]
    pub fn item_context(&self, item: &T) -> Option<&ItemContext<K>> {
        self.item_id_to_context.get(&self.item_id(item))
    }

    #[inline]
    pub fn item_context_by_id(&self, item_id: &K) -> Option<&ItemContext<K>> {
        self.item_id_to_context.get(item_id)
    }

    pub fn item_by_id(&self, item_id: &K) -> Option<Arc<T>> {
        let context = self.item_id_to_context.get(item_id)?;
        self.node(context.node())?.item_by_id(item_id).cloned()
    }

    #[inline]
    pub fn context_count(&self) -> usize {
        self.item_id_to_context.len()
    }

    fn add_item_context(&mut self, item_id: K, node: NodeId, index: usize) {
        let context = ItemContext::new(item_id.clone(), node, index);
        self.item_id_to_context.insert(item_id, context);
    }

    // An identity that moved to another slot keeps its newer context
    fn remove_item_context(&mut self, item_id: &K, node: NodeId, index: usize) {
        let stale = self
            .item_id_to_context
            .get(item_id)
            .is_some_and(|context| context.points_at(node, index));
        if stale {
            self.item_id_to_context.remove(item_id);
        }
    }

    // ========================================================================
    // Node reads
    // ========================================================================

    #[inline]
    pub fn size(&self, node: NodeId) -> usize {
        self.node(node).map_or(0, CacheNode::size)
    }

    #[inline]
    pub fn get_item(&self, node: NodeId, index: usize) -> Option<Arc<T>> {
        self.node(node)?.item(index).cloned()
    }

    #[inline]
    pub fn has_item(&self, node: NodeId, index: usize) -> bool {
        self.node(node).is_some_and(|n| n.has_item(index))
    }

    #[inline]
    pub fn has_cache(&self, node: NodeId, index: usize) -> bool {
        self.node(node).is_some_and(|n| n.has_cache(index))
    }

    #[inline]
    pub fn cache_at(&self, node: NodeId, index: usize) -> Option<NodeId> {
        self.node(node)?.cache_at(index)
    }

    // (parent, index in parent) pairs from the node up to the root
    pub fn ancestors(&self, node: NodeId) -> Ancestors {
        let mut chain = Ancestors::new();
        let mut current = node;
        while let Some((parent, parent_index)) = self.node(current).and_then(CacheNode::parent) {
            chain.push((parent, parent_index));
            current = parent;
        }
        chain
    }

    #[inline]
    pub fn depth(&self, node: NodeId) -> usize {
        self.ancestors(node).len()
    }

    pub fn parent_item(&self, node: NodeId) -> Option<Arc<T>> {
        let (parent, parent_index) = self.node(node)?.parent()?;
        self.get_item(parent, parent_index)
    }

    // Rows the node and its expanded descendants occupy, recomputed on every call
    pub fn flat_size_of(&self, node: NodeId) -> usize {
        match self.node(node) {
            Some(n) => n.size() + n.caches().map(|(_, child)| self.flat_size_of(child)).sum::<usize>(),
            None => 0,
        }
    }

    #[inline]
    pub fn flat_size(&self) -> usize {
        self.flat_size_of(self.root)
    }

    // ========================================================================
    // Flat index resolution
    // ========================================================================

    pub fn flat_index_context(&self, flat_index: usize) -> Option<FlatIndexContext<T>> {
        let mut node = self.root;
        let mut remaining = flat_index;
        'descend: loop {
            let current = self.node(node)?;
            for (sub_index, sub_cache) in current.caches() {
                if remaining <= sub_index {
                    break;
                }
                let sub_flat_size = self.flat_size_of(sub_cache);
                if remaining <= sub_index + sub_flat_size {
                    // the parent row itself takes one flat slot before its children
                    remaining -= sub_index + 1;
                    node = sub_cache;
                    continue 'descend;
                }
                remaining -= sub_flat_size;
            }
            if remaining >= current.size() {
                return None;
            }
            let item = current.item(remaining).cloned();
            return Some(FlatIndexContext::new(node, remaining, item));
        }
    }

    // Flat position of a local slot among its own node's rows
    fn local_offset(&self, node: NodeId, index: usize) -> Option<usize> {
        let current = self.node(node)?;
        if index >= current.size() {
            return None;
        }
        let before: usize = current
            .caches()
            .take_while(|(sub_index, _)| *sub_index < index)
            .map(|(_, sub_cache)| self.flat_size_of(sub_cache))
            .sum();
        Some(index + before)
    }

    // Inverse of flat_index_context
    pub fn flat_index(&self, node: NodeId, index: usize) -> Option<usize> {
        let mut flat = self.local_offset(node, index)?;
        for (parent, parent_index) in self.ancestors(node) {
            flat += self.local_offset(parent, parent_index)? + 1;
        }
        Some(flat)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    // Installs a contiguous run of fetched items; returns how many were placed.
    // Items past the declared size are ignored.
    pub fn set_items<I>(&mut self, node: NodeId, start: usize, items: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let Some(size) = self.node(node).map(CacheNode::size) else {
            return 0;
        };
        let mut installed = 0;
        for (offset, item) in items.into_iter().enumerate() {
            let index = start + offset;
            if index >= size {
                debug!(index, size, "fetched item past declared size ignored");
                break;
            }
            let item_id = self.item_id(&item);
            if let Some(previous) = self.item_id_to_context.get(&item_id).cloned() {
                if !previous.points_at(node, index) {
                    self.evict_slot(previous.node(), previous.index());
                }
            }
            let displaced = match self.node_mut(node) {
                Some(current) => current.put_item(index, item_id.clone(), Arc::new(item)),
                // the target node went away with the evicted slot
                None => break,
            };
            if let Some(displaced) = displaced {
                self.remove_item_context(&displaced, node, index);
                self.remove_cache(node, index);
            }
            self.add_item_context(item_id, node, index);
            installed += 1;
        }
        trace!(?node, start, installed, "items installed");
        installed
    }

    pub fn refresh_item(&mut self, item: T) -> bool {
        let item_id = self.item_id(&item);
        let node = match self.item_id_to_context.get(&item_id) {
            Some(context) => context.node(),
            None => return false,
        };
        self.node_mut(node)
            .is_some_and(|current| current.replace_item(&item_id, Arc::new(item)))
    }

    // Child node for the item at `index`; an existing child there is torn down first
    pub fn create_cache(&mut self, node: NodeId, index: usize, size: usize) -> Option<NodeId> {
        if !self.is_alive(node) {
            return None;
        }
        self.remove_cache(node, index);
        let Some(child) = self.allocate(CacheNode::new(size, Some((node, index)))) else {
            warn!(?node, index, "node arena exhausted, cache not created");
            return None;
        };
        if let Some(parent) = self.node_mut(node) {
            parent.attach_cache(index, child);
        }
        debug!(?node, index, size, ?child, "cache created");
        Some(child)
    }

    pub fn remove_cache(&mut self, node: NodeId, index: usize) -> bool {
        let Some(child) = self.node_mut(node).and_then(|current| current.detach_cache(index)) else {
            return false;
        };
        self.destroy(child);
        debug!(?node, index, "cache removed");
        true
    }

    // Post-order: descendants leave the global index before this node does
    pub fn clear(&mut self, node: NodeId) {
        let Some(current) = self.node_mut(node) else {
            return;
        };
        for child in current.drain_caches() {
            self.destroy(child);
        }
        let items = match self.node_mut(node) {
            Some(current) => current.drain_items(),
            None => return,
        };
        for (index, item_id) in items {
            self.remove_item_context(&item_id, node, index);
        }
    }

    fn destroy(&mut self, node: NodeId) {
        self.clear(node);
        self.release(node);
    }

    fn evict_slot(&mut self, node: NodeId, index: usize) {
        self.remove_cache(node, index);
        if let Some(item_id) = self.node_mut(node).and_then(|current| current.take_item(index)) {
            self.remove_item_context(&item_id, node, index);
        }
    }

    pub fn set_size(&mut self, node: NodeId, size: usize) {
        let Some(current) = self.node_mut(node) else {
            return;
        };
        let (items, caches) = current.set_size(size);
        for child in caches {
            self.destroy(child);
        }
        for (index, item_id) in items {
            self.remove_item_context(&item_id, node, index);
        }
    }

    // Drops every item and child node, then redeclares the root size
    pub fn reset(&mut self, size: usize) {
        let root = self.root;
        self.clear(root);
        self.set_size(root, size);
    }

    // Prunes matching nodes at any depth below `node`; returns how many were removed.
    // Unmatched nodes are searched further down.
    pub fn remove_descendant_cache_if<F>(&mut self, node: NodeId, mut predicate: F) -> usize
    where
        F: FnMut(&Self, NodeId) -> bool,
    {
        self.prune_descendants(node, &mut predicate)
    }

    fn prune_descendants<F>(&mut self, node: NodeId, predicate: &mut F) -> usize
    where
        F: FnMut(&Self, NodeId) -> bool,
    {
        let children: Vec<(usize, NodeId)> = match self.node(node) {
            Some(current) => current.caches().collect(),
            None => return 0,
        };
        let mut removed = 0;
        for (index, child) in children {
            if predicate(&*self, child) {
                self.remove_cache(node, index);
                removed += 1;
            } else {
                removed += self.prune_descendants(child, predicate);
            }
        }
        removed
    }

    // ========================================================================
    // Eviction
    // ========================================================================

    // Drops fetched items whose flat index falls outside `range`.
    // Items owning a child node stay: the child needs its parent to fetch.
    pub fn evict_outside(&mut self, range: Range<usize>) -> usize {
        let mut outside = Vec::new();
        self.collect_outside(self.root, 0, &range, &mut outside);
        for &(node, index) in &outside {
            if let Some(item_id) = self.node_mut(node).and_then(|current| current.take_item(index)) {
                self.remove_item_context(&item_id, node, index);
            }
        }
        if !outside.is_empty() {
            debug!(evicted = outside.len(), ?range, "items evicted outside window");
        }
        outside.len()
    }

    // Drops one fetched item; items that own a child node stay
    pub fn evict_item(&mut self, node: NodeId, index: usize) -> bool {
        if self.has_cache(node, index) {
            return false;
        }
        match self.node_mut(node).and_then(|current| current.take_item(index)) {
            Some(item_id) => {
                self.remove_item_context(&item_id, node, index);
                true
            }
            None => false,
        }
    }

    fn collect_outside(
        &self,
        node: NodeId,
        base: usize,
        range: &Range<usize>,
        out: &mut Vec<(NodeId, usize)>,
    ) {
        let Some(current) = self.node(node) else {
            return;
        };
        let caches: Vec<(usize, NodeId, usize)> = current
            .caches()
            .map(|(index, child)| (index, child, self.flat_size_of(child)))
            .collect();

        let mut next_cache = 0;
        let mut shift = 0;
        for index in current.loaded_indices() {
            while next_cache < caches.len() && caches[next_cache].0 < index {
                shift += caches[next_cache].2;
                next_cache += 1;
            }
            let flat = base + index + shift;
            if !range.contains(&flat) && !current.has_cache(index) {
                out.push((node, index));
            }
        }

        let mut shift = 0;
        for (index, child, child_flat_size) in caches {
            let child_base = base + index + shift + 1;
            let fully_inside = child_base >= range.start && child_base + child_flat_size <= range.end;
            if !fully_inside {
                self.collect_outside(child, child_base, range, out);
            }
            shift += child_flat_size;
        }
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            node_count: 0,
            loaded_items: 0,
            declared_items: 0,
            flat_size: self.flat_size(),
            max_depth: 0,
        };
        for (slot, entry) in self.slots.iter().enumerate() {
            let Some(node) = entry.node.as_ref() else {
                continue;
            };
            stats.node_count += 1;
            stats.loaded_items += node.loaded_count();
            stats.declared_items += node.size();
            if let Some(id) = NodeId::new(slot, entry.generation) {
                stats.max_depth = stats.max_depth.max(self.depth(id));
            }
        }
        stats
    }
}
