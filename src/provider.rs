use super::{
    cache::IdentityFn,
    errors::ProviderError,
    result::ProviderResult,
};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::{
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

// One fetched window of a parent's children plus the parent's total child count
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: usize) -> Self {
        Self { items, total }
    }

    pub fn empty(total: usize) -> Self {
        Self {
            items: Vec::new(),
            total,
        }
    }
}

/// Backing source of a hierarchy.
///
/// Calls are synchronous and expected to be idempotent for identical
/// arguments. A provider backed by I/O hides its asynchrony behind these
/// blocking calls.
pub trait HierarchicalDataProvider<T> {
    // Children of `parent` (roots when None) in [offset, offset + limit)
    fn fetch_children(&self, parent: Option<&T>, offset: usize, limit: usize) -> ProviderResult<Page<T>>;

    fn has_children(&self, item: &T) -> bool;

    fn child_count(&self, parent: Option<&T>) -> ProviderResult<usize> {
        self.fetch_children(parent, 0, 0).map(|page| page.total)
    }

    // Whether the item still exists in the backing data
    fn contains(&self, _item: &T) -> bool {
        true
    }
}

impl<T, P> HierarchicalDataProvider<T> for Arc<P>
where
    P: HierarchicalDataProvider<T> + ?Sized,
{
    fn fetch_children(&self, parent: Option<&T>, offset: usize, limit: usize) -> ProviderResult<Page<T>> {
        (**self).fetch_children(parent, offset, limit)
    }

    fn has_children(&self, item: &T) -> bool {
        (**self).has_children(item)
    }

    fn child_count(&self, parent: Option<&T>) -> ProviderResult<usize> {
        (**self).child_count(parent)
    }

    fn contains(&self, item: &T) -> bool {
        (**self).contains(item)
    }
}

// ============================================================================
// InMemoryTreeProvider
// ============================================================================

struct TreeData<T, K> {
    roots: Vec<T>,
    children: AHashMap<K, Vec<T>>,
    // None for roots
    parent_of: AHashMap<K, Option<K>>,
}

// In-memory hierarchy shared between sessions.
// Keeps fetch statistics and a couple of failure knobs for exercising callers.
pub struct InMemoryTreeProvider<T, K> {
    data: RwLock<TreeData<T, K>>,
    identity: IdentityFn<T, K>,
    fetch_count: AtomicUsize,
    fetched_items: AtomicUsize,
    // Items at or past this offset are never returned, the total still counts them
    item_limit: RwLock<Option<usize>>,
    fail_next_fetch: AtomicBool,
}

impl<T, K> InMemoryTreeProvider<T, K>
where
    T: Clone,
    K: Hash + Eq + Clone,
{
    // Constructors

    pub fn new<F>(identity: F) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self {
            data: RwLock::new(TreeData {
                roots: Vec::new(),
                children: AHashMap::new(),
                parent_of: AHashMap::new(),
            }),
            identity: Arc::new(identity),
            fetch_count: AtomicUsize::new(0),
            fetched_items: AtomicUsize::new(0),
            item_limit: RwLock::new(None),
            fail_next_fetch: AtomicBool::new(false),
        }
    }

    // Every node on level `i` gets `fanout[i]` children; `make` receives the local index path
    pub fn uniform<F, M>(fanout: &[usize], identity: F, make: M) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
        M: Fn(&[usize]) -> T,
    {
        let provider = Self::new(identity);
        let mut path = Vec::with_capacity(fanout.len());
        provider.populate_uniform(None, fanout, &mut path, &make);
        provider
    }

    fn populate_uniform<M>(&self, parent: Option<&K>, fanout: &[usize], path: &mut Vec<usize>, make: &M)
    where
        M: Fn(&[usize]) -> T,
    {
        let Some((&count, rest)) = fanout.split_first() else {
            return;
        };
        for index in 0..count {
            path.push(index);
            let item = make(path);
            let item_id = (self.identity)(&item);
            self.push_child(parent, item);
            self.populate_uniform(Some(&item_id), rest, path, make);
            path.pop();
        }
    }

    // Mutation

    pub fn push_child(&self, parent: Option<&K>, item: T) -> bool {
        let len = self.children_len(parent);
        self.insert_child(parent, len, item)
    }

    // Inserts at `position` (clamped) under `parent`; false if the parent is unknown
    pub fn insert_child(&self, parent: Option<&K>, position: usize, item: T) -> bool {
        let item_id = (self.identity)(&item);
        let mut data = self.data.write();
        let siblings = match parent {
            None => &mut data.roots,
            Some(parent_id) => {
                if !data.parent_of.contains_key(parent_id) {
                    return false;
                }
                data.children.entry(parent_id.clone()).or_default()
            }
        };
        let position = position.min(siblings.len());
        siblings.insert(position, item);
        data.parent_of.insert(item_id, parent.cloned());
        true
    }

    // Removes the item and its whole subtree
    pub fn remove(&self, item_id: &K) -> bool {
        let mut data = self.data.write();
        let Some(parent) = data.parent_of.get(item_id).cloned() else {
            return false;
        };
        let identity = &self.identity;
        let siblings = match parent {
            None => Some(&mut data.roots),
            Some(parent_id) => data.children.get_mut(&parent_id),
        };
        if let Some(siblings) = siblings {
            siblings.retain(|sibling| identity(sibling) != *item_id);
        }
        let mut pending = vec![item_id.clone()];
        while let Some(current) = pending.pop() {
            data.parent_of.remove(&current);
            if let Some(children) = data.children.remove(&current) {
                pending.extend(children.iter().map(|child| identity(child)));
            }
        }
        true
    }

    // Swaps the stored value of an existing identity
    pub fn replace(&self, item: T) -> bool {
        let item_id = (self.identity)(&item);
        let mut data = self.data.write();
        let Some(parent) = data.parent_of.get(&item_id).cloned() else {
            return false;
        };
        let identity = &self.identity;
        let siblings = match parent {
            None => Some(&mut data.roots),
            Some(parent_id) => data.children.get_mut(&parent_id),
        };
        let Some(slot) = siblings.and_then(|s| s.iter_mut().find(|sibling| identity(sibling) == item_id)) else {
            return false;
        };
        *slot = item;
        true
    }

    // Reads

    pub fn contains_id(&self, item_id: &K) -> bool {
        self.data.read().parent_of.contains_key(item_id)
    }

    pub fn children_len(&self, parent: Option<&K>) -> usize {
        let data = self.data.read();
        match parent {
            None => data.roots.len(),
            Some(parent_id) => data.children.get(parent_id).map_or(0, Vec::len),
        }
    }

    pub fn len(&self) -> usize {
        self.data.read().parent_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Statistics and failure knobs

    #[inline]
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn fetched_items(&self) -> usize {
        self.fetched_items.load(Ordering::Relaxed)
    }

    pub fn reset_stats(&self) {
        self.fetch_count.store(0, Ordering::Relaxed);
        self.fetched_items.store(0, Ordering::Relaxed);
    }

    pub fn set_item_limit(&self, limit: Option<usize>) {
        *self.item_limit.write() = limit;
    }

    pub fn fail_next_fetch(&self) {
        self.fail_next_fetch.store(true, Ordering::Relaxed);
    }
}

impl<T, K> HierarchicalDataProvider<T> for InMemoryTreeProvider<T, K>
where
    T: Clone,
    K: Hash + Eq + Clone,
{
    fn fetch_children(&self, parent: Option<&T>, offset: usize, limit: usize) -> ProviderResult<Page<T>> {
        if self.fail_next_fetch.swap(false, Ordering::Relaxed) {
            return Err(ProviderError::Fetch {
                offset,
                limit,
                reason: "injected failure".to_string(),
            });
        }
        let data = self.data.read();
        let siblings = match parent {
            None => Some(&data.roots),
            Some(parent) => data.children.get(&(self.identity)(parent)),
        };
        let Some(siblings) = siblings else {
            // unknown or childless parent
            return Ok(Page::empty(0));
        };
        let total = siblings.len();
        let mut end = offset.saturating_add(limit).min(total);
        if let Some(item_limit) = *self.item_limit.read() {
            end = end.min(item_limit);
        }
        let items: Vec<T> = if offset < end {
            siblings[offset..end].to_vec()
        } else {
            Vec::new()
        };
        if limit > 0 {
            self.fetch_count.fetch_add(1, Ordering::Relaxed);
            self.fetched_items.fetch_add(items.len(), Ordering::Relaxed);
        }
        Ok(Page::new(items, total))
    }

    fn has_children(&self, item: &T) -> bool {
        self.data
            .read()
            .children
            .get(&(self.identity)(item))
            .is_some_and(|children| !children.is_empty())
    }

    fn child_count(&self, parent: Option<&T>) -> ProviderResult<usize> {
        let data = self.data.read();
        Ok(match parent {
            None => data.roots.len(),
            Some(parent) => data.children.get(&(self.identity)(parent)).map_or(0, Vec::len),
        })
    }

    fn contains(&self, item: &T) -> bool {
        self.contains_id(&(self.identity)(item))
    }
}
