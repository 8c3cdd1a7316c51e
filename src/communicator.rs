use super::{
    cache::{
        Gaps,
        IdentityFn,
        NodeId,
        RootCache,
    },
    config::WindowConfig,
    errors::WindowError,
    model::{
        CacheStats,
        ResolvedPath,
        TreeRow,
    },
    provider::HierarchicalDataProvider,
    result::WindowResult,
};
use ahash::AHashSet;
use std::{
    fmt::Debug,
    hash::Hash,
    ops::Range,
    sync::Arc,
};
use tracing::{debug, trace, warn};

// TreeDataCommunicator
//
// Bridges viewport requests (flat ranges) to provider fetches and keeps the
// cache tree in step with the expanded set. One instance per session.
pub struct TreeDataCommunicator<T, K, P> {
    provider: P,
    cache: RootCache<T, K>,
    expanded: AHashSet<K>,
    config: WindowConfig,
    viewport: Range<usize>,
}

impl<T, K, P> TreeDataCommunicator<T, K, P>
where
    K: Hash + Eq + Clone + Debug,
    P: HierarchicalDataProvider<T>,
{
    // ========================================================================
    // Constructors
    // ========================================================================

    pub fn new<F>(provider: P, identity: F, config: WindowConfig) -> WindowResult<Self>
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self::with_identity(provider, Arc::new(identity), config)
    }

    pub fn with_identity(provider: P, identity: IdentityFn<T, K>, config: WindowConfig) -> WindowResult<Self> {
        config.validate()?;
        let size = provider.child_count(None)?;
        debug!(size, page_size = config.page_size, padding = config.padding, "communicator created");
        Ok(Self {
            provider,
            cache: RootCache::with_identity(size, identity),
            expanded: AHashSet::new(),
            config,
            viewport: 0..0,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn cache(&self) -> &RootCache<T, K> {
        &self.cache
    }

    #[inline]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[inline]
    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    // Last window established by set_viewport_range
    #[inline]
    pub fn viewport(&self) -> Range<usize> {
        self.viewport.clone()
    }

    #[inline]
    pub fn flat_size(&self) -> usize {
        self.cache.flat_size()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn flat_index_of(&self, item: &T) -> Option<usize> {
        let context = self.cache.item_context(item)?;
        self.cache.flat_index(context.node(), context.index())
    }

    // ========================================================================
    // Expansion state
    // ========================================================================

    #[inline]
    pub fn is_expanded(&self, item: &T) -> bool {
        self.expanded.contains(&self.cache.item_id(item))
    }

    #[inline]
    pub fn is_expanded_id(&self, item_id: &K) -> bool {
        self.expanded.contains(item_id)
    }

    pub fn expanded_ids(&self) -> impl Iterator<Item = &K> + '_ {
        self.expanded.iter()
    }

    #[inline]
    pub fn expanded_count(&self) -> usize {
        self.expanded.len()
    }

    // Returns the items that went from collapsed to expanded.
    // Leaves and already expanded items are skipped. Child counts are read
    // before anything changes, so a provider failure leaves the state as it was.
    pub fn expand<I>(&mut self, items: I) -> WindowResult<Vec<Arc<T>>>
    where
        I: IntoIterator<Item = Arc<T>>,
    {
        let mut planned = Vec::new();
        for item in items {
            let item_id = self.cache.item_id(&item);
            if self.expanded.contains(&item_id) || !self.provider.has_children(&item) {
                continue;
            }
            let mut child = None;
            if let Some(context) = self.cache.item_context_by_id(&item_id) {
                let (node, index) = (context.node(), context.index());
                if !self.cache.has_cache(node, index) {
                    let size = self.provider.child_count(Some(item.as_ref()))?;
                    child = Some((node, index, size));
                }
            }
            planned.push((item, item_id, child));
        }

        let mut changed = Vec::with_capacity(planned.len());
        for (item, item_id, child) in planned {
            // same item twice in one batch
            if self.expanded.contains(&item_id) {
                continue;
            }
            if let Some((node, index, size)) = child {
                self.cache.create_cache(node, index, size);
            }
            debug!(?item_id, "item expanded");
            self.expanded.insert(item_id);
            changed.push(item);
        }
        Ok(changed)
    }

    // Returns the items that went from expanded to collapsed
    pub fn collapse<I>(&mut self, items: I) -> Vec<Arc<T>>
    where
        I: IntoIterator<Item = Arc<T>>,
    {
        let mut changed = Vec::new();
        for item in items {
            let item_id = self.cache.item_id(&item);
            if !self.expanded.remove(&item_id) {
                continue;
            }
            if let Some(context) = self.cache.item_context_by_id(&item_id).cloned() {
                self.cache.remove_cache(context.node(), context.index());
            }
            debug!(?item_id, "item collapsed");
            changed.push(item);
        }
        changed
    }

    // Expands the items and their descendants `depth` levels down (0 = the items only).
    // Children are fetched page by page and land in the child nodes created on the way.
    // On error every item this call expanded is collapsed again.
    pub fn expand_recursively<I>(&mut self, items: I, depth: usize) -> WindowResult<Vec<Arc<T>>>
    where
        I: IntoIterator<Item = Arc<T>>,
    {
        let mut changed = Vec::new();
        let mut level: Vec<Arc<T>> = items.into_iter().collect();
        for current_depth in 0..=depth {
            if let Err(error) = self.expand_level(&mut level, current_depth < depth, &mut changed) {
                warn!(expanded = changed.len(), %error, "recursive expand rolled back");
                self.collapse(changed);
                return Err(error);
            }
            if level.is_empty() {
                break;
            }
        }
        Ok(changed)
    }

    // Expands `level` and replaces it with the children of its items when `descend` is set
    fn expand_level(&mut self, level: &mut Vec<Arc<T>>, descend: bool, changed: &mut Vec<Arc<T>>) -> WindowResult<()> {
        changed.extend(self.expand(level.iter().cloned())?);
        let parents = std::mem::take(level);
        if descend {
            for item in &parents {
                if self.provider.has_children(item) {
                    level.extend(self.load_children(item, true)?);
                }
            }
        }
        Ok(())
    }

    // The whole subtree is listed before anything collapses
    pub fn collapse_recursively<I>(&mut self, items: I, depth: usize) -> WindowResult<Vec<Arc<T>>>
    where
        I: IntoIterator<Item = Arc<T>>,
    {
        let mut targets = Vec::new();
        let mut level: Vec<Arc<T>> = items.into_iter().collect();
        for current_depth in 0..=depth {
            let mut next = Vec::new();
            if current_depth < depth {
                for item in &level {
                    if self.provider.has_children(item) {
                        next.extend(self.load_children(item, false)?);
                    }
                }
            }
            targets.append(&mut level);
            if next.is_empty() {
                break;
            }
            level = next;
        }
        Ok(self.collapse(targets))
    }

    // Every child of `item`, fetched in page_size steps after the ceiling check.
    // With `install` the pages land in the item's child node when it has one.
    fn load_children(&mut self, item: &T, install: bool) -> WindowResult<Vec<Arc<T>>> {
        let total = self.provider.child_count(Some(item))?;
        self.check_preload(total)?;
        let target = if install {
            self.cache
                .item_context(item)
                .and_then(|context| self.cache.cache_at(context.node(), context.index()))
        } else {
            None
        };

        let page_size = self.config.page_size;
        let mut children = Vec::with_capacity(total);
        let mut offset = 0;
        while offset < total {
            let page = self.provider.fetch_children(Some(item), offset, page_size)?;
            let received = page.items.len();
            match target {
                Some(node) => {
                    if page.total != self.cache.size(node) {
                        self.cache.set_size(node, page.total);
                    }
                    self.cache.set_items(node, offset, page.items);
                    children.extend((offset..offset + received).filter_map(|index| self.cache.get_item(node, index)));
                }
                None => children.extend(page.items.into_iter().map(Arc::new)),
            }
            if received < page_size.min(total - offset) {
                warn!(offset, received, total, "provider returned fewer children than declared");
                break;
            }
            offset += received;
        }
        Ok(children)
    }

    // ========================================================================
    // Preloading
    // ========================================================================

    // Walks `length` rows from `start`, fetching missing pages and materializing
    // child nodes of expanded items on the way. Rows inserted by an expansion
    // count toward `length`.
    pub fn preload_flat_range_forward(&mut self, start: usize, length: usize) -> WindowResult<()> {
        let end = start.saturating_add(length);
        let mut log = PreloadLog::default();
        let mut flat_index = start;
        while flat_index < end {
            if self.ensure_row(flat_index, &mut log)?.is_none() {
                break;
            }
            flat_index += 1;
        }
        Ok(())
    }

    // Same steady state as the forward walk over the same final rows, reached
    // from the last row of the range down to `start`.
    //
    // Position is tracked as distance from the end of the list: rows after an
    // expanded item keep that distance while its children land in front of
    // them, so the walk re-visits the same distance after every expansion.
    // Rows the walk loaded before such an expansion can end up past
    // `start + length`; those are trimmed once the walk is done.
    pub fn preload_flat_range_backward(&mut self, start: usize, length: usize) -> WindowResult<()> {
        let flat_size = self.flat_size();
        if length == 0 || start >= flat_size {
            return Ok(());
        }
        let end = start.saturating_add(length).min(flat_size);
        let mut log = PreloadLog::default();
        let mut from_end = flat_size - end;
        loop {
            let flat_size = self.flat_size();
            if from_end >= flat_size {
                break;
            }
            let flat_index = flat_size - 1 - from_end;
            if flat_index < start {
                break;
            }
            match self.ensure_row(flat_index, &mut log)? {
                None => break,
                Some(true) => continue,
                Some(false) => from_end += 1,
            }
        }
        // only rows pushed past a range that ends before the list can overshoot
        if !log.created.is_empty() && start.saturating_add(length) < self.flat_size() {
            self.trim_to_range(start, length, log);
        }
        Ok(())
    }

    // Drops what a walk created or fetched that a forward walk over
    // [start, start + length) in the current flat order would not have:
    // child nodes of rows past the range, and fetched items whose page holds
    // no row of the range.
    fn trim_to_range(&mut self, start: usize, length: usize, log: PreloadLog) {
        let limit = start.saturating_add(length);
        let mut dropped_nodes = 0;
        for (node, index) in log.created {
            let outside = self.cache.flat_index(node, index).is_some_and(|flat_index| flat_index >= limit);
            if outside && self.cache.remove_cache(node, index) {
                dropped_nodes += 1;
            }
        }

        let end = limit.min(self.flat_size());
        let mut pages: AHashSet<(NodeId, usize)> = AHashSet::new();
        for flat_index in start..end {
            if let Some(context) = self.cache.flat_index_context(flat_index) {
                pages.insert((context.node(), self.config.align_down(context.index())));
            }
        }
        let mut evicted = 0;
        for (node, gap) in log.fetched {
            for index in gap {
                let in_range = pages.contains(&(node, self.config.align_down(index)));
                if !in_range && self.cache.evict_item(node, index) {
                    evicted += 1;
                }
            }
        }
        if dropped_nodes > 0 || evicted > 0 {
            debug!(start, end, dropped_nodes, evicted, "backward preload trimmed to range");
        }
    }

    // Makes the row at `flat_index` present.
    // None: out of range or the provider came back short. Some(created): whether a child node was created.
    fn ensure_row(&mut self, flat_index: usize, log: &mut PreloadLog) -> WindowResult<Option<bool>> {
        let Some(context) = self.cache.flat_index_context(flat_index) else {
            return Ok(None);
        };
        let (node, index) = (context.node(), context.index());
        let item = match context.into_item() {
            Some(item) => item,
            None => {
                let fetched = self.load_page(node, index)?;
                log.fetched.extend(fetched.into_iter().map(|gap| (node, gap)));
                match self.cache.get_item(node, index) {
                    Some(item) => item,
                    None => {
                        warn!(flat_index, ?node, index, "provider returned fewer items than declared, preload stopped");
                        return Ok(None);
                    }
                }
            }
        };
        trace!(flat_index, ?node, index, "row ready");
        let created = self.ensure_child_cache(node, index, &item)?;
        if created {
            log.created.push((node, index));
        }
        Ok(Some(created))
    }

    fn ensure_child_cache(&mut self, node: NodeId, index: usize, item: &T) -> WindowResult<bool> {
        if self.cache.has_cache(node, index) {
            return Ok(false);
        }
        if !self.expanded.contains(&self.cache.item_id(item)) || !self.provider.has_children(item) {
            return Ok(false);
        }
        let size = self.provider.child_count(Some(item))?;
        Ok(self.cache.create_cache(node, index, size).is_some())
    }

    // Fetches the unfetched parts of the page holding `index`; returns the ranges requested
    fn load_page(&mut self, node: NodeId, index: usize) -> WindowResult<Gaps> {
        let page_start = self.config.align_down(index);
        let page = page_start..page_start.saturating_add(self.config.page_size);
        let gaps = match self.cache.node(node) {
            Some(current) => current.gaps(page),
            None => return Ok(Gaps::new()),
        };
        let parent = self.cache.parent_item(node);
        if parent.is_none() && node != self.cache.root() {
            return Ok(Gaps::new());
        }
        for gap in &gaps {
            let fetched = self.provider.fetch_children(parent.as_deref(), gap.start, gap.len())?;
            debug!(
                ?node,
                offset = gap.start,
                limit = gap.len(),
                received = fetched.items.len(),
                total = fetched.total,
                "page fetched"
            );
            let declared = self.cache.size(node);
            if fetched.total != declared {
                debug!(?node, declared, total = fetched.total, "declared size changed");
                self.cache.set_size(node, fetched.total);
            }
            self.cache.set_items(node, gap.start, fetched.items);
        }
        Ok(gaps)
    }

    // ========================================================================
    // Viewport
    // ========================================================================

    // Page-aligns the request, adds padding, preloads it and evicts what falls
    // outside. Oversized requests are rejected before any fetch.
    pub fn set_viewport_range(&mut self, start: usize, length: usize) -> WindowResult<Range<usize>> {
        let padding = self.config.padding;
        let first = self.config.align_down(start.saturating_sub(padding));
        let last = self.config.align_up(start.saturating_add(length).saturating_add(padding));
        let requested = last - first;
        self.check_preload(requested)?;

        self.preload_flat_range_forward(first, requested)?;
        let flat_size = self.flat_size();
        let window = first.min(flat_size)..last.min(flat_size);
        let evicted = self.cache.evict_outside(window.clone());
        debug!(?window, evicted, "viewport updated");
        self.viewport = window.clone();
        Ok(window)
    }

    fn check_preload(&self, requested: usize) -> WindowResult<()> {
        let max = self.config.preload_ceiling();
        if requested > max {
            warn!(requested, max, "preload request rejected");
            return Err(WindowError::PreloadLimitExceeded { requested, max });
        }
        Ok(())
    }

    // Rows [start, start + length) ready for rendering
    pub fn fetch_rows(&mut self, start: usize, length: usize) -> WindowResult<Vec<TreeRow<T>>> {
        self.check_preload(length)?;
        self.preload_flat_range_forward(start, length)?;
        let end = start.saturating_add(length).min(self.flat_size());
        let mut rows = Vec::with_capacity(end.saturating_sub(start));
        for flat_index in start..end {
            let Some(context) = self.cache.flat_index_context(flat_index) else {
                break;
            };
            let Some(item) = context.item().cloned() else {
                break;
            };
            rows.push(TreeRow {
                depth: self.cache.depth(context.node()),
                expanded: self.cache.has_cache(context.node(), context.index()),
                has_children: self.provider.has_children(&item),
                flat_index,
                item,
            });
        }
        Ok(rows)
    }

    // ========================================================================
    // Paths
    // ========================================================================

    // Flat index of the row at a hierarchical path, expanding ancestors on the way.
    // Negative segments count from the end, out of range ones are clamped.
    // Stops at an empty level or a leaf ancestor and returns what was reached,
    // together with the ancestors this call expanded. On error those are
    // collapsed again.
    pub fn resolve_index_path(&mut self, path: &[isize]) -> WindowResult<ResolvedPath<T>> {
        let mut resolved = ResolvedPath {
            flat_index: None,
            expanded: Vec::new(),
        };
        if let Err(error) = self.walk_index_path(path, &mut resolved) {
            self.collapse(resolved.expanded);
            return Err(error);
        }
        Ok(resolved)
    }

    fn walk_index_path(&mut self, path: &[isize], resolved: &mut ResolvedPath<T>) -> WindowResult<()> {
        let mut node = self.cache.root();
        for (level, &segment) in path.iter().enumerate() {
            let size = self.cache.size(node);
            if size == 0 {
                break;
            }
            let index = normalize_segment(segment, size);
            if !self.cache.has_item(node, index) {
                self.load_page(node, index)?;
            }
            let Some(item) = self.cache.get_item(node, index) else {
                break;
            };
            resolved.flat_index = self.cache.flat_index(node, index);
            if level + 1 == path.len() || !self.provider.has_children(&item) {
                break;
            }
            resolved.expanded.extend(self.expand([Arc::clone(&item)])?);
            self.ensure_child_cache(node, index, &item)?;
            match self.cache.cache_at(node, index) {
                Some(child) => node = child,
                None => break,
            }
        }
        Ok(())
    }

    // ========================================================================
    // Refresh and reset
    // ========================================================================

    // Swaps in a newer value for an already fetched identity.
    // With `refresh_children` its child node is rebuilt from the provider.
    pub fn refresh_item(&mut self, item: T, refresh_children: bool) -> WindowResult<bool> {
        let item_id = self.cache.item_id(&item);
        if !self.cache.refresh_item(item) {
            return Ok(false);
        }
        if refresh_children {
            if let Some(context) = self.cache.item_context_by_id(&item_id).cloned() {
                let (node, index) = (context.node(), context.index());
                self.cache.remove_cache(node, index);
                if let Some(stored) = self.cache.get_item(node, index) {
                    self.ensure_child_cache(node, index, &stored)?;
                }
            }
        }
        debug!(?item_id, refresh_children, "item refreshed");
        Ok(true)
    }

    // Data source reset: the tree is rebuilt lazily, expansion state survives
    pub fn reset(&mut self) -> WindowResult<()> {
        let size = self.provider.child_count(None)?;
        self.cache.reset(size);
        self.viewport = 0..0;
        debug!(size, "tree reset");
        Ok(())
    }

    // Drops child nodes whose parent item left the backing data or lost its children
    pub fn prune_removed(&mut self) -> usize {
        let provider = &self.provider;
        let mut collapsed: Vec<K> = Vec::new();
        let root = self.cache.root();
        let removed = self.cache.remove_descendant_cache_if(root, |cache, node| {
            let parent = cache.parent_item(node);
            let gone = parent
                .as_deref()
                .is_none_or(|parent| !provider.contains(parent) || !provider.has_children(parent));
            if gone {
                if let Some(parent) = parent {
                    collapsed.push(cache.item_id(&parent));
                }
            }
            gone
        });
        for item_id in &collapsed {
            self.expanded.remove(item_id);
        }
        if removed > 0 {
            debug!(removed, "stale caches pruned");
        }
        removed
    }
}

// What one preload call fetched and which child nodes it created
#[derive(Default)]
struct PreloadLog {
    fetched: Vec<(NodeId, Range<usize>)>,
    created: Vec<(NodeId, usize)>,
}

fn normalize_segment(segment: isize, size: usize) -> usize {
    let size = size as isize;
    let index = if segment < 0 { size + segment } else { segment };
    index.clamp(0, size - 1) as usize
}
