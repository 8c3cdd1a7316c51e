pub mod context;
pub mod node;
pub mod root;

use std::sync::Arc;

pub use context::{FlatIndexContext, ItemContext};
pub use node::{CacheNode, Gaps};
pub use root::RootCache;

pub type IdentityFn<T, K> = Arc<dyn Fn(&T) -> K + Send + Sync>;

// Handle of a cache node inside the RootCache arena.
// The generation changes every time a slot is freed, so a handle kept past
// teardown never resolves to the node that later reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    slot: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) const ROOT: NodeId = NodeId { slot: 0, generation: 0 };

    // None once the arena outgrows u32 slot numbers
    #[inline]
    pub(crate) fn new(slot: usize, generation: u32) -> Option<Self> {
        let slot = u32::try_from(slot).ok()?;
        Some(Self { slot, generation })
    }

    #[inline]
    pub(crate) fn slot(&self) -> usize {
        self.slot as usize
    }

    #[inline]
    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }
}
