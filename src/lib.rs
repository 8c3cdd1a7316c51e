pub mod errors;
pub mod result;
pub mod config;
pub mod cache;
pub mod model;
pub mod provider;
pub mod communicator;

pub use cache::{
    FlatIndexContext,
    IdentityFn,
    ItemContext,
    NodeId,
    RootCache,
};

pub use communicator::TreeDataCommunicator;
pub use config::WindowConfig;
pub use model::{CacheStats, ResolvedPath, TreeRow};
pub use provider::{HierarchicalDataProvider, InMemoryTreeProvider, Page};
