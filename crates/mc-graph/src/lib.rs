//! # mc-graph
//!
//! The persistence layer of Metacat: a narrow, transactional API over a
//! labeled-property-graph store.
//!
//! The store itself is behind the [`GraphStore`]/[`GraphTransaction`]
//! traits; [`MemoryGraph`] is the built-in serialized-writer backend used
//! for tests and embedded deployments. All mutations funnel through
//! [`GraphWriter`], which owns the versioning and latest-pointer
//! bookkeeping, relationship merge policy, and cascade semantics.

pub mod error;
pub mod memory;
pub mod model;
pub mod pool;
pub mod store;
pub mod writer;

pub use error::StoreError;
pub use memory::MemoryGraph;
pub use model::{
    AspectInfo, EdgeKey, EdgeRecord, NodeRecord, TimeseriesEntry, VersionedAspect,
};
pub use pool::{GraphSession, PoolStats, SessionPool};
pub use store::{GraphStore, GraphTransaction, IndexSpec, TxOptions};
pub use writer::GraphWriter;
