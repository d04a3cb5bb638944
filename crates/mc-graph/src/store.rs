//! The store contract: a labeled-property-graph backend supporting node
//! MERGE by key, relationship MERGE by endpoints + type + discriminators,
//! composite unique constraints, and ACID transactions per session.

use std::time::Instant;

use async_trait::async_trait;
use mc_core::{ParamMap, Urn};

use crate::error::StoreError;
use crate::model::{
    AspectInfo, EdgeKey, EdgeRecord, NodeRecord, TimeseriesEntry, VersionedAspect,
};

/// Per-transaction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxOptions {
    /// Absolute deadline; the backend aborts in-flight work past it.
    pub deadline: Option<Instant>,
}

impl TxOptions {
    pub fn with_deadline(deadline: Instant) -> Self {
        Self { deadline: Some(deadline) }
    }
}

/// Indexes the writer requires at bootstrap: a unique `(label, urn)`
/// constraint per entity label, the `(owner, aspect, version)` uniqueness
/// backing versioned writes, and a discriminator index per edge type.
#[derive(Debug, Clone, Default)]
pub struct IndexSpec {
    pub entity_labels: Vec<String>,
    pub edge_types: Vec<String>,
}

/// A graph-store backend. Implementations must be safe to share across
/// request executors; all mutable state lives behind the transactions.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Open a transaction. All writes within it commit atomically or not
    /// at all.
    async fn begin(&self, options: TxOptions) -> Result<Box<dyn GraphTransaction>, StoreError>;

    /// Create the required constraints and indexes. Idempotent.
    async fn ensure_indexes(&self, spec: &IndexSpec) -> Result<(), StoreError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;
}

impl std::fmt::Debug for dyn GraphTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn GraphTransaction")
    }
}

/// One open transaction. Dropping an uncommitted transaction rolls it
/// back; partial application is never visible to other sessions.
#[async_trait]
pub trait GraphTransaction: Send {
    /// MERGE a node by URN. Sets all params on create; on match, non-key
    /// params are updated last-writer-wins. Returns true when the node was
    /// created.
    async fn merge_node(
        &mut self,
        label: &str,
        urn: &Urn,
        params: &ParamMap,
    ) -> Result<bool, StoreError>;

    async fn node(&mut self, urn: &Urn) -> Result<Option<NodeRecord>, StoreError>;

    async fn max_aspect_version(
        &mut self,
        urn: &Urn,
        aspect: &str,
    ) -> Result<Option<u64>, StoreError>;

    /// Insert one versioned aspect record. Fails with
    /// [`StoreError::Conflict`] when `(owner, name, version)` already
    /// exists.
    async fn insert_versioned_aspect(&mut self, record: VersionedAspect) -> Result<(), StoreError>;

    /// Clear the `latest` flag on every record of `(urn, aspect)`.
    async fn clear_latest(&mut self, urn: &Urn, aspect: &str) -> Result<(), StoreError>;

    async fn latest_versioned_aspect(
        &mut self,
        urn: &Urn,
        aspect: &str,
    ) -> Result<Option<VersionedAspect>, StoreError>;

    async fn versioned_aspect(
        &mut self,
        urn: &Urn,
        aspect: &str,
        version: u64,
    ) -> Result<Option<VersionedAspect>, StoreError>;

    async fn append_timeseries(&mut self, entry: TimeseriesEntry) -> Result<(), StoreError>;

    /// Rows of `(urn, aspect)` with `from <= timestamp_ms <= to`, ordered
    /// by timestamp; siblings keep insertion order.
    async fn timeseries_range(
        &mut self,
        urn: &Urn,
        aspect: &str,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<TimeseriesEntry>, StoreError>;

    /// Aspects present on a node, with record counts.
    async fn aspects_of(&mut self, urn: &Urn) -> Result<Vec<AspectInfo>, StoreError>;

    /// MERGE an edge by key. Properties merge per the declared policy
    /// (last-writer-wins scalars, union arrays). Returns true when the
    /// edge was created.
    async fn merge_edge(
        &mut self,
        key: EdgeKey,
        properties: mc_core::PropertyMap,
        via: Option<String>,
    ) -> Result<bool, StoreError>;

    /// Every edge with `urn` as source or destination.
    async fn incident_edges(&mut self, urn: &Urn) -> Result<Vec<EdgeRecord>, StoreError>;

    /// Edges pointing at `urn`.
    async fn edges_to(&mut self, urn: &Urn) -> Result<Vec<EdgeRecord>, StoreError>;

    /// Remove every record (all versions or all rows) of `(urn, aspect)`.
    /// Returns the number of records removed.
    async fn delete_aspect_records(&mut self, urn: &Urn, aspect: &str)
        -> Result<usize, StoreError>;

    /// Remove every edge incident to `urn`. Returns the number removed.
    async fn delete_incident_edges(&mut self, urn: &Urn) -> Result<usize, StoreError>;

    /// Remove the node itself. Returns true when it existed.
    async fn delete_node(&mut self, urn: &Urn) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
