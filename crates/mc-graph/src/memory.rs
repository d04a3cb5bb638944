//! In-memory graph backend.
//!
//! A serialized-writer store: each transaction takes the single data lock
//! for its whole lifetime, which gives serializable isolation for free.
//! A snapshot taken at begin is restored on rollback or drop, so an
//! uncommitted transaction is never visible. Good for tests and embedded
//! deployments; a server-grade backend implements the same traits against
//! a real graph database.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use mc_core::{ParamMap, PropertyMap, Urn};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StoreError;
use crate::model::{
    merge_properties, AspectInfo, EdgeKey, EdgeRecord, NodeRecord, TimeseriesEntry,
    VersionedAspect,
};
use crate::store::{GraphStore, GraphTransaction, IndexSpec, TxOptions};

type AspectKey = (Urn, String);

#[derive(Debug, Default, Clone)]
struct GraphData {
    nodes: BTreeMap<Urn, NodeRecord>,
    versioned: BTreeMap<AspectKey, Vec<VersionedAspect>>,
    timeseries: BTreeMap<AspectKey, Vec<TimeseriesEntry>>,
    edges: BTreeMap<EdgeKey, EdgeRecord>,
}

/// The built-in in-memory backend.
#[derive(Default)]
pub struct MemoryGraph {
    data: Arc<Mutex<GraphData>>,
    indexes: parking_lot::RwLock<IndexSpec>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The index spec recorded by the last `ensure_indexes` call.
    pub fn index_spec(&self) -> IndexSpec {
        self.indexes.read().clone()
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn begin(&self, options: TxOptions) -> Result<Box<dyn GraphTransaction>, StoreError> {
        let lock = Arc::clone(&self.data);
        let guard = match options.deadline {
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    return Err(StoreError::DeadlineExceeded);
                }
                tokio::time::timeout(deadline - now, lock.lock_owned())
                    .await
                    .map_err(|_| {
                        StoreError::unavailable("timed out waiting for the store lock", true)
                    })?
            }
            None => lock.lock_owned().await,
        };
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            snapshot: Some(snapshot),
            deadline: options.deadline,
        }))
    }

    async fn ensure_indexes(&self, spec: &IndexSpec) -> Result<(), StoreError> {
        // Uniqueness is structural here (map keys); just record the spec.
        *self.indexes.write() = spec.clone();
        tracing::debug!(
            labels = spec.entity_labels.len(),
            edge_types = spec.edge_types.len(),
            "memory graph indexes ensured"
        );
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<GraphData>,
    /// Present while the transaction is open; restored on rollback/drop.
    snapshot: Option<GraphData>,
    deadline: Option<Instant>,
}

impl MemoryTransaction {
    fn check_deadline(&self) -> Result<(), StoreError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(StoreError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl GraphTransaction for MemoryTransaction {
    async fn merge_node(
        &mut self,
        label: &str,
        urn: &Urn,
        params: &ParamMap,
    ) -> Result<bool, StoreError> {
        self.check_deadline()?;
        let now = Utc::now();
        match self.guard.nodes.get_mut(urn) {
            Some(node) => {
                if node.label != label {
                    return Err(StoreError::ConstraintViolation(format!(
                        "node {urn} already exists with label {existing}, not {label}",
                        existing = node.label
                    )));
                }
                for (key, value) in params {
                    node.params.insert(key.clone(), value.clone());
                }
                node.updated_at = now;
                Ok(false)
            }
            None => {
                self.guard.nodes.insert(
                    urn.clone(),
                    NodeRecord {
                        urn: urn.clone(),
                        label: label.to_string(),
                        params: params.clone(),
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn node(&mut self, urn: &Urn) -> Result<Option<NodeRecord>, StoreError> {
        self.check_deadline()?;
        Ok(self.guard.nodes.get(urn).cloned())
    }

    async fn max_aspect_version(
        &mut self,
        urn: &Urn,
        aspect: &str,
    ) -> Result<Option<u64>, StoreError> {
        self.check_deadline()?;
        let key = (urn.clone(), aspect.to_string());
        Ok(self
            .guard
            .versioned
            .get(&key)
            .and_then(|records| records.iter().map(|r| r.version).max()))
    }

    async fn insert_versioned_aspect(&mut self, record: VersionedAspect) -> Result<(), StoreError> {
        self.check_deadline()?;
        let key = (record.owner.clone(), record.name.clone());
        let records = self.guard.versioned.entry(key).or_default();
        if records.iter().any(|r| r.version == record.version) {
            return Err(StoreError::Conflict(format!(
                "aspect record ({owner}, {name}, {version}) already exists",
                owner = record.owner,
                name = record.name,
                version = record.version
            )));
        }
        if record.latest && records.iter().any(|r| r.latest) {
            return Err(StoreError::ConstraintViolation(format!(
                "({owner}, {name}) already has a latest record",
                owner = record.owner,
                name = record.name
            )));
        }
        records.push(record);
        records.sort_unstable_by_key(|r| r.version);
        Ok(())
    }

    async fn clear_latest(&mut self, urn: &Urn, aspect: &str) -> Result<(), StoreError> {
        self.check_deadline()?;
        let key = (urn.clone(), aspect.to_string());
        if let Some(records) = self.guard.versioned.get_mut(&key) {
            for record in records.iter_mut() {
                record.latest = false;
            }
        }
        Ok(())
    }

    async fn latest_versioned_aspect(
        &mut self,
        urn: &Urn,
        aspect: &str,
    ) -> Result<Option<VersionedAspect>, StoreError> {
        self.check_deadline()?;
        let key = (urn.clone(), aspect.to_string());
        Ok(self
            .guard
            .versioned
            .get(&key)
            .and_then(|records| records.iter().find(|r| r.latest).cloned()))
    }

    async fn versioned_aspect(
        &mut self,
        urn: &Urn,
        aspect: &str,
        version: u64,
    ) -> Result<Option<VersionedAspect>, StoreError> {
        self.check_deadline()?;
        let key = (urn.clone(), aspect.to_string());
        Ok(self
            .guard
            .versioned
            .get(&key)
            .and_then(|records| records.iter().find(|r| r.version == version).cloned()))
    }

    async fn append_timeseries(&mut self, entry: TimeseriesEntry) -> Result<(), StoreError> {
        self.check_deadline()?;
        let key = (entry.owner.clone(), entry.name.clone());
        self.guard.timeseries.entry(key).or_default().push(entry);
        Ok(())
    }

    async fn timeseries_range(
        &mut self,
        urn: &Urn,
        aspect: &str,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<TimeseriesEntry>, StoreError> {
        self.check_deadline()?;
        let key = (urn.clone(), aspect.to_string());
        let mut rows: Vec<TimeseriesEntry> = self
            .guard
            .timeseries
            .get(&key)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        from.map_or(true, |f| row.timestamp_ms >= f)
                            && to.map_or(true, |t| row.timestamp_ms <= t)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // Stable sort keeps same-timestamp siblings in insertion order.
        rows.sort_by_key(|row| row.timestamp_ms);
        Ok(rows)
    }

    async fn aspects_of(&mut self, urn: &Urn) -> Result<Vec<AspectInfo>, StoreError> {
        self.check_deadline()?;
        let mut aspects = Vec::new();
        for ((owner, name), records) in &self.guard.versioned {
            if owner == urn && !records.is_empty() {
                aspects.push(AspectInfo {
                    name: name.clone(),
                    kind: mc_core::AspectKind::Versioned,
                    records: records.len(),
                });
            }
        }
        for ((owner, name), rows) in &self.guard.timeseries {
            if owner == urn && !rows.is_empty() {
                aspects.push(AspectInfo {
                    name: name.clone(),
                    kind: mc_core::AspectKind::Timeseries,
                    records: rows.len(),
                });
            }
        }
        Ok(aspects)
    }

    async fn merge_edge(
        &mut self,
        key: EdgeKey,
        properties: PropertyMap,
        via: Option<String>,
    ) -> Result<bool, StoreError> {
        self.check_deadline()?;
        let now = Utc::now();
        match self.guard.edges.get_mut(&key) {
            Some(edge) => {
                merge_properties(&mut edge.properties, properties);
                if via.is_some() {
                    edge.via = via;
                }
                edge.updated_at = now;
                Ok(false)
            }
            None => {
                self.guard.edges.insert(
                    key.clone(),
                    EdgeRecord {
                        key,
                        properties,
                        via,
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn incident_edges(&mut self, urn: &Urn) -> Result<Vec<EdgeRecord>, StoreError> {
        self.check_deadline()?;
        Ok(self
            .guard
            .edges
            .values()
            .filter(|edge| &edge.key.src == urn || &edge.key.dst == urn)
            .cloned()
            .collect())
    }

    async fn edges_to(&mut self, urn: &Urn) -> Result<Vec<EdgeRecord>, StoreError> {
        self.check_deadline()?;
        Ok(self
            .guard
            .edges
            .values()
            .filter(|edge| &edge.key.dst == urn)
            .cloned()
            .collect())
    }

    async fn delete_aspect_records(
        &mut self,
        urn: &Urn,
        aspect: &str,
    ) -> Result<usize, StoreError> {
        self.check_deadline()?;
        let key = (urn.clone(), aspect.to_string());
        let versioned = self.guard.versioned.remove(&key).map_or(0, |r| r.len());
        let timeseries = self.guard.timeseries.remove(&key).map_or(0, |r| r.len());
        Ok(versioned + timeseries)
    }

    async fn delete_incident_edges(&mut self, urn: &Urn) -> Result<usize, StoreError> {
        self.check_deadline()?;
        let keys: Vec<EdgeKey> = self
            .guard
            .edges
            .values()
            .filter(|edge| &edge.key.src == urn || &edge.key.dst == urn)
            .map(|edge| edge.key.clone())
            .collect();
        for key in &keys {
            self.guard.edges.remove(key);
        }
        Ok(keys.len())
    }

    async fn delete_node(&mut self, urn: &Urn) -> Result<bool, StoreError> {
        self.check_deadline()?;
        Ok(self.guard.nodes.remove(urn).is_some())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.check_deadline()?;
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
        Ok(())
    }
}
