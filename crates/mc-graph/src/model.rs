//! Stored record types.
//!
//! The logical layout follows the labeled-property-graph model: entity
//! nodes labeled with their entity type, aspect records attached to an
//! owner URN, and typed directed edges keyed by endpoints plus declared
//! discriminator properties.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mc_core::{AspectKind, ParamMap, Payload, PropertyMap, Urn};
use serde::{Deserialize, Serialize};

/// An entity node. Label = entity type; key = URN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub urn: Urn,
    pub label: String,
    /// Non-key attributes; last-writer-wins on re-upsert.
    pub params: ParamMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One version of a versioned aspect. Immutable after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedAspect {
    pub owner: Urn,
    pub name: String,
    pub version: u64,
    pub latest: bool,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
}

/// One row of a time-series aspect. Append-only; identical timestamps are
/// stored as siblings in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeseriesEntry {
    pub owner: Urn,
    pub name: String,
    pub timestamp_ms: i64,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
}

/// Aspect presence on an entity, as returned by entity reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AspectInfo {
    pub name: String,
    pub kind: AspectKind,
    /// Record count: versions for versioned aspects, rows for time-series.
    pub records: usize,
}

/// The merge key of a relationship edge: endpoints, type, and the values of
/// the rule-declared discriminator properties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub src: Urn,
    pub edge_type: String,
    pub dst: Urn,
    pub discriminators: BTreeMap<String, String>,
}

impl EdgeKey {
    pub fn new(src: Urn, edge_type: impl Into<String>, dst: Urn) -> Self {
        Self {
            src,
            edge_type: edge_type.into(),
            dst,
            discriminators: BTreeMap::new(),
        }
    }

    /// Derive discriminator values from edge properties. Keys absent from
    /// the property bag do not participate in the merge key.
    pub fn with_discriminators(mut self, keys: &[String], properties: &PropertyMap) -> Self {
        for key in keys {
            if let Some(value) = properties.get(key) {
                self.discriminators.insert(key.clone(), stringify(value));
            }
        }
        self
    }
}

fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A relationship edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub key: EdgeKey,
    pub properties: PropertyMap,
    /// Aspect whose write created or last updated this edge.
    pub via: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Merge incoming edge properties into the existing bag: last-writer-wins
/// for scalars and objects, union for arrays (deduplicated by JSON
/// equality, first-seen order preserved).
pub fn merge_properties(existing: &mut PropertyMap, incoming: PropertyMap) {
    for (key, value) in incoming {
        match (existing.get_mut(&key), value) {
            (Some(serde_json::Value::Array(current)), serde_json::Value::Array(new)) => {
                for item in new {
                    if !current.contains(&item) {
                        current.push(item);
                    }
                }
            }
            (_, value) => {
                existing.insert(key, value);
            }
        }
    }
}
