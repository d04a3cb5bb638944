//! Operation request and result envelopes.
//!
//! Every synthesized operation accepts an [`OpRequest`] and returns an
//! [`OpResponse`]. Writes return the URN plus the version (versioned
//! aspects) or timestamp (time-series), the created-entity flag, and the
//! relationships the write triggered.

use chrono::{DateTime, Utc};
use mc_core::{AspectKind, CorrelationId, ParamMap, Payload, Urn};
use mc_graph::AspectInfo;
use serde::{Deserialize, Serialize};

/// Caller input to a synthesized operation. Unused fields are ignored by
/// operations that do not need them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpRequest {
    /// Explicit entity URN. Aspect operations accept either this or the
    /// owning entity's identifying params.
    pub urn: Option<Urn>,

    /// Owning entity type, needed only when the aspect is declared on more
    /// than one entity type and no URN disambiguates it.
    pub entity_type: Option<String>,

    /// Identifying (and optional) entity parameters.
    #[serde(default)]
    pub params: ParamMap,

    /// Aspect payload for upserts.
    pub payload: Option<Payload>,

    /// Timestamp for time-series appends; defaults to now.
    pub timestamp_ms: Option<i64>,

    /// Specific version for versioned-aspect reads; defaults to latest.
    pub version: Option<u64>,

    /// Time-series read range, inclusive.
    pub from: Option<i64>,
    pub to: Option<i64>,

    /// Cascade flag for entity deletes.
    #[serde(default)]
    pub cascade: bool,

    /// Per-request deadline override, milliseconds.
    pub deadline_ms: Option<u64>,

    /// Supplied by callers that want to correlate logs themselves.
    pub correlation_id: Option<CorrelationId>,
}

/// Result of a successful write.
#[derive(Debug, Clone, Serialize)]
pub struct OpOutcome {
    pub urn: Urn,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
    pub created_entity: bool,
    pub created_relationships: Vec<CreatedRelationship>,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedRelationship {
    pub src: Urn,
    pub edge_type: String,
    pub dst: Urn,
    /// False when the merge found an existing edge and only updated its
    /// properties.
    pub created: bool,
}

/// Result of an entity read.
#[derive(Debug, Clone, Serialize)]
pub struct EntityView {
    pub urn: Urn,
    pub entity_type: String,
    pub params: ParamMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub aspects: Vec<AspectInfo>,
}

/// Result of a versioned-aspect read.
#[derive(Debug, Clone, Serialize)]
pub struct AspectView {
    pub urn: Urn,
    pub name: String,
    pub kind: AspectKind,
    pub version: u64,
    pub latest: bool,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
}

/// Result of a time-series read.
#[derive(Debug, Clone, Serialize)]
pub struct TimeseriesView {
    pub urn: Urn,
    pub name: String,
    pub entries: Vec<TimeseriesPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeseriesPoint {
    pub timestamp_ms: i64,
    pub payload: Payload,
}

/// Result of a delete.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub urn: Urn,
    /// Aspect records removed; zero for entity deletes without aspects.
    pub removed_records: usize,
    pub correlation_id: CorrelationId,
}

/// The envelope returned by [`crate::OperationCatalog::invoke`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum OpResponse {
    Write(OpOutcome),
    Entity(EntityView),
    Aspect(AspectView),
    Timeseries(TimeseriesView),
    Deleted(DeleteOutcome),
}
