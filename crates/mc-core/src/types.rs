//! Shared value types used throughout Metacat.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A Uniform Resource Name identifying an entity node.
///
/// URNs are produced by compiled URN templates and are globally unique per
/// entity: the same identifying parameters always yield the same, byte
/// identical URN.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Urn(String);

impl Urn {
    /// Wrap an already-constructed URN string.
    ///
    /// Construction from parameters goes through the URN builder; this is
    /// for URNs arriving from callers or stored records.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Urn {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Urn {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Whether an aspect is versioned or time-series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectKind {
    /// Monotone-versioned with a unique `latest` pointer per
    /// `(urn, aspect_name)`.
    Versioned,
    /// Append-only, keyed by timestamp.
    Timeseries,
}

impl fmt::Display for AspectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AspectKind::Versioned => f.write_str("versioned"),
            AspectKind::Timeseries => f.write_str("timeseries"),
        }
    }
}

/// Caller-supplied entity parameters, keyed by declared parameter name.
///
/// A `BTreeMap` so that iteration order is deterministic wherever params
/// flow into URNs, logs, or stored attributes.
pub type ParamMap = BTreeMap<String, String>;

/// An opaque structured payload, as accepted for aspect writes.
pub type Payload = serde_json::Value;

/// Property bag carried on relationship edges.
pub type PropertyMap = serde_json::Map<String, serde_json::Value>;

/// Correlation id attached to every write request, for cross-referencing
/// user-visible errors with log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}
