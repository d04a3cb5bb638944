//! Catalog-wide error types.
//!
//! Layer crates (registry, graph store, rules) define their own error enums
//! and convert into `CatalogError` at the service boundary, so callers see
//! one stable set of error kinds.

use thiserror::Error;

use crate::types::Urn;

/// The error type surfaced by synthesized operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Registry load or validation failure. Fatal at boot; the process
    /// refuses to start on this.
    #[error("registry error: {0}")]
    Registry(String),

    /// Pre-transaction validation failure: unknown entity or aspect, kind
    /// mismatch, missing required payload field.
    #[error("validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    /// URN construction failed, typically a missing identifying parameter.
    #[error("cannot build urn for {entity_type}: {message}")]
    UrnConstruction { entity_type: String, message: String },

    /// Unique-constraint race on a versioned aspect that survived the
    /// internal retry budget.
    #[error("store conflict after {attempts} attempts: {message}")]
    StoreConflict { attempts: u32, message: String },

    /// Session pool timeout or connection loss. `transient` tells callers
    /// the request may be retried as-is.
    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String, transient: bool },

    /// A relationship rule projection failed (bad path, type error). The
    /// surrounding transaction has been rolled back.
    #[error("rule evaluation failed for {rule}: {message}")]
    RuleEvaluation { rule: String, message: String },

    #[error("not found: {kind} {urn}")]
    NotFound { kind: &'static str, urn: Urn },

    /// Non-cascade delete against an entity that still has aspects or
    /// incoming edges.
    #[error("entity {urn} has dependents: {message}")]
    DependencyViolation { urn: Urn, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    /// Stable machine-readable kind, mirrored into API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::Registry(_) => "registry_error",
            CatalogError::Validation { .. } => "validation_error",
            CatalogError::UrnConstruction { .. } => "urn_construction_error",
            CatalogError::StoreConflict { .. } => "store_conflict",
            CatalogError::StoreUnavailable { .. } => "store_unavailable",
            CatalogError::RuleEvaluation { .. } => "rule_evaluation_error",
            CatalogError::NotFound { .. } => "not_found",
            CatalogError::DependencyViolation { .. } => "dependency_violation",
            CatalogError::Internal(_) => "internal_error",
        }
    }

    /// Whether callers may retry the same request unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CatalogError::StoreUnavailable { transient: true, .. }
                | CatalogError::StoreConflict { .. }
        )
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        CatalogError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CatalogError::Internal(message.into())
    }
}
