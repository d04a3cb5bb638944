//! Aspect and payload validation, applied before any transaction opens.
//!
//! Unknown payload fields always pass (forward compatibility); only the
//! declared `required` fields are enforced, and they must be present and
//! non-null.

use mc_core::{AspectKind, CatalogError, Payload};
use thiserror::Error;

use crate::loader::Registry;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unknown entity type {0}")]
    UnknownEntity(String),

    #[error("unknown aspect {0}")]
    UnknownAspect(String),

    #[error("aspect {aspect} is not declared on entity {entity_type}")]
    AspectNotAllowed { entity_type: String, aspect: String },

    #[error("aspect {aspect} is {actual}, write expected {expected}")]
    AspectKindMismatch {
        aspect: String,
        expected: AspectKind,
        actual: AspectKind,
    },

    #[error("aspect {aspect} payload is missing required field {field}")]
    MissingRequiredField { aspect: String, field: String },

    #[error("aspect {aspect} payload must be a JSON object")]
    PayloadNotAnObject { aspect: String },
}

impl From<ValidationError> for CatalogError {
    fn from(err: ValidationError) -> Self {
        let field = match &err {
            ValidationError::UnknownEntity(name) => name.clone(),
            ValidationError::UnknownAspect(name) => name.clone(),
            ValidationError::AspectNotAllowed { aspect, .. } => aspect.clone(),
            ValidationError::AspectKindMismatch { aspect, .. } => aspect.clone(),
            ValidationError::MissingRequiredField { field, .. } => field.clone(),
            ValidationError::PayloadNotAnObject { aspect } => aspect.clone(),
        };
        CatalogError::Validation { field, message: err.to_string() }
    }
}

/// Validate a pending aspect write. Returns the aspect's declared kind on
/// success.
pub fn validate_aspect_write(
    registry: &Registry,
    entity_type: &str,
    aspect_name: &str,
    payload: &Payload,
    expected_kind: AspectKind,
) -> Result<AspectKind, ValidationError> {
    let entity = registry
        .entity(entity_type)
        .ok_or_else(|| ValidationError::UnknownEntity(entity_type.to_string()))?;
    let aspect = registry
        .aspect(aspect_name)
        .ok_or_else(|| ValidationError::UnknownAspect(aspect_name.to_string()))?;

    let declared_on_entity = entity.aspect_kind(aspect_name).ok_or_else(|| {
        ValidationError::AspectNotAllowed {
            entity_type: entity_type.to_string(),
            aspect: aspect_name.to_string(),
        }
    })?;

    // Entity declaration and aspect definition agree by registry
    // validation; the write itself must match too.
    if declared_on_entity != expected_kind || aspect.kind != expected_kind {
        return Err(ValidationError::AspectKindMismatch {
            aspect: aspect_name.to_string(),
            expected: expected_kind,
            actual: aspect.kind,
        });
    }

    let object = payload
        .as_object()
        .ok_or_else(|| ValidationError::PayloadNotAnObject { aspect: aspect_name.to_string() })?;
    for field in &aspect.required {
        match object.get(field) {
            Some(value) if !value.is_null() => {}
            _ => {
                return Err(ValidationError::MissingRequiredField {
                    aspect: aspect_name.to_string(),
                    field: field.clone(),
                });
            }
        }
    }

    Ok(aspect.kind)
}
