//! Operation descriptors: the static dispatch table emitted at boot.

use mc_core::AspectKind;
use serde::Serialize;

/// What a synthesized operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    UpsertEntity,
    GetEntity,
    DeleteEntity,
    UpsertAspect,
    GetAspect,
    DeleteAspect,
}

/// One entry in the operation table. Everything a transport needs to call
/// the operation is bound here at synthesis time.
#[derive(Debug, Clone, Serialize)]
pub struct OpDescriptor {
    pub name: String,
    pub kind: OpKind,

    /// Set for entity operations; `None` for aspect operations, whose
    /// owning entity is resolved per request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Set for aspect operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_kind: Option<AspectKind>,

    /// Identifying params of the entity (entity ops), or of the sole
    /// declaring entity (aspect ops on unambiguous aspects).
    pub identifying_params: Vec<String>,

    /// Entity types the aspect may be written against (aspect ops).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub declared_on: Vec<String>,

    /// Relationship rules (by diagnostics name) triggered by this
    /// operation's writes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub triggers_rules: Vec<String>,
}

impl OpDescriptor {
    pub fn entity_op(name: String, kind: OpKind, entity_type: &str, identifying: &[String]) -> Self {
        Self {
            name,
            kind,
            entity_type: Some(entity_type.to_string()),
            aspect: None,
            aspect_kind: None,
            identifying_params: identifying.to_vec(),
            declared_on: Vec::new(),
            triggers_rules: Vec::new(),
        }
    }

    pub fn aspect_op(
        name: String,
        kind: OpKind,
        aspect: &str,
        aspect_kind: AspectKind,
        declared_on: Vec<String>,
        identifying_params: Vec<String>,
        triggers_rules: Vec<String>,
    ) -> Self {
        Self {
            name,
            kind,
            entity_type: None,
            aspect: Some(aspect.to_string()),
            aspect_kind: Some(aspect_kind),
            identifying_params,
            declared_on,
            triggers_rules,
        }
    }
}
