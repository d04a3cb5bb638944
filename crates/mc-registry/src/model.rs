//! Serde model of the registry document.
//!
//! Field names here are normative for the YAML surface:
//!
//! ```yaml
//! entities:
//!   Dataset:
//!     identifying_params: [platform, name, env]
//!     optional_params: [description]
//!     urn_template: "urn:li:dataset:(urn:li:dataPlatform:{platform},{name},{env})"
//!     aspects:
//!       datasetProperties: versioned
//! aspects:
//!   datasetProperties:
//!     type: versioned
//!     properties: [description, customProperties]
//!     required: [description]
//! relationship_rules:
//!   - trigger: ownership
//!     extract: { dst: /owners/*/owner, props: { type: /owners/*/type } }
//!     source_selector: { kind: owning }
//!     destination_selector: { kind: from_urn, entity: CorpUser }
//!     edge: { type: OWNED_BY, discriminators: [type] }
//!     auto_create_missing: true
//! lineage_config:
//!   transformation_templates:
//!     default:
//!       description_template: "Derived via {transformation_type}"
//!       relationship_properties: { subtype: "{transformation_type}" }
//! ```

use std::collections::BTreeMap;

use mc_core::AspectKind;
use serde::{Deserialize, Serialize};

/// Raw registry document, prior to referential validation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RegistryDoc {
    /// Other registry documents merged into this one, resolved relative to
    /// the including document's directory.
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub entities: BTreeMap<String, EntityDef>,

    #[serde(default)]
    pub aspects: BTreeMap<String, AspectDef>,

    #[serde(default)]
    pub relationship_rules: Vec<RelationshipRule>,

    #[serde(default)]
    pub lineage_config: Option<LineageConfig>,
}

/// One entity type declaration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntityDef {
    /// Ordered identifying parameters; the URN is a pure function of these.
    pub identifying_params: Vec<String>,

    #[serde(default)]
    pub optional_params: Vec<String>,

    pub urn_template: String,

    /// Aspects writable against this entity, with the expected kind.
    #[serde(default)]
    pub aspects: BTreeMap<String, AspectKind>,
}

/// One aspect type declaration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AspectDef {
    #[serde(rename = "type")]
    pub kind: AspectKind,

    /// Known payload properties. Informational: unknown payload fields are
    /// always accepted for forward compatibility.
    #[serde(default)]
    pub properties: Vec<String>,

    /// Payload fields that must be present and non-null on every write.
    #[serde(default)]
    pub required: Vec<String>,
}

/// A declarative rule turning aspect payloads into relationships.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelationshipRule {
    /// Aspect whose writes trigger this rule.
    pub trigger: String,

    /// Restrict the trigger to one owning entity type.
    #[serde(default)]
    pub entity: Option<String>,

    #[serde(default)]
    pub extract: Extract,

    pub source_selector: Selector,
    pub destination_selector: Selector,

    pub edge: EdgeSpec,

    /// Merge a bare entity node for a missing endpoint instead of skipping
    /// the edge. Opt-in per rule; auto-created nodes never get aspects.
    #[serde(default)]
    pub auto_create_missing: bool,

    #[serde(default)]
    pub allow_self_loops: bool,

    /// Route edge properties through the lineage template resolver.
    #[serde(default)]
    pub lineage: bool,
}

impl RelationshipRule {
    /// Stable name for diagnostics: `<trigger>-><edge type>`.
    pub fn display_name(&self) -> String {
        format!("{}->{}", self.trigger, self.edge.edge_type)
    }
}

/// Payload projections used by a rule. Paths are JSON-pointer-like
/// (`/owners/*/owner`), with `*` expanding arrays.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Extract {
    #[serde(default)]
    pub src: Option<String>,

    #[serde(default)]
    pub dst: Option<String>,

    /// Edge properties projected from the payload, keyed by property name.
    #[serde(default)]
    pub props: BTreeMap<String, String>,
}

/// How a rule turns a projection into an endpoint URN.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Selector {
    pub kind: SelectorKind,

    /// Entity type of the endpoint, required for `from_params` and used for
    /// auto-creation under `from_urn`.
    #[serde(default)]
    pub entity: Option<String>,

    /// For `from_params`: identifying parameter name -> projection path.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    /// The entity owning the triggering aspect.
    Owning,
    /// The URN literally present at the extract projection.
    FromUrn,
    /// A URN built from projected identifying parameters.
    FromParams,
}

/// Edge declaration for a rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EdgeSpec {
    #[serde(rename = "type")]
    pub edge_type: String,

    /// Literal properties stamped on every edge this rule creates.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,

    /// Property keys that discriminate otherwise-identical edges; part of
    /// the edge's merge key.
    #[serde(default)]
    pub discriminators: Vec<String>,
}

/// Lineage transformation templates.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LineageConfig {
    pub transformation_templates: TransformationTemplates,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransformationTemplates {
    /// Fallback for transformation types without a dedicated pattern.
    pub default: LineageTemplate,

    #[serde(default)]
    pub patterns: BTreeMap<String, LineageTemplate>,
}

/// One transformation template. `{placeholders}` in the description and
/// property values are filled literally from the triggering payload.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LineageTemplate {
    #[serde(default)]
    pub description_template: Option<String>,

    #[serde(default)]
    pub relationship_properties: BTreeMap<String, String>,
}
