//! Declarative rule evaluation.
//!
//! After a successful aspect write, the engine collects the rules
//! triggered by that aspect, projects `(source, destination)` tuples from
//! the payload, and plans one relationship merge per tuple. Evaluation is
//! deterministic: rules run in declaration order and wildcards expand over
//! array indices in order.

use std::collections::BTreeSet;

use mc_core::{ParamMap, Payload, PropertyMap, Urn};
use mc_registry::{Registry, RelationshipRule, Selector, SelectorKind};
use serde_json::Value;

use crate::error::RuleError;
use crate::lineage;
use crate::path::{Bindings, ProjectionPath};

/// The aspect write that triggered evaluation.
#[derive(Debug, Clone, Copy)]
pub struct AspectWrite<'a> {
    pub entity_type: &'a str,
    pub owner: &'a Urn,
    pub aspect: &'a str,
    pub payload: &'a Payload,
}

/// What the coordinator needs to know about an edge endpoint: the declared
/// entity type (for existence checks and node labels) and whether the rule
/// allows materializing a missing node.
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub entity_type: Option<String>,
    pub auto_create: bool,
}

/// One relationship the engine decided to create.
#[derive(Debug, Clone)]
pub struct PlannedEdge {
    /// Rule diagnostics name.
    pub rule: String,
    pub src: Urn,
    pub dst: Urn,
    pub edge_type: String,
    pub properties: PropertyMap,
    /// Property keys participating in the edge merge key.
    pub discriminators: Vec<String>,
    /// Aspect that produced the edge.
    pub via: String,
    pub src_endpoint: EndpointSpec,
    pub dst_endpoint: EndpointSpec,
}

enum Role {
    Source,
    Destination,
}

/// Evaluates relationship rules against aspect payloads.
pub struct RuleEngine<'a> {
    registry: &'a Registry,
}

impl<'a> RuleEngine<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Plan the relationships triggered by one aspect write.
    ///
    /// Duplicate `(src, type, dst, discriminators)` tuples collapse to the
    /// first occurrence. Self-loops are dropped unless the rule allows
    /// them. Null or missing projections skip silently; type errors abort
    /// evaluation.
    pub fn plan(&self, write: &AspectWrite<'_>) -> Result<Vec<PlannedEdge>, RuleError> {
        let mut planned: Vec<PlannedEdge> = Vec::new();
        let mut seen: BTreeSet<(Urn, String, Urn, Vec<(String, String)>)> = BTreeSet::new();

        for rule in self.registry.relationship_rules_for(write.aspect) {
            if let Some(entity) = &rule.entity {
                if entity != write.entity_type {
                    continue;
                }
            }
            self.plan_rule(rule, write, &mut planned, &mut seen)
                .map_err(|err| match err {
                    evaluated @ RuleError::Evaluation { .. } => evaluated,
                    other => RuleError::Evaluation {
                        rule: rule.display_name(),
                        message: other.to_string(),
                    },
                })?;
        }
        Ok(planned)
    }

    fn plan_rule(
        &self,
        rule: &RelationshipRule,
        write: &AspectWrite<'_>,
        planned: &mut Vec<PlannedEdge>,
        seen: &mut BTreeSet<(Urn, String, Urn, Vec<(String, String)>)>,
    ) -> Result<(), RuleError> {
        let src_tuples = self.resolve_endpoint(rule, Role::Source, write)?;
        let dst_tuples = self.resolve_endpoint(rule, Role::Destination, write)?;

        for (src_bindings, src) in &src_tuples {
            for (dst_bindings, dst) in &dst_tuples {
                if src == dst && !rule.allow_self_loops {
                    tracing::debug!(rule = %rule.display_name(), urn = %src, "self-loop skipped");
                    continue;
                }

                let bindings = if dst_bindings.is_empty() { src_bindings } else { dst_bindings };
                let properties = self.edge_properties(rule, write.payload, bindings)?;

                let discriminator_values: Vec<(String, String)> = rule
                    .edge
                    .discriminators
                    .iter()
                    .filter_map(|key| {
                        properties.get(key).map(|value| (key.clone(), stringify(value)))
                    })
                    .collect();
                let dedup_key = (
                    src.clone(),
                    rule.edge.edge_type.clone(),
                    dst.clone(),
                    discriminator_values,
                );
                if !seen.insert(dedup_key) {
                    continue;
                }

                planned.push(PlannedEdge {
                    rule: rule.display_name(),
                    src: src.clone(),
                    dst: dst.clone(),
                    edge_type: rule.edge.edge_type.clone(),
                    properties,
                    discriminators: rule.edge.discriminators.clone(),
                    via: write.aspect.to_string(),
                    src_endpoint: self.endpoint_spec(rule, &rule.source_selector, write),
                    dst_endpoint: self.endpoint_spec(rule, &rule.destination_selector, write),
                });
            }
        }
        Ok(())
    }

    fn resolve_endpoint(
        &self,
        rule: &RelationshipRule,
        role: Role,
        write: &AspectWrite<'_>,
    ) -> Result<Vec<(Bindings, Urn)>, RuleError> {
        let (selector, path_str) = match role {
            Role::Source => (&rule.source_selector, rule.extract.src.as_deref()),
            Role::Destination => (&rule.destination_selector, rule.extract.dst.as_deref()),
        };

        match selector.kind {
            SelectorKind::Owning => Ok(vec![(Vec::new(), write.owner.clone())]),
            SelectorKind::FromUrn => {
                // Registry validation guarantees the projection exists.
                let path = ProjectionPath::parse(path_str.unwrap_or_default())?;
                let mut tuples = Vec::new();
                for (bindings, value) in path.evaluate(write.payload)? {
                    match value {
                        Value::String(urn) => tuples.push((bindings, Urn::from(urn.as_str()))),
                        other => {
                            return Err(RuleError::TypeError {
                                path: path.source().to_string(),
                                expected: "string urn",
                                found: type_name(other).to_string(),
                            });
                        }
                    }
                }
                Ok(tuples)
            }
            SelectorKind::FromParams => self.resolve_from_params(selector, path_str, write),
        }
    }

    fn resolve_from_params(
        &self,
        selector: &Selector,
        path_str: Option<&str>,
        write: &AspectWrite<'_>,
    ) -> Result<Vec<(Bindings, Urn)>, RuleError> {
        // Registry validation guarantees entity and template exist.
        let entity = selector.entity.as_deref().unwrap_or_default();
        let template = self.registry.urn_template(entity).ok_or_else(|| {
            RuleError::Evaluation {
                rule: entity.to_string(),
                message: "selector entity missing from registry".to_string(),
            }
        })?;

        let expansions: Vec<Bindings> = match path_str {
            Some(path) => ProjectionPath::parse(path)?
                .evaluate(write.payload)?
                .into_iter()
                .map(|(bindings, _)| bindings)
                .collect(),
            None => vec![Vec::new()],
        };

        let mut tuples = Vec::new();
        'expansion: for bindings in expansions {
            let mut params = ParamMap::new();
            for (param, param_path) in &selector.params {
                let path = ProjectionPath::parse(param_path)?;
                match path.evaluate_single(write.payload, &bindings)? {
                    Some(Value::String(value)) => {
                        params.insert(param.clone(), value.clone());
                    }
                    Some(Value::Number(value)) => {
                        params.insert(param.clone(), value.to_string());
                    }
                    Some(Value::Bool(value)) => {
                        params.insert(param.clone(), value.to_string());
                    }
                    Some(other) => {
                        return Err(RuleError::TypeError {
                            path: param_path.clone(),
                            expected: "scalar",
                            found: type_name(other).to_string(),
                        });
                    }
                    // A missing projection skips this tuple silently.
                    None => continue 'expansion,
                }
            }
            match template.build(&params) {
                Ok(urn) => tuples.push((bindings, urn)),
                // An identifying param was not projected; skip the tuple.
                Err(_) => continue,
            }
        }
        Ok(tuples)
    }

    fn edge_properties(
        &self,
        rule: &RelationshipRule,
        payload: &Payload,
        bindings: &[usize],
    ) -> Result<PropertyMap, RuleError> {
        let mut properties = PropertyMap::new();
        for (key, value) in &rule.edge.properties {
            properties.insert(key.clone(), value.clone());
        }
        for (key, path_str) in &rule.extract.props {
            let path = ProjectionPath::parse(path_str)?;
            if let Some(value) = path.evaluate_single(payload, bindings)? {
                properties.insert(key.clone(), value.clone());
            }
        }
        if rule.lineage {
            if let Some(config) = self.registry.lineage_config() {
                let template = lineage::select_template(config, payload);
                for (key, value) in lineage::render(template, payload) {
                    properties.insert(key, value);
                }
            }
        }
        Ok(properties)
    }

    fn endpoint_spec(
        &self,
        rule: &RelationshipRule,
        selector: &Selector,
        write: &AspectWrite<'_>,
    ) -> EndpointSpec {
        let entity_type = match selector.kind {
            SelectorKind::Owning => Some(write.entity_type.to_string()),
            _ => selector.entity.clone(),
        };
        EndpointSpec { entity_type, auto_create: rule.auto_create_missing }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
