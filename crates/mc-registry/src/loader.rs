//! Registry loading and referential validation.
//!
//! Validation runs in order: (1) syntactic well-formedness, (2) entity ->
//! aspect references and kind agreement, (3) URN template compilation,
//! (4) relationship rule references, (5) rule parameter coverage. The first
//! failure aborts the load; a `Registry` value always represents a fully
//! valid document.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use mc_core::AspectKind;
use mc_urn::UrnTemplate;

use crate::error::RegistryError;
use crate::model::{
    AspectDef, EntityDef, LineageConfig, RegistryDoc, RelationshipRule, SelectorKind,
};

/// One entity type with its compiled URN template.
#[derive(Debug, Clone)]
pub struct EntityType {
    pub name: String,
    pub def: EntityDef,
    pub template: UrnTemplate,
}

impl EntityType {
    pub fn identifying_params(&self) -> &[String] {
        &self.def.identifying_params
    }

    /// Whether `aspect` may be written against this entity, and with which
    /// kind.
    pub fn aspect_kind(&self, aspect: &str) -> Option<AspectKind> {
        self.def.aspects.get(aspect).copied()
    }
}

/// The validated, immutable registry. Shared as `Arc<Registry>` after boot.
#[derive(Debug)]
pub struct Registry {
    entities: BTreeMap<String, EntityType>,
    aspects: BTreeMap<String, AspectDef>,
    rules: Vec<RelationshipRule>,
    lineage: Option<LineageConfig>,
}

impl Registry {
    /// Load a registry document from a YAML string. Includes are not
    /// resolvable without a filesystem anchor and fail validation.
    pub fn from_yaml_str(source: &str) -> Result<Self, RegistryError> {
        let doc: RegistryDoc = serde_yaml::from_str(source)?;
        if !doc.include.is_empty() {
            return Err(RegistryError::Reference(
                "include directives require loading from a path".to_string(),
            ));
        }
        Self::from_doc(doc)
    }

    /// Load a registry document from disk, resolving `include` directives
    /// relative to each including document.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let mut visited = BTreeSet::new();
        let doc = load_merged(path.as_ref(), &mut visited)?;
        Self::from_doc(doc)
    }

    /// Validate a parsed document into a queryable registry.
    pub fn from_doc(doc: RegistryDoc) -> Result<Self, RegistryError> {
        validate_entity_aspect_refs(&doc)?;
        let entities = compile_entities(&doc)?;
        validate_rules(&doc)?;

        tracing::info!(
            entities = doc.entities.len(),
            aspects = doc.aspects.len(),
            rules = doc.relationship_rules.len(),
            "registry loaded"
        );

        Ok(Self {
            entities,
            aspects: doc.aspects,
            rules: doc.relationship_rules,
            lineage: doc.lineage_config,
        })
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.values()
    }

    pub fn entity(&self, name: &str) -> Option<&EntityType> {
        self.entities.get(name)
    }

    pub fn aspects_of(&self, entity_type: &str) -> Option<&BTreeMap<String, AspectKind>> {
        self.entities.get(entity_type).map(|e| &e.def.aspects)
    }

    pub fn aspect(&self, name: &str) -> Option<&AspectDef> {
        self.aspects.get(name)
    }

    pub fn aspect_names(&self) -> impl Iterator<Item = &str> {
        self.aspects.keys().map(String::as_str)
    }

    pub fn aspect_defs(&self) -> impl Iterator<Item = (&str, &AspectDef)> {
        self.aspects.iter().map(|(name, def)| (name.as_str(), def))
    }

    pub fn aspect_kind(&self, name: &str) -> Option<AspectKind> {
        self.aspects.get(name).map(|a| a.kind)
    }

    pub fn urn_template(&self, entity_type: &str) -> Option<&UrnTemplate> {
        self.entities.get(entity_type).map(|e| &e.template)
    }

    /// Rules triggered by a write of `aspect`, in declaration order.
    pub fn relationship_rules_for(&self, aspect: &str) -> Vec<&RelationshipRule> {
        self.rules.iter().filter(|r| r.trigger == aspect).collect()
    }

    pub fn relationship_rules(&self) -> &[RelationshipRule] {
        &self.rules
    }

    /// Entity types declaring `aspect`, in name order.
    pub fn entities_declaring(&self, aspect: &str) -> Vec<&EntityType> {
        self.entities
            .values()
            .filter(|e| e.def.aspects.contains_key(aspect))
            .collect()
    }

    pub fn lineage_config(&self) -> Option<&LineageConfig> {
        self.lineage.as_ref()
    }

    /// Edge types declared across all rules, deduplicated, for index
    /// bootstrap.
    pub fn edge_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.rules.iter().map(|r| r.edge.edge_type.as_str()).collect();
        types.sort_unstable();
        types.dedup();
        types
    }
}

fn load_merged(path: &Path, visited: &mut BTreeSet<PathBuf>) -> Result<RegistryDoc, RegistryError> {
    let canonical = path.canonicalize().map_err(|source| RegistryError::Io {
        path: path.display().to_string(),
        source,
    })?;
    if !visited.insert(canonical.clone()) {
        return Err(RegistryError::Reference(format!(
            "include cycle through {}",
            path.display()
        )));
    }

    let raw = std::fs::read_to_string(&canonical).map_err(|source| RegistryError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let doc: RegistryDoc = serde_yaml::from_str(&raw)?;

    let base = canonical.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut merged = RegistryDoc::default();
    for include in &doc.include {
        let child = load_merged(&base.join(include), visited)?;
        merge_docs(&mut merged, child)?;
    }
    merge_docs(&mut merged, doc)?;
    Ok(merged)
}

fn merge_docs(target: &mut RegistryDoc, doc: RegistryDoc) -> Result<(), RegistryError> {
    for (name, def) in doc.entities {
        if target.entities.insert(name.clone(), def).is_some() {
            return Err(RegistryError::DuplicateInclude { section: "entities", key: name });
        }
    }
    for (name, def) in doc.aspects {
        if target.aspects.insert(name.clone(), def).is_some() {
            return Err(RegistryError::DuplicateInclude { section: "aspects", key: name });
        }
    }
    target.relationship_rules.extend(doc.relationship_rules);
    if let Some(lineage) = doc.lineage_config {
        if target.lineage_config.is_some() {
            return Err(RegistryError::DuplicateInclude {
                section: "lineage_config",
                key: "transformation_templates".to_string(),
            });
        }
        target.lineage_config = Some(lineage);
    }
    Ok(())
}

fn validate_entity_aspect_refs(doc: &RegistryDoc) -> Result<(), RegistryError> {
    for (entity_name, entity) in &doc.entities {
        for (aspect_name, declared_kind) in &entity.aspects {
            let aspect = doc.aspects.get(aspect_name).ok_or_else(|| {
                RegistryError::Reference(format!(
                    "entity {entity_name} references undefined aspect {aspect_name}"
                ))
            })?;
            if aspect.kind != *declared_kind {
                return Err(RegistryError::KindMismatch(format!(
                    "entity {entity_name} declares {aspect_name} as {declared_kind} \
                     but the aspect is {kind}",
                    kind = aspect.kind
                )));
            }
        }
    }
    Ok(())
}

fn compile_entities(doc: &RegistryDoc) -> Result<BTreeMap<String, EntityType>, RegistryError> {
    let mut entities = BTreeMap::new();
    for (name, def) in &doc.entities {
        let template = UrnTemplate::compile(
            &def.urn_template,
            &def.identifying_params,
            &def.optional_params,
        )
        .map_err(|source| RegistryError::Template { entity: name.clone(), source })?;
        entities.insert(
            name.clone(),
            EntityType { name: name.clone(), def: def.clone(), template },
        );
    }
    Ok(entities)
}

fn validate_rules(doc: &RegistryDoc) -> Result<(), RegistryError> {
    for rule in &doc.relationship_rules {
        let name = rule.display_name();

        if !doc.aspects.contains_key(&rule.trigger) {
            return Err(RegistryError::Reference(format!(
                "rule {name} triggers on undefined aspect {trigger}",
                trigger = rule.trigger
            )));
        }
        if let Some(entity) = &rule.entity {
            let def = doc.entities.get(entity).ok_or_else(|| {
                RegistryError::Reference(format!(
                    "rule {name} restricts to undefined entity {entity}"
                ))
            })?;
            if !def.aspects.contains_key(&rule.trigger) {
                return Err(RegistryError::Reference(format!(
                    "rule {name} restricts to entity {entity}, which does not declare \
                     aspect {trigger}",
                    trigger = rule.trigger
                )));
            }
        }
        if rule.lineage && doc.lineage_config.is_none() {
            return Err(RegistryError::Reference(format!(
                "rule {name} is a lineage rule but no lineage_config is defined"
            )));
        }

        for (role, selector) in [
            ("source_selector", &rule.source_selector),
            ("destination_selector", &rule.destination_selector),
        ] {
            match selector.kind {
                SelectorKind::Owning => {}
                SelectorKind::FromUrn => {
                    let path = if role == "source_selector" {
                        rule.extract.src.as_ref()
                    } else {
                        rule.extract.dst.as_ref()
                    };
                    if path.is_none() {
                        return Err(RegistryError::Reference(format!(
                            "rule {name} {role} of kind from_urn needs an extract \
                             projection"
                        )));
                    }
                    if rule.auto_create_missing && selector.entity.is_none() {
                        return Err(RegistryError::Reference(format!(
                            "rule {name} {role} needs an entity type to auto-create \
                             missing endpoints"
                        )));
                    }
                    if let Some(entity) = &selector.entity {
                        if !doc.entities.contains_key(entity) {
                            return Err(RegistryError::Reference(format!(
                                "rule {name} {role} references undefined entity {entity}"
                            )));
                        }
                    }
                }
                SelectorKind::FromParams => {
                    let entity_name = selector.entity.as_ref().ok_or_else(|| {
                        RegistryError::Reference(format!(
                            "rule {name} {role} of kind from_params requires an entity"
                        ))
                    })?;
                    let entity = doc.entities.get(entity_name).ok_or_else(|| {
                        RegistryError::Reference(format!(
                            "rule {name} {role} references undefined entity {entity_name}"
                        ))
                    })?;
                    for param in &entity.identifying_params {
                        if !selector.params.contains_key(param) {
                            return Err(RegistryError::Reference(format!(
                                "rule {name} {role} does not map identifying parameter \
                                 {param} of entity {entity_name}"
                            )));
                        }
                    }
                    for key in selector.params.keys() {
                        let declared = entity.identifying_params.iter().any(|p| p == key)
                            || entity.optional_params.iter().any(|p| p == key);
                        if !declared {
                            return Err(RegistryError::Reference(format!(
                                "rule {name} {role} maps undeclared parameter {key} of \
                                 entity {entity_name}"
                            )));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
