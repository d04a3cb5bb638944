//! The operation synthesizer.
//!
//! At startup the catalog walks the registry and emits, for each entity
//! type, `{upsert_<Entity>, get_<Entity>, delete_<Entity>}` and, for each
//! aspect, `{upsert_<aspect>_aspect, get_<aspect>_aspect,
//! delete_<aspect>_aspect}`. Each descriptor binds the identifying params,
//! URN template, validator, writer call, and triggered relationship rules.
//! Transports call operations by name and never introspect the registry
//! themselves.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use mc_core::config::AppConfig;
use mc_core::{CatalogError, CatalogResult};
use mc_graph::{IndexSpec, SessionPool};
use mc_registry::Registry;

use crate::coordinator::WriteCoordinator;
use crate::descriptor::{OpDescriptor, OpKind};
use crate::request::{OpRequest, OpResponse};

pub struct OperationCatalog {
    registry: Arc<Registry>,
    pool: Arc<SessionPool>,
    coordinator: WriteCoordinator,
    ops: BTreeMap<String, OpDescriptor>,
}

impl OperationCatalog {
    /// Build the operation table. Called once at boot; the result is
    /// shared read-only.
    pub fn synthesize(
        registry: Arc<Registry>,
        pool: Arc<SessionPool>,
        config: &AppConfig,
    ) -> Self {
        let mut ops = BTreeMap::new();

        for entity in registry.entities() {
            let identifying = entity.identifying_params();
            for (prefix, kind) in [
                ("upsert", OpKind::UpsertEntity),
                ("get", OpKind::GetEntity),
                ("delete", OpKind::DeleteEntity),
            ] {
                let name = format!("{prefix}_{name}", name = entity.name);
                ops.insert(
                    name.clone(),
                    OpDescriptor::entity_op(name, kind, &entity.name, identifying),
                );
            }
        }

        for (aspect_name, aspect) in registry.aspect_defs() {
            let declaring = registry.entities_declaring(aspect_name);
            let declared_on: Vec<String> =
                declaring.iter().map(|e| e.name.clone()).collect();
            let identifying = match declaring.as_slice() {
                [only] => only.identifying_params().to_vec(),
                _ => Vec::new(),
            };
            let triggers: Vec<String> = registry
                .relationship_rules_for(aspect_name)
                .iter()
                .map(|rule| rule.display_name())
                .collect();
            for (prefix, kind) in [
                ("upsert", OpKind::UpsertAspect),
                ("get", OpKind::GetAspect),
                ("delete", OpKind::DeleteAspect),
            ] {
                let name = format!("{prefix}_{aspect_name}_aspect");
                ops.insert(
                    name.clone(),
                    OpDescriptor::aspect_op(
                        name,
                        kind,
                        aspect_name,
                        aspect.kind,
                        declared_on.clone(),
                        identifying.clone(),
                        triggers.clone(),
                    ),
                );
            }
        }

        tracing::info!(operations = ops.len(), "operation table synthesized");

        let coordinator = WriteCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&pool),
            config.graph.retry,
            Duration::from_millis(config.request.deadline_ms),
        );

        Self { registry, pool, coordinator, ops }
    }

    /// Create the store constraints and indexes the writer relies on.
    pub async fn bootstrap(&self) -> CatalogResult<()> {
        let spec = IndexSpec {
            entity_labels: self.registry.entity_types().map(str::to_string).collect(),
            edge_types: self.registry.edge_types().iter().map(|t| t.to_string()).collect(),
        };
        self.pool.store().ensure_indexes(&spec).await?;
        Ok(())
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// All operations, in name order.
    pub fn ops(&self) -> impl Iterator<Item = &OpDescriptor> {
        self.ops.values()
    }

    pub fn descriptor(&self, name: &str) -> Option<&OpDescriptor> {
        self.ops.get(name)
    }

    /// Invoke a synthesized operation by name.
    pub async fn invoke(&self, name: &str, request: OpRequest) -> CatalogResult<OpResponse> {
        let desc = self.ops.get(name).ok_or_else(|| {
            CatalogError::validation("operation", format!("unknown operation {name}"))
        })?;
        match desc.kind {
            OpKind::UpsertEntity => {
                Ok(OpResponse::Write(self.coordinator.upsert_entity(desc, request).await?))
            }
            OpKind::GetEntity => {
                Ok(OpResponse::Entity(self.coordinator.get_entity(desc, request).await?))
            }
            OpKind::DeleteEntity => {
                Ok(OpResponse::Deleted(self.coordinator.delete_entity(desc, request).await?))
            }
            OpKind::UpsertAspect => {
                Ok(OpResponse::Write(self.coordinator.upsert_aspect(desc, request).await?))
            }
            OpKind::GetAspect => self.coordinator.get_aspect(desc, request).await,
            OpKind::DeleteAspect => {
                Ok(OpResponse::Deleted(self.coordinator.delete_aspect(desc, request).await?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_core::config::GraphConfig;
    use mc_core::{ParamMap, Urn};
    use mc_graph::{GraphStore, MemoryGraph, TxOptions};
    use serde_json::json;

    const REGISTRY: &str = r#"
entities:
  Dataset:
    identifying_params: [platform, name, env]
    urn_template: "urn:li:dataset:(urn:li:dataPlatform:{platform},{name},{env})"
    aspects:
      datasetProperties: versioned
      schemaMetadata: versioned
      ownership: versioned
      datasetProfile: timeseries
  CorpUser:
    identifying_params: [username]
    urn_template: "urn:li:corpuser:{username}"
    aspects: {}
  Column:
    identifying_params: [name]
    urn_template: "urn:li:column:{name}"
    aspects:
      columnTransformation: versioned
aspects:
  datasetProperties:
    type: versioned
    properties: [description, customProperties]
    required: [description]
  schemaMetadata:
    type: versioned
    properties: [fields]
  ownership:
    type: versioned
    properties: [owners]
    required: [owners]
  datasetProfile:
    type: timeseries
    properties: [rowCount]
  columnTransformation:
    type: versioned
    properties: [transformation_type, input_columns, description]
    required: [transformation_type, input_columns]
relationship_rules:
  - trigger: ownership
    extract: { dst: /owners/*/owner, props: { type: /owners/*/type } }
    source_selector: { kind: owning }
    destination_selector: { kind: from_urn, entity: CorpUser }
    edge: { type: OWNED_BY, discriminators: [type] }
    auto_create_missing: true
  - trigger: columnTransformation
    extract: { dst: /input_columns/* }
    source_selector: { kind: owning }
    destination_selector: { kind: from_params, entity: Column, params: { name: /input_columns/* } }
    edge: { type: DERIVES_FROM }
    auto_create_missing: true
    lineage: true
lineage_config:
  transformation_templates:
    default:
      description_template: "Derived via {transformation_type} from {input_columns}"
      relationship_properties:
        subtype: "{transformation_type}"
"#;

    fn catalog() -> Arc<OperationCatalog> {
        let registry = Arc::new(Registry::from_yaml_str(REGISTRY).unwrap());
        let config = AppConfig {
            graph: GraphConfig { acquire_timeout_ms: 2_000, ..GraphConfig::default() },
            ..AppConfig::default()
        };
        let store = Arc::new(MemoryGraph::new());
        let pool = Arc::new(SessionPool::new(store, &config.graph));
        Arc::new(OperationCatalog::synthesize(registry, pool, &config))
    }

    fn dataset_params() -> ParamMap {
        [
            ("platform", "mysql"),
            ("name", "test_db.test_table"),
            ("env", "PROD"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    const DATASET_URN: &str = "urn:li:dataset:(urn:li:dataPlatform:mysql,test_db.test_table,PROD)";

    fn upsert_req(payload: serde_json::Value) -> OpRequest {
        OpRequest {
            params: dataset_params(),
            payload: Some(payload),
            ..OpRequest::default()
        }
    }

    #[test]
    fn test_synthesized_op_names() {
        let catalog = catalog();
        for name in [
            "upsert_Dataset",
            "get_Dataset",
            "delete_Dataset",
            "upsert_datasetProperties_aspect",
            "get_datasetProperties_aspect",
            "delete_datasetProperties_aspect",
            "upsert_datasetProfile_aspect",
        ] {
            assert!(catalog.descriptor(name).is_some(), "missing op {name}");
        }
        let upsert = catalog.descriptor("upsert_Dataset").unwrap();
        assert_eq!(upsert.identifying_params, vec!["platform", "name", "env"]);
        let ownership = catalog.descriptor("upsert_ownership_aspect").unwrap();
        assert_eq!(ownership.triggers_rules, vec!["ownership->OWNED_BY"]);
        assert_eq!(ownership.declared_on, vec!["Dataset"]);
    }

    #[tokio::test]
    async fn test_entity_upsert_then_aspect_upsert_roundtrips() {
        let catalog = catalog();

        let response = catalog
            .invoke(
                "upsert_Dataset",
                OpRequest { params: dataset_params(), ..OpRequest::default() },
            )
            .await
            .unwrap();
        let OpResponse::Write(outcome) = response else { panic!("expected write") };
        assert_eq!(outcome.urn.as_str(), DATASET_URN);
        assert!(outcome.created_entity);

        let response = catalog
            .invoke(
                "upsert_datasetProperties_aspect",
                upsert_req(json!({"description": "x"})),
            )
            .await
            .unwrap();
        let OpResponse::Write(outcome) = response else { panic!("expected write") };
        assert_eq!(outcome.version, Some(1));
        assert!(!outcome.created_entity);

        let response = catalog
            .invoke(
                "get_datasetProperties_aspect",
                OpRequest { params: dataset_params(), ..OpRequest::default() },
            )
            .await
            .unwrap();
        let OpResponse::Aspect(view) = response else { panic!("expected aspect") };
        assert_eq!(view.version, 1);
        assert!(view.latest);
        assert_eq!(view.payload, json!({"description": "x"}));
    }

    #[tokio::test]
    async fn test_versioning_is_monotone_with_single_latest() {
        let catalog = catalog();
        for (version, description) in [(1, "a"), (2, "b"), (3, "c")] {
            let response = catalog
                .invoke(
                    "upsert_datasetProperties_aspect",
                    upsert_req(json!({"description": description})),
                )
                .await
                .unwrap();
            let OpResponse::Write(outcome) = response else { panic!("expected write") };
            assert_eq!(outcome.version, Some(version));
        }

        let OpResponse::Aspect(latest) = catalog
            .invoke(
                "get_datasetProperties_aspect",
                OpRequest { params: dataset_params(), ..OpRequest::default() },
            )
            .await
            .unwrap()
        else {
            panic!("expected aspect")
        };
        assert_eq!(latest.version, 3);
        assert_eq!(latest.payload["description"], "c");

        let OpResponse::Aspect(old) = catalog
            .invoke(
                "get_datasetProperties_aspect",
                OpRequest {
                    params: dataset_params(),
                    version: Some(2),
                    ..OpRequest::default()
                },
            )
            .await
            .unwrap()
        else {
            panic!("expected aspect")
        };
        assert!(!old.latest);
        assert_eq!(old.payload["description"], "b");
    }

    #[tokio::test]
    async fn test_ownership_rule_auto_creates_corpuser_and_edge() {
        let catalog = catalog();
        let response = catalog
            .invoke(
                "upsert_ownership_aspect",
                upsert_req(json!({"owners": [
                    {"owner": "urn:li:corpuser:alice", "type": "DATA_OWNER"}
                ]})),
            )
            .await
            .unwrap();
        let OpResponse::Write(outcome) = response else { panic!("expected write") };
        assert_eq!(outcome.created_relationships.len(), 1);
        let edge = &outcome.created_relationships[0];
        assert_eq!(edge.src.as_str(), DATASET_URN);
        assert_eq!(edge.edge_type, "OWNED_BY");
        assert_eq!(edge.dst.as_str(), "urn:li:corpuser:alice");
        assert!(edge.created);

        // The CorpUser node was materialized with URN-only attributes.
        let mut tx = catalog
            .pool()
            .store()
            .begin(TxOptions::default())
            .await
            .unwrap();
        let node = tx
            .node(&Urn::from("urn:li:corpuser:alice"))
            .await
            .unwrap()
            .expect("auto-created node");
        assert_eq!(node.label, "CorpUser");
        assert!(node.params.is_empty());
        let edges = tx.incident_edges(&Urn::from(DATASET_URN)).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].properties["type"], "DATA_OWNER");
        assert_eq!(edges[0].via.as_deref(), Some("ownership"));
    }

    #[tokio::test]
    async fn test_writing_same_ownership_twice_yields_single_edge() {
        let catalog = catalog();
        let payload = json!({"owners": [
            {"owner": "urn:li:corpuser:alice", "type": "DATA_OWNER"}
        ]});
        for _ in 0..2 {
            catalog
                .invoke("upsert_ownership_aspect", upsert_req(payload.clone()))
                .await
                .unwrap();
        }
        let mut tx = catalog
            .pool()
            .store()
            .begin(TxOptions::default())
            .await
            .unwrap();
        let edges = tx.incident_edges(&Urn::from(DATASET_URN)).await.unwrap();
        assert_eq!(edges.len(), 1);
    }

    #[tokio::test]
    async fn test_cascade_delete_removes_everything() {
        let catalog = catalog();
        catalog
            .invoke(
                "upsert_datasetProperties_aspect",
                upsert_req(json!({"description": "x"})),
            )
            .await
            .unwrap();
        catalog
            .invoke(
                "upsert_ownership_aspect",
                upsert_req(json!({"owners": [
                    {"owner": "urn:li:corpuser:alice", "type": "DATA_OWNER"}
                ]})),
            )
            .await
            .unwrap();

        // Without cascade the delete is blocked.
        let err = catalog
            .invoke(
                "delete_Dataset",
                OpRequest { params: dataset_params(), ..OpRequest::default() },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "dependency_violation");

        let response = catalog
            .invoke(
                "delete_Dataset",
                OpRequest { params: dataset_params(), cascade: true, ..OpRequest::default() },
            )
            .await
            .unwrap();
        let OpResponse::Deleted(outcome) = response else { panic!("expected delete") };
        assert_eq!(outcome.removed_records, 2);

        let mut tx = catalog
            .pool()
            .store()
            .begin(TxOptions::default())
            .await
            .unwrap();
        let urn = Urn::from(DATASET_URN);
        assert!(tx.node(&urn).await.unwrap().is_none());
        assert!(tx.aspects_of(&urn).await.unwrap().is_empty());
        assert!(tx.incident_edges(&urn).await.unwrap().is_empty());
        // The auto-created owner survives.
        assert!(tx.node(&Urn::from("urn:li:corpuser:alice")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lineage_template_expansion() {
        let catalog = catalog();
        let response = catalog
            .invoke(
                "upsert_columnTransformation_aspect",
                OpRequest {
                    params: [("name", "customer_email_hash")]
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    payload: Some(json!({
                        "transformation_type": "HASHING",
                        "input_columns": ["customer_email"]
                    })),
                    ..OpRequest::default()
                },
            )
            .await
            .unwrap();
        let OpResponse::Write(outcome) = response else { panic!("expected write") };
        assert_eq!(outcome.created_relationships.len(), 1);
        assert_eq!(
            outcome.created_relationships[0].dst.as_str(),
            "urn:li:column:customer_email"
        );

        let mut tx = catalog
            .pool()
            .store()
            .begin(TxOptions::default())
            .await
            .unwrap();
        let edges = tx
            .incident_edges(&Urn::from("urn:li:column:customer_email_hash"))
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].key.edge_type, "DERIVES_FROM");
        assert_eq!(edges[0].properties["subtype"], "HASHING");
        assert_eq!(
            edges[0].properties["description"],
            "Derived via HASHING from customer_email"
        );
    }

    #[tokio::test]
    async fn test_timeseries_appends_and_range_reads() {
        let catalog = catalog();
        for (ts, rows) in [(1_000, 10), (2_000, 20), (3_000, 15)] {
            let response = catalog
                .invoke(
                    "upsert_datasetProfile_aspect",
                    OpRequest {
                        params: dataset_params(),
                        payload: Some(json!({"rowCount": rows})),
                        timestamp_ms: Some(ts),
                        ..OpRequest::default()
                    },
                )
                .await
                .unwrap();
            let OpResponse::Write(outcome) = response else { panic!("expected write") };
            assert_eq!(outcome.timestamp_ms, Some(ts));
            assert_eq!(outcome.version, None);
        }

        let OpResponse::Timeseries(view) = catalog
            .invoke(
                "get_datasetProfile_aspect",
                OpRequest {
                    params: dataset_params(),
                    from: Some(1_500),
                    to: Some(3_000),
                    ..OpRequest::default()
                },
            )
            .await
            .unwrap()
        else {
            panic!("expected timeseries")
        };
        assert_eq!(view.entries.len(), 2);
        assert_eq!(view.entries[0].payload["rowCount"], 20);
    }

    #[tokio::test]
    async fn test_missing_required_field_rejects_before_writing() {
        let catalog = catalog();
        let err = catalog
            .invoke(
                "upsert_datasetProperties_aspect",
                upsert_req(json!({"customProperties": {}})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        // Validation failed pre-transaction: nothing was written, not even
        // the owning entity.
        let mut tx = catalog
            .pool()
            .store()
            .begin(TxOptions::default())
            .await
            .unwrap();
        assert!(tx.node(&Urn::from(DATASET_URN)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_identifying_param_is_urn_error() {
        let catalog = catalog();
        let mut params = dataset_params();
        params.remove("env");
        let err = catalog
            .invoke("upsert_Dataset", OpRequest { params, ..OpRequest::default() })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "urn_construction_error");
    }

    #[tokio::test]
    async fn test_unknown_operation_rejected() {
        let catalog = catalog();
        let err = catalog
            .invoke("upsert_Nothing", OpRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[tokio::test]
    async fn test_get_missing_entity_is_not_found() {
        let catalog = catalog();
        let err = catalog
            .invoke(
                "get_Dataset",
                OpRequest { params: dataset_params(), ..OpRequest::default() },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_upserting_entity_twice_is_idempotent() {
        let catalog = catalog();
        for created in [true, false] {
            let OpResponse::Write(outcome) = catalog
                .invoke(
                    "upsert_Dataset",
                    OpRequest { params: dataset_params(), ..OpRequest::default() },
                )
                .await
                .unwrap()
            else {
                panic!("expected write")
            };
            assert_eq!(outcome.created_entity, created);
            assert_eq!(outcome.urn.as_str(), DATASET_URN);
        }

        let OpResponse::Entity(view) = catalog
            .invoke(
                "get_Dataset",
                OpRequest { params: dataset_params(), ..OpRequest::default() },
            )
            .await
            .unwrap()
        else {
            panic!("expected entity")
        };
        assert!(view.aspects.is_empty());
        assert_eq!(view.params["platform"], "mysql");
    }

    #[tokio::test]
    async fn test_aspect_upsert_by_urn_materializes_owner_with_parsed_params() {
        let catalog = catalog();
        let OpResponse::Write(outcome) = catalog
            .invoke(
                "upsert_datasetProperties_aspect",
                OpRequest {
                    urn: Some(Urn::from(DATASET_URN)),
                    payload: Some(json!({"description": "by-urn"})),
                    ..OpRequest::default()
                },
            )
            .await
            .unwrap()
        else {
            panic!("expected write")
        };
        assert!(outcome.created_entity);

        let OpResponse::Entity(view) = catalog
            .invoke(
                "get_Dataset",
                OpRequest { urn: Some(Urn::from(DATASET_URN)), ..OpRequest::default() },
            )
            .await
            .unwrap()
        else {
            panic!("expected entity")
        };
        // Identifying params recovered from the reversible template.
        assert_eq!(view.params["name"], "test_db.test_table");
    }
}
