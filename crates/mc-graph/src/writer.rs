//! The graph writer: the one component allowed to mutate the store.
//!
//! Every verb operates inside a caller-provided transaction, so a single
//! request can combine an entity upsert, an aspect write, and the
//! relationships derived from it into one atomic commit.

use chrono::Utc;
use mc_core::{CatalogError, ParamMap, Payload, PropertyMap, Urn};

use crate::model::{
    AspectInfo, EdgeKey, NodeRecord, TimeseriesEntry, VersionedAspect,
};
use crate::store::GraphTransaction;

pub struct GraphWriter;

impl GraphWriter {
    /// MERGE an entity node. Non-key params are last-writer-wins on
    /// re-upsert. Returns true when the node was created.
    pub async fn upsert_entity(
        tx: &mut dyn GraphTransaction,
        entity_type: &str,
        urn: &Urn,
        params: &ParamMap,
    ) -> Result<bool, CatalogError> {
        let created = tx.merge_node(entity_type, urn, params).await?;
        tracing::debug!(%urn, entity_type, created, "entity upserted");
        Ok(created)
    }

    /// Write the next version of a versioned aspect and move the latest
    /// pointer to it.
    ///
    /// The new version is `max + 1` for the `(urn, aspect)` pair; the
    /// store's uniqueness constraint turns concurrent writers into one
    /// winner and retryable conflicts for the rest.
    pub async fn upsert_versioned_aspect(
        tx: &mut dyn GraphTransaction,
        urn: &Urn,
        aspect: &str,
        payload: Payload,
    ) -> Result<u64, CatalogError> {
        let version = tx.max_aspect_version(urn, aspect).await?.unwrap_or(0) + 1;
        tx.clear_latest(urn, aspect).await?;
        tx.insert_versioned_aspect(VersionedAspect {
            owner: urn.clone(),
            name: aspect.to_string(),
            version,
            latest: true,
            payload,
            created_at: Utc::now(),
        })
        .await?;
        tracing::debug!(%urn, aspect, version, "versioned aspect written");
        Ok(version)
    }

    /// Append one time-series row. Never conditional: identical timestamps
    /// land as siblings.
    pub async fn append_timeseries_aspect(
        tx: &mut dyn GraphTransaction,
        urn: &Urn,
        aspect: &str,
        payload: Payload,
        timestamp_ms: i64,
    ) -> Result<i64, CatalogError> {
        tx.append_timeseries(TimeseriesEntry {
            owner: urn.clone(),
            name: aspect.to_string(),
            timestamp_ms,
            payload,
            created_at: Utc::now(),
        })
        .await?;
        tracing::debug!(%urn, aspect, timestamp_ms, "timeseries aspect appended");
        Ok(timestamp_ms)
    }

    /// MERGE a relationship edge. The merge key is `(src, type, dst)` plus
    /// the values of `discriminator_keys` found in `properties`; properties
    /// merge last-writer-wins with array union. Returns the key and whether
    /// the edge was created.
    pub async fn create_relationship(
        tx: &mut dyn GraphTransaction,
        src: &Urn,
        edge_type: &str,
        dst: &Urn,
        properties: PropertyMap,
        discriminator_keys: &[String],
        via: Option<&str>,
    ) -> Result<(EdgeKey, bool), CatalogError> {
        let key = EdgeKey::new(src.clone(), edge_type, dst.clone())
            .with_discriminators(discriminator_keys, &properties);
        let created = tx
            .merge_edge(key.clone(), properties, via.map(str::to_string))
            .await?;
        tracing::debug!(%src, %dst, edge_type, created, "relationship merged");
        Ok((key, created))
    }

    /// Delete an entity. With `cascade`, its aspects and incident edges go
    /// with it; without, the delete fails while any aspect or incoming
    /// edge exists (outgoing edges belong to the node and are removed).
    pub async fn delete_entity(
        tx: &mut dyn GraphTransaction,
        entity_type: &str,
        urn: &Urn,
        cascade: bool,
    ) -> Result<(), CatalogError> {
        let node = Self::require_node(tx, entity_type, urn).await?;

        let aspects = tx.aspects_of(urn).await?;
        if !cascade {
            let incoming = tx.edges_to(urn).await?;
            if !aspects.is_empty() || !incoming.is_empty() {
                return Err(CatalogError::DependencyViolation {
                    urn: urn.clone(),
                    message: format!(
                        "{} aspect(s) and {} incoming edge(s) exist; delete with cascade",
                        aspects.len(),
                        incoming.len()
                    ),
                });
            }
        }

        for aspect in &aspects {
            tx.delete_aspect_records(urn, &aspect.name).await?;
        }
        let edges = tx.delete_incident_edges(urn).await?;
        tx.delete_node(urn).await?;
        tracing::debug!(
            %urn,
            entity_type = node.label,
            aspects = aspects.len(),
            edges,
            cascade,
            "entity deleted"
        );
        Ok(())
    }

    /// Delete every record of `(urn, aspect)`: all versions of a
    /// versioned aspect, or all rows of a time-series. The node stays.
    pub async fn delete_aspect(
        tx: &mut dyn GraphTransaction,
        entity_type: &str,
        urn: &Urn,
        aspect: &str,
    ) -> Result<usize, CatalogError> {
        Self::require_node(tx, entity_type, urn).await?;
        let removed = tx.delete_aspect_records(urn, aspect).await?;
        if removed == 0 {
            return Err(CatalogError::NotFound { kind: "aspect", urn: urn.clone() });
        }
        tracing::debug!(%urn, aspect, removed, "aspect deleted");
        Ok(removed)
    }

    pub async fn get_entity(
        tx: &mut dyn GraphTransaction,
        entity_type: &str,
        urn: &Urn,
    ) -> Result<(NodeRecord, Vec<AspectInfo>), CatalogError> {
        let node = Self::require_node(tx, entity_type, urn).await?;
        let aspects = tx.aspects_of(urn).await?;
        Ok((node, aspects))
    }

    pub async fn get_latest_versioned_aspect(
        tx: &mut dyn GraphTransaction,
        urn: &Urn,
        aspect: &str,
    ) -> Result<VersionedAspect, CatalogError> {
        tx.latest_versioned_aspect(urn, aspect)
            .await?
            .ok_or_else(|| CatalogError::NotFound { kind: "aspect", urn: urn.clone() })
    }

    pub async fn get_versioned_aspect(
        tx: &mut dyn GraphTransaction,
        urn: &Urn,
        aspect: &str,
        version: u64,
    ) -> Result<VersionedAspect, CatalogError> {
        tx.versioned_aspect(urn, aspect, version)
            .await?
            .ok_or_else(|| CatalogError::NotFound { kind: "aspect", urn: urn.clone() })
    }

    pub async fn get_timeseries_range(
        tx: &mut dyn GraphTransaction,
        urn: &Urn,
        aspect: &str,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<TimeseriesEntry>, CatalogError> {
        Ok(tx.timeseries_range(urn, aspect, from, to).await?)
    }

    async fn require_node(
        tx: &mut dyn GraphTransaction,
        entity_type: &str,
        urn: &Urn,
    ) -> Result<NodeRecord, CatalogError> {
        match tx.node(urn).await? {
            Some(node) if node.label == entity_type => Ok(node),
            _ => Err(CatalogError::NotFound { kind: "entity", urn: urn.clone() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryGraph;
    use crate::store::{GraphStore, TxOptions};
    use serde_json::json;

    fn urn(value: &str) -> Urn {
        Urn::from(value)
    }

    fn props(value: serde_json::Value) -> PropertyMap {
        value.as_object().unwrap().clone()
    }

    async fn tx(store: &MemoryGraph) -> Box<dyn GraphTransaction> {
        store.begin(TxOptions::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_versions_are_strictly_increasing_with_single_latest() {
        let store = MemoryGraph::new();
        let u = urn("urn:li:dataset:a");
        let mut t = tx(&store).await;
        GraphWriter::upsert_entity(t.as_mut(), "Dataset", &u, &ParamMap::new())
            .await
            .unwrap();
        for expected in 1..=3u64 {
            let version = GraphWriter::upsert_versioned_aspect(
                t.as_mut(),
                &u,
                "datasetProperties",
                json!({"description": format!("v{expected}")}),
            )
            .await
            .unwrap();
            assert_eq!(version, expected);
        }

        let latest = GraphWriter::get_latest_versioned_aspect(t.as_mut(), &u, "datasetProperties")
            .await
            .unwrap();
        assert_eq!(latest.version, 3);
        assert!(latest.latest);
        assert_eq!(latest.payload["description"], "v3");

        for version in 1..=2u64 {
            let record =
                GraphWriter::get_versioned_aspect(t.as_mut(), &u, "datasetProperties", version)
                    .await
                    .unwrap();
            assert!(!record.latest);
        }
    }

    #[tokio::test]
    async fn test_delete_aspect_removes_all_versions_and_keeps_node() {
        let store = MemoryGraph::new();
        let u = urn("urn:li:dataset:a");
        let mut t = tx(&store).await;
        GraphWriter::upsert_entity(t.as_mut(), "Dataset", &u, &ParamMap::new())
            .await
            .unwrap();
        for _ in 0..3 {
            GraphWriter::upsert_versioned_aspect(t.as_mut(), &u, "props", json!({"a": 1}))
                .await
                .unwrap();
        }

        let removed = GraphWriter::delete_aspect(t.as_mut(), "Dataset", &u, "props")
            .await
            .unwrap();
        assert_eq!(removed, 3);
        assert!(t.node(&u).await.unwrap().is_some());

        let err = GraphWriter::get_latest_versioned_aspect(t.as_mut(), &u, "props")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        // A fresh write starts the sequence over.
        let version = GraphWriter::upsert_versioned_aspect(t.as_mut(), &u, "props", json!({}))
            .await
            .unwrap();
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn test_cascade_delete_removes_exactly_the_entity() {
        let store = MemoryGraph::new();
        let dataset = urn("urn:li:dataset:a");
        let user = urn("urn:li:corpuser:alice");
        let mut t = tx(&store).await;
        GraphWriter::upsert_entity(t.as_mut(), "Dataset", &dataset, &ParamMap::new())
            .await
            .unwrap();
        GraphWriter::upsert_entity(t.as_mut(), "CorpUser", &user, &ParamMap::new())
            .await
            .unwrap();
        GraphWriter::upsert_versioned_aspect(t.as_mut(), &dataset, "props", json!({}))
            .await
            .unwrap();
        GraphWriter::append_timeseries_aspect(t.as_mut(), &dataset, "profile", json!({}), 100)
            .await
            .unwrap();
        GraphWriter::create_relationship(
            t.as_mut(),
            &dataset,
            "OWNED_BY",
            &user,
            props(json!({"type": "DATA_OWNER"})),
            &["type".to_string()],
            Some("ownership"),
        )
        .await
        .unwrap();

        GraphWriter::delete_entity(t.as_mut(), "Dataset", &dataset, true)
            .await
            .unwrap();

        assert!(t.node(&dataset).await.unwrap().is_none());
        assert!(t.aspects_of(&dataset).await.unwrap().is_empty());
        assert!(t.incident_edges(&dataset).await.unwrap().is_empty());
        // The other endpoint is untouched.
        assert!(t.node(&user).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_non_cascade_delete_blocks_on_dependents() {
        let store = MemoryGraph::new();
        let u = urn("urn:li:dataset:a");
        let mut t = tx(&store).await;
        GraphWriter::upsert_entity(t.as_mut(), "Dataset", &u, &ParamMap::new())
            .await
            .unwrap();
        GraphWriter::upsert_versioned_aspect(t.as_mut(), &u, "props", json!({}))
            .await
            .unwrap();

        let err = GraphWriter::delete_entity(t.as_mut(), "Dataset", &u, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "dependency_violation");
        assert!(t.node(&u).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_non_cascade_delete_allows_bare_node_with_outgoing_edge() {
        let store = MemoryGraph::new();
        let src = urn("urn:li:dataset:a");
        let dst = urn("urn:li:corpuser:alice");
        let mut t = tx(&store).await;
        GraphWriter::upsert_entity(t.as_mut(), "Dataset", &src, &ParamMap::new())
            .await
            .unwrap();
        GraphWriter::upsert_entity(t.as_mut(), "CorpUser", &dst, &ParamMap::new())
            .await
            .unwrap();
        GraphWriter::create_relationship(
            t.as_mut(),
            &src,
            "OWNED_BY",
            &dst,
            PropertyMap::new(),
            &[],
            None,
        )
        .await
        .unwrap();

        // The destination has an incoming edge, so it is blocked...
        let err = GraphWriter::delete_entity(t.as_mut(), "CorpUser", &dst, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "dependency_violation");

        // ...while the source only has an outgoing edge and may go.
        GraphWriter::delete_entity(t.as_mut(), "Dataset", &src, false)
            .await
            .unwrap();
        assert!(t.node(&src).await.unwrap().is_none());
        assert!(t.incident_edges(&dst).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relationship_is_idempotent_with_property_merge() {
        let store = MemoryGraph::new();
        let src = urn("urn:li:dataset:a");
        let dst = urn("urn:li:corpuser:alice");
        let mut t = tx(&store).await;
        GraphWriter::upsert_entity(t.as_mut(), "Dataset", &src, &ParamMap::new())
            .await
            .unwrap();
        GraphWriter::upsert_entity(t.as_mut(), "CorpUser", &dst, &ParamMap::new())
            .await
            .unwrap();

        let discriminators = ["type".to_string()];
        let (_, created) = GraphWriter::create_relationship(
            t.as_mut(),
            &src,
            "OWNED_BY",
            &dst,
            props(json!({"type": "DATA_OWNER", "tags": ["a"]})),
            &discriminators,
            Some("ownership"),
        )
        .await
        .unwrap();
        assert!(created);

        let (key, created) = GraphWriter::create_relationship(
            t.as_mut(),
            &src,
            "OWNED_BY",
            &dst,
            props(json!({"type": "DATA_OWNER", "tags": ["b"]})),
            &discriminators,
            Some("ownership"),
        )
        .await
        .unwrap();
        assert!(!created);

        let edges = t.incident_edges(&src).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].key, key);
        assert_eq!(edges[0].properties["tags"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_delete_missing_entity_is_not_found() {
        let store = MemoryGraph::new();
        let mut t = tx(&store).await;
        let err = GraphWriter::delete_entity(t.as_mut(), "Dataset", &urn("urn:li:dataset:x"), true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
