//! The write coordinator: one transaction per request, with deadline
//! propagation and bounded retries on store conflicts.
//!
//! Everything a request writes (the owning entity, the aspect record, the
//! relationships its payload triggers) commits atomically or not at all.
//! Versioned-aspect races surface as store conflicts; the whole
//! transaction is retried with jittered exponential backoff and the loser
//! observes the new max version.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use mc_core::config::RetryConfig;
use mc_core::{AspectKind, CatalogError, CatalogResult, CorrelationId, ParamMap, Payload, Urn};
use mc_graph::{GraphTransaction, GraphWriter, SessionPool, TxOptions};
use mc_registry::{validate_aspect_write, EntityType, Registry};
use mc_rules::{AspectWrite, EndpointSpec, PlannedEdge, RuleEngine};
use rand::Rng;

use crate::descriptor::OpDescriptor;
use crate::request::{
    AspectView, CreatedRelationship, DeleteOutcome, EntityView, OpOutcome, OpRequest, OpResponse,
    TimeseriesPoint, TimeseriesView,
};

/// The resolved target of an operation: which entity, which node.
struct Target {
    entity_type: String,
    urn: Urn,
    /// Params stored on the node when the operation materializes it.
    node_params: ParamMap,
}

pub struct WriteCoordinator {
    registry: Arc<Registry>,
    pool: Arc<SessionPool>,
    retry: RetryConfig,
    default_deadline: Duration,
}

impl WriteCoordinator {
    pub fn new(
        registry: Arc<Registry>,
        pool: Arc<SessionPool>,
        retry: RetryConfig,
        default_deadline: Duration,
    ) -> Self {
        Self { registry, pool, retry, default_deadline }
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Entity operations
    // ------------------------------------------------------------------

    pub async fn upsert_entity(
        &self,
        desc: &OpDescriptor,
        req: OpRequest,
    ) -> CatalogResult<OpOutcome> {
        let correlation_id = correlation(&req);
        let deadline = self.deadline(&req);
        let target = self.resolve_entity(desc, &req)?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = async {
                let session = self.pool.acquire(Some(deadline)).await?;
                let mut tx = session.begin(TxOptions::with_deadline(deadline)).await?;
                let created = GraphWriter::upsert_entity(
                    tx.as_mut(),
                    &target.entity_type,
                    &target.urn,
                    &target.node_params,
                )
                .await?;
                tx.commit().await?;
                Ok(OpOutcome {
                    urn: target.urn.clone(),
                    version: None,
                    timestamp_ms: None,
                    created_entity: created,
                    created_relationships: Vec::new(),
                    correlation_id,
                })
            }
            .await;

            match result {
                Err(CatalogError::StoreConflict { message, .. }) => {
                    self.handle_conflict(&desc.name, correlation_id, attempt, message).await?;
                }
                other => return other,
            }
        }
    }

    pub async fn get_entity(
        &self,
        desc: &OpDescriptor,
        req: OpRequest,
    ) -> CatalogResult<EntityView> {
        let deadline = self.deadline(&req);
        let target = self.resolve_entity(desc, &req)?;

        let session = self.pool.acquire(Some(deadline)).await?;
        let mut tx = session.begin(TxOptions::with_deadline(deadline)).await?;
        let (node, aspects) =
            GraphWriter::get_entity(tx.as_mut(), &target.entity_type, &target.urn).await?;
        tx.commit().await?;

        Ok(EntityView {
            urn: node.urn,
            entity_type: node.label,
            params: node.params,
            created_at: node.created_at,
            updated_at: node.updated_at,
            aspects,
        })
    }

    pub async fn delete_entity(
        &self,
        desc: &OpDescriptor,
        req: OpRequest,
    ) -> CatalogResult<DeleteOutcome> {
        let correlation_id = correlation(&req);
        let deadline = self.deadline(&req);
        let target = self.resolve_entity(desc, &req)?;
        let cascade = req.cascade;

        let session = self.pool.acquire(Some(deadline)).await?;
        let mut tx = session.begin(TxOptions::with_deadline(deadline)).await?;
        let (_, aspects) =
            GraphWriter::get_entity(tx.as_mut(), &target.entity_type, &target.urn).await?;
        let removed_records = aspects.iter().map(|a| a.records).sum();
        GraphWriter::delete_entity(tx.as_mut(), &target.entity_type, &target.urn, cascade).await?;
        tx.commit().await?;

        Ok(DeleteOutcome { urn: target.urn, removed_records, correlation_id })
    }

    // ------------------------------------------------------------------
    // Aspect operations
    // ------------------------------------------------------------------

    pub async fn upsert_aspect(
        &self,
        desc: &OpDescriptor,
        req: OpRequest,
    ) -> CatalogResult<OpOutcome> {
        let correlation_id = correlation(&req);
        let deadline = self.deadline(&req);
        let aspect = descriptor_aspect(desc);
        let kind = descriptor_kind(desc);
        let target = self.resolve_aspect_owner(desc, &req)?;

        let payload = req
            .payload
            .clone()
            .ok_or_else(|| CatalogError::validation("payload", "aspect upserts require a payload"))?;
        validate_aspect_write(&self.registry, &target.entity_type, aspect, &payload, kind)?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = self
                .try_upsert_aspect(aspect, kind, &target, &payload, &req, correlation_id, deadline)
                .await;
            match result {
                Err(CatalogError::StoreConflict { message, .. }) => {
                    self.handle_conflict(&desc.name, correlation_id, attempt, message).await?;
                }
                other => return other,
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_upsert_aspect(
        &self,
        aspect: &str,
        kind: AspectKind,
        target: &Target,
        payload: &Payload,
        req: &OpRequest,
        correlation_id: CorrelationId,
        deadline: Instant,
    ) -> CatalogResult<OpOutcome> {
        let session = self.pool.acquire(Some(deadline)).await?;
        let mut tx = session.begin(TxOptions::with_deadline(deadline)).await?;

        let created_entity = GraphWriter::upsert_entity(
            tx.as_mut(),
            &target.entity_type,
            &target.urn,
            &target.node_params,
        )
        .await?;

        let (version, timestamp_ms) = match kind {
            AspectKind::Versioned => {
                let version = GraphWriter::upsert_versioned_aspect(
                    tx.as_mut(),
                    &target.urn,
                    aspect,
                    payload.clone(),
                )
                .await?;
                (Some(version), None)
            }
            AspectKind::Timeseries => {
                let timestamp_ms =
                    req.timestamp_ms.unwrap_or_else(|| Utc::now().timestamp_millis());
                GraphWriter::append_timeseries_aspect(
                    tx.as_mut(),
                    &target.urn,
                    aspect,
                    payload.clone(),
                    timestamp_ms,
                )
                .await?;
                (None, Some(timestamp_ms))
            }
        };

        let planned = RuleEngine::new(&self.registry)
            .plan(&AspectWrite {
                entity_type: &target.entity_type,
                owner: &target.urn,
                aspect,
                payload,
            })
            .map_err(CatalogError::from)?;
        let created_relationships = self.apply_planned_edges(tx.as_mut(), &planned).await?;

        tx.commit().await?;
        tracing::info!(
            %correlation_id,
            urn = %target.urn,
            aspect,
            ?version,
            relationships = created_relationships.len(),
            "aspect write committed"
        );

        Ok(OpOutcome {
            urn: target.urn.clone(),
            version,
            timestamp_ms,
            created_entity,
            created_relationships,
            correlation_id,
        })
    }

    async fn apply_planned_edges(
        &self,
        tx: &mut dyn GraphTransaction,
        planned: &[PlannedEdge],
    ) -> CatalogResult<Vec<CreatedRelationship>> {
        let mut created_relationships = Vec::new();
        for edge in planned {
            let src_ok = self.ensure_endpoint(tx, &edge.src, &edge.src_endpoint).await?;
            let dst_ok = self.ensure_endpoint(tx, &edge.dst, &edge.dst_endpoint).await?;
            if !src_ok || !dst_ok {
                tracing::warn!(
                    rule = %edge.rule,
                    src = %edge.src,
                    dst = %edge.dst,
                    "endpoint missing and rule does not auto-create; edge skipped"
                );
                continue;
            }
            let (key, created) = GraphWriter::create_relationship(
                tx,
                &edge.src,
                &edge.edge_type,
                &edge.dst,
                edge.properties.clone(),
                &edge.discriminators,
                Some(&edge.via),
            )
            .await?;
            created_relationships.push(CreatedRelationship {
                src: key.src,
                edge_type: key.edge_type,
                dst: key.dst,
                created,
            });
        }
        Ok(created_relationships)
    }

    /// Check an edge endpoint exists, materializing a bare node when the
    /// rule opts in. Auto-created nodes carry URN-only attributes and
    /// never aspects.
    async fn ensure_endpoint(
        &self,
        tx: &mut dyn GraphTransaction,
        urn: &Urn,
        endpoint: &EndpointSpec,
    ) -> CatalogResult<bool> {
        if tx.node(urn).await?.is_some() {
            return Ok(true);
        }
        if !endpoint.auto_create {
            return Ok(false);
        }
        let Some(entity_type) = &endpoint.entity_type else {
            return Ok(false);
        };
        GraphWriter::upsert_entity(tx, entity_type, urn, &ParamMap::new()).await?;
        tracing::debug!(%urn, entity_type, "entity auto-created for relationship");
        Ok(true)
    }

    pub async fn get_aspect(
        &self,
        desc: &OpDescriptor,
        req: OpRequest,
    ) -> CatalogResult<OpResponse> {
        let deadline = self.deadline(&req);
        let aspect = descriptor_aspect(desc);
        let kind = descriptor_kind(desc);
        let target = self.resolve_aspect_owner(desc, &req)?;

        let session = self.pool.acquire(Some(deadline)).await?;
        let mut tx = session.begin(TxOptions::with_deadline(deadline)).await?;
        if tx.node(&target.urn).await?.is_none() {
            return Err(CatalogError::NotFound { kind: "entity", urn: target.urn.clone() });
        }

        let response = match kind {
            AspectKind::Versioned => {
                let record = match req.version {
                    Some(version) => {
                        GraphWriter::get_versioned_aspect(tx.as_mut(), &target.urn, aspect, version)
                            .await?
                    }
                    None => {
                        GraphWriter::get_latest_versioned_aspect(tx.as_mut(), &target.urn, aspect)
                            .await?
                    }
                };
                OpResponse::Aspect(AspectView {
                    urn: target.urn.clone(),
                    name: record.name,
                    kind,
                    version: record.version,
                    latest: record.latest,
                    payload: record.payload,
                    created_at: record.created_at,
                })
            }
            AspectKind::Timeseries => {
                let rows = GraphWriter::get_timeseries_range(
                    tx.as_mut(),
                    &target.urn,
                    aspect,
                    req.from,
                    req.to,
                )
                .await?;
                OpResponse::Timeseries(TimeseriesView {
                    urn: target.urn.clone(),
                    name: aspect.to_string(),
                    entries: rows
                        .into_iter()
                        .map(|row| TimeseriesPoint {
                            timestamp_ms: row.timestamp_ms,
                            payload: row.payload,
                        })
                        .collect(),
                })
            }
        };
        tx.commit().await?;
        Ok(response)
    }

    pub async fn delete_aspect(
        &self,
        desc: &OpDescriptor,
        req: OpRequest,
    ) -> CatalogResult<DeleteOutcome> {
        let correlation_id = correlation(&req);
        let deadline = self.deadline(&req);
        let aspect = descriptor_aspect(desc);
        let target = self.resolve_aspect_owner(desc, &req)?;

        let session = self.pool.acquire(Some(deadline)).await?;
        let mut tx = session.begin(TxOptions::with_deadline(deadline)).await?;
        let removed_records =
            GraphWriter::delete_aspect(tx.as_mut(), &target.entity_type, &target.urn, aspect)
                .await?;
        tx.commit().await?;

        Ok(DeleteOutcome { urn: target.urn, removed_records, correlation_id })
    }

    // ------------------------------------------------------------------
    // Resolution helpers
    // ------------------------------------------------------------------

    fn resolve_entity(&self, desc: &OpDescriptor, req: &OpRequest) -> CatalogResult<Target> {
        let entity_type = desc
            .entity_type
            .clone()
            .ok_or_else(|| CatalogError::internal("entity op descriptor without entity type"))?;
        let entity = self
            .registry
            .entity(&entity_type)
            .ok_or_else(|| CatalogError::internal(format!("unknown entity {entity_type}")))?;
        self.target_for(entity, req)
    }

    fn resolve_aspect_owner(&self, desc: &OpDescriptor, req: &OpRequest) -> CatalogResult<Target> {
        let aspect = descriptor_aspect(desc);
        let declaring = self.registry.entities_declaring(aspect);

        let entity: &EntityType = if let Some(entity_type) = &req.entity_type {
            declaring
                .iter()
                .copied()
                .find(|e| &e.name == entity_type)
                .ok_or_else(|| {
                    CatalogError::validation(
                        "entity_type",
                        format!("aspect {aspect} is not declared on entity {entity_type}"),
                    )
                })?
        } else if declaring.len() == 1 {
            declaring[0]
        } else if let Some(urn) = &req.urn {
            declaring
                .iter()
                .copied()
                .find(|e| e.template.parse(urn.as_str()).is_some())
                .ok_or_else(|| {
                    CatalogError::validation(
                        "urn",
                        format!("no entity declaring aspect {aspect} matches urn {urn}"),
                    )
                })?
        } else {
            return Err(CatalogError::validation(
                "entity_type",
                format!("aspect {aspect} is declared on multiple entities; specify entity_type"),
            ));
        };

        self.target_for(entity, req)
    }

    fn target_for(&self, entity: &EntityType, req: &OpRequest) -> CatalogResult<Target> {
        let urn = match &req.urn {
            Some(urn) => urn.clone(),
            None => entity.template.build(&req.params).map_err(|err| {
                CatalogError::UrnConstruction {
                    entity_type: entity.name.clone(),
                    message: err.to_string(),
                }
            })?,
        };
        let node_params = if !req.params.is_empty() {
            req.params.clone()
        } else {
            entity.template.parse(urn.as_str()).unwrap_or_default()
        };
        Ok(Target { entity_type: entity.name.clone(), urn, node_params })
    }

    // ------------------------------------------------------------------
    // Retry plumbing
    // ------------------------------------------------------------------

    fn deadline(&self, req: &OpRequest) -> Instant {
        let budget = req
            .deadline_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_deadline);
        Instant::now() + budget
    }

    /// Sleep before the next attempt, or surface the exhausted conflict.
    async fn handle_conflict(
        &self,
        op: &str,
        correlation_id: CorrelationId,
        attempt: u32,
        message: String,
    ) -> CatalogResult<()> {
        if attempt >= self.retry.max_attempts {
            return Err(CatalogError::StoreConflict { attempts: attempt, message });
        }
        let delay = self.backoff(attempt);
        tracing::warn!(
            op,
            %correlation_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "store conflict, retrying"
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let cap = self
            .retry
            .base_delay_ms
            .saturating_mul(1u64 << shift)
            .min(self.retry.max_delay_ms)
            .max(1);
        let jittered = rand::thread_rng().gen_range(cap / 2..=cap).max(1);
        Duration::from_millis(jittered)
    }
}

fn correlation(req: &OpRequest) -> CorrelationId {
    req.correlation_id.unwrap_or_else(CorrelationId::generate)
}

fn descriptor_aspect(desc: &OpDescriptor) -> &str {
    desc.aspect.as_deref().unwrap_or_default()
}

fn descriptor_kind(desc: &OpDescriptor) -> AspectKind {
    desc.aspect_kind.unwrap_or(AspectKind::Versioned)
}
