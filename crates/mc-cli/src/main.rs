//! Metacat CLI
//!
//! Registry smoke-testing tools: validate a registry document, list the
//! operations it synthesizes, build and parse URNs, and invoke operations
//! against an embedded in-memory store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mc_core::config::AppConfig;
use mc_core::{ParamMap, Urn};
use mc_graph::{MemoryGraph, SessionPool};
use mc_registry::Registry;
use mc_services::{OpRequest, OperationCatalog};

#[derive(Parser)]
#[command(name = "metacat", about = "Registry-driven metadata catalog tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect and validate registry documents
    Registry {
        #[command(subcommand)]
        command: RegistryCommand,
    },
    /// Build and parse URNs from registry templates
    Urn {
        #[command(subcommand)]
        command: UrnCommand,
    },
    /// Invoke a synthesized operation against an embedded in-memory store
    Invoke {
        /// Registry document path
        registry: PathBuf,
        /// Operation name, e.g. upsert_Dataset
        op: String,
        /// Explicit entity URN
        #[arg(long)]
        urn: Option<String>,
        /// Entity parameter, repeatable: --param name=value
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
        /// Aspect payload as inline JSON
        #[arg(long)]
        payload: Option<String>,
        /// Timestamp for time-series appends
        #[arg(long)]
        timestamp_ms: Option<i64>,
        /// Cascade entity deletes
        #[arg(long)]
        cascade: bool,
    },
}

#[derive(Subcommand)]
enum RegistryCommand {
    /// Load and fully validate a registry document
    Validate { path: PathBuf },
    /// List the operations a registry synthesizes
    Ops { path: PathBuf },
}

#[derive(Subcommand)]
enum UrnCommand {
    /// Build an entity URN from parameters
    Build {
        registry: PathBuf,
        entity: String,
        /// Identifying parameter, repeatable: name=value
        #[arg(value_parser = parse_key_value)]
        params: Vec<(String, String)>,
    },
    /// Parse a URN back into parameters (reversible templates only)
    Parse {
        registry: PathBuf,
        entity: String,
        urn: String,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got {raw}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Registry { command } => match command {
            RegistryCommand::Validate { path } => {
                let registry = Registry::from_path(&path)
                    .with_context(|| format!("registry {} failed validation", path.display()))?;
                println!(
                    "ok: {} entities, {} aspects, {} rules",
                    registry.entity_types().count(),
                    registry.aspect_names().count(),
                    registry.relationship_rules().len(),
                );
            }
            RegistryCommand::Ops { path } => {
                let catalog = catalog_for(&path)?;
                for op in catalog.ops() {
                    println!("{}", serde_json::to_string(op)?);
                }
            }
        },
        Command::Urn { command } => match command {
            UrnCommand::Build { registry, entity, params } => {
                let registry = Registry::from_path(&registry)?;
                let template = registry
                    .urn_template(&entity)
                    .with_context(|| format!("unknown entity type {entity}"))?;
                let params: ParamMap = params.into_iter().collect();
                let urn = template.build(&params)?;
                println!("{urn}");
            }
            UrnCommand::Parse { registry, entity, urn } => {
                let registry = Registry::from_path(&registry)?;
                let template = registry
                    .urn_template(&entity)
                    .with_context(|| format!("unknown entity type {entity}"))?;
                if !template.is_reversible() {
                    bail!("template for {entity} is not reversible");
                }
                match template.parse(&urn) {
                    Some(params) => println!("{}", serde_json::to_string_pretty(&params)?),
                    None => bail!("urn does not match the {entity} template"),
                }
            }
        },
        Command::Invoke { registry, op, urn, params, payload, timestamp_ms, cascade } => {
            let catalog = catalog_for(&registry)?;
            catalog.bootstrap().await?;
            let request = OpRequest {
                urn: urn.map(Urn::from),
                params: params.into_iter().collect(),
                payload: payload
                    .map(|raw| serde_json::from_str(&raw).context("payload is not valid JSON"))
                    .transpose()?,
                timestamp_ms,
                cascade,
                ..OpRequest::default()
            };
            match catalog.invoke(&op, request).await {
                Ok(response) => println!("{}", serde_json::to_string_pretty(&response)?),
                Err(err) => bail!("{} ({})", err, err.kind()),
            }
        }
    }
    Ok(())
}

fn catalog_for(path: &PathBuf) -> anyhow::Result<Arc<OperationCatalog>> {
    let registry = Arc::new(Registry::from_path(path)?);
    let config = AppConfig::default();
    let store = Arc::new(MemoryGraph::new());
    let pool = Arc::new(SessionPool::new(store, &config.graph));
    Ok(Arc::new(OperationCatalog::synthesize(registry, pool, &config)))
}
