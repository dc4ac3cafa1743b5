use std::sync::Arc;

use airweave_entities::{EntityDefinitionId, EntityDefinitionRegistry};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use mimalloc::MiMalloc;
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use airweave_sync::action_resolver::ActionResolverConfig;
use airweave_sync::config::SyncEngineConfig;
use airweave_sync::dag::{Dag, DagEdge, DagNode, DagNodeId, DagRouter, TransformerRegistry};
use airweave_sync::db::SyncJobStatus;
use airweave_sync::destinations::{Destinations, Neo4jDestination, QdrantDestination};
use airweave_sync::file_service::FileService;
use airweave_sync::orchestrator::{Orchestrator, SyncContext};
use airweave_sync::sources::{AsanaLikeConnectorFactory, Neo4jTableConnectorFactory, SourceRegistry};
use airweave_sync::token_manager::{TokenManager, TokenSource};
use airweave_sync::{db, error::SyncFailureError};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const SYNC_JOB_SPEC_FILE: &str = "sync.toml";

/// Which compiled-in source connector to run and where to send its
/// entities. One job per process — scheduling multiple jobs, or re-running
/// this binary on a cadence, is the external collaborator's job (spec.md
/// §1's non-goals), not this binary's.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct SyncJobSpec {
    #[serde(default = "default_sync_name")]
    sync_name: String,
    #[serde(default = "default_collection_id")]
    collection_id: String,
    #[serde(default)]
    dedupe_by_collection: bool,
    #[serde(default = "default_source_name")]
    source_name: String,
    #[serde(default = "default_source_config")]
    source_config: serde_json::Value,
    #[serde(default)]
    source_token: String,
    #[serde(default = "default_destination_kind")]
    destination_kind: String,
    #[serde(default = "default_destination_name")]
    destination_name: String,
    #[serde(default = "default_neo4j_user")]
    neo4j_user: String,
    #[serde(default)]
    neo4j_password: String,
    #[serde(default)]
    skip_hash_comparison: bool,
}

impl Default for SyncJobSpec {
    fn default() -> Self {
        Self {
            sync_name: default_sync_name(),
            collection_id: default_collection_id(),
            dedupe_by_collection: false,
            source_name: default_source_name(),
            source_config: default_source_config(),
            source_token: String::new(),
            destination_kind: default_destination_kind(),
            destination_name: default_destination_name(),
            neo4j_user: default_neo4j_user(),
            neo4j_password: String::new(),
            skip_hash_comparison: false,
        }
    }
}

impl SyncJobSpec {
    fn load() -> Self {
        Figment::new()
            .merge(Serialized::defaults(SyncJobSpec::default()))
            .merge(Toml::file(SYNC_JOB_SPEC_FILE))
            .merge(Env::prefixed("AIRWEAVE_SYNC_JOB_"))
            .extract()
            .unwrap_or_else(|err| panic!("failed to extract sync job spec: {err}"))
    }
}

fn default_sync_name() -> String {
    "demo-sync".to_string()
}

fn default_collection_id() -> String {
    "demo-collection".to_string()
}

fn default_source_name() -> String {
    "asana_like".to_string()
}

fn default_source_config() -> serde_json::Value {
    serde_json::json!({ "base_url": "https://app.asana.com/api/1.0", "project_gid": "" })
}

fn default_destination_kind() -> String {
    "qdrant".to_string()
}

fn default_destination_name() -> String {
    "primary".to_string()
}

fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncEngineConfig::load_validated();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_level(true).with_target(false))
        .init();

    let spec = SyncJobSpec::load();

    let db = db::spawn(&config.database_url).await;

    let mut entity_definition_map = EntityDefinitionRegistry::new();
    entity_definition_map.register("asana_task", EntityDefinitionId::new("asana_task"));

    let mut source_registry = SourceRegistry::new();
    source_registry.register("asana_like", Box::new(AsanaLikeConnectorFactory));
    source_registry.register("neo4j_table", Box::new(Neo4jTableConnectorFactory));
    let source = source_registry.create(&spec.source_name, spec.source_config.clone())?;

    let token_manager = Arc::new(TokenManager::new(
        TokenSource::DirectInjection(spec.source_token.clone()),
        &config,
    ));
    let file_service = Arc::new(FileService::new(&config));

    let mut destinations = Destinations::new(spec.collection_id.clone());
    match spec.destination_kind.as_str() {
        "qdrant" => {
            destinations.register_vector(
                spec.destination_name.clone(),
                Arc::new(QdrantDestination::new(config.qdrant_url.clone(), None)),
            );
        }
        "neo4j" => {
            let graph =
                Neo4jDestination::connect(&config.neo4j_url, &spec.neo4j_user, &spec.neo4j_password).await?;
            destinations.register_graph(spec.destination_name.clone(), Arc::new(graph));
        }
        other => return Err(format!("unknown destination kind {other:?} in {SYNC_JOB_SPEC_FILE}").into()),
    }
    let destinations = Arc::new(destinations);

    let source_node = DagNodeId("source".to_string());
    let destination_node = DagNodeId("destination".to_string());
    let dag = Dag {
        nodes: vec![
            DagNode::Source { id: source_node.clone() },
            DagNode::Destination { id: destination_node.clone(), name: spec.destination_name.clone() },
        ],
        edges: vec![DagEdge { from: source_node.clone(), to: destination_node, entity_definition_filter: None }],
    };
    let router = Arc::new(DagRouter::new(dag, TransformerRegistry::new())?);

    let context = SyncContext {
        sync_name: spec.sync_name,
        collection_id: spec.collection_id,
        dedupe_by_collection: spec.dedupe_by_collection,
        source,
        destinations,
        router,
        dag_producer: source_node,
        token_manager,
        file_service,
        db,
        embedder: None,
        entity_definition_map,
        execution_config: ActionResolverConfig { skip_hash_comparison: spec.skip_hash_comparison },
        config,
    };

    let cancellation = CancellationToken::new();
    let shutdown_token = cancellation.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, requesting graceful cancellation");
        shutdown_token.cancel();
    });

    let job_row = Orchestrator::run(context, cancellation).await?;
    match job_row.status() {
        Some(SyncJobStatus::Completed) => {
            info!(job_id = %job_row.job_id(), "sync job completed");
            Ok(())
        }
        Some(status) => {
            error!(job_id = %job_row.job_id(), status = status.as_str(), error = ?job_row.error, "sync job did not complete");
            std::process::exit(1);
        }
        None => Err(Box::new(SyncFailureError::Unexpected(format!(
            "sync job {} has unrecognized status {:?}",
            job_row.job_id(),
            job_row.status
        )))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
