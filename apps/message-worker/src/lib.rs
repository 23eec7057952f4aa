//! Message Worker Service
//!
//! A background worker that processes inbound WhatsApp messages from the
//! Redis stream and routes replies back through the gateway.
//!
//! ## Architecture
//!
//! ```text
//! Redis Stream (messages:stream)
//!   ↓ (Consumer Group: processors)
//! StreamWorker<ProcessingJob, MessageProcessor>
//!   ↓ (selects + executes a workflow)
//! WorkflowEngine ──→ Agents (transcription, RAG, memory, web search)
//!   ↓ (reply)
//! Evolution API gateway
//! ```
//!
//! ## Features
//!
//! - Consumer group support for horizontal scaling
//! - Auto-claim of entries abandoned by crashed workers
//! - Retry with exponential backoff and a dead letter queue
//! - Exactly-once reply delivery via a processed-set guard
//! - Admission-derived execution deadlines with cooperative cancellation
//! - Health check and DLQ admin endpoints on a dedicated port

mod processor;

pub use processor::MessageProcessor;

use admission::LoadMonitor;
use agent_client::HttpAgentDispatcher;
use axum::Router;
use core_config::admission::{AdmissionConfig, DlqAdminConfig};
use core_config::agents::AgentsConfig;
use core_config::gateway::GatewayConfig;
use core_config::llm::LlmConfig;
use core_config::redis::RedisConfig;
use core_config::{app_info, Environment, FromEnv};
use domain_messaging::{IdempotencyStore, MessageStream, ProcessingJob};
use domain_workflows::{build_registry, HttpChatModel, WorkflowEngine};
use evolution_client::EvolutionClient;
use eyre::{Result, WrapErr};
use resilience::BreakerRegistry;
use std::sync::Arc;
use stream_worker::{
    connect_with_retry, full_admin_router, metrics, HealthState, StreamDef, StreamProducer,
    StreamWorker, WorkerConfig,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Start the health and admin HTTP server
///
/// Provides endpoints for:
/// - Liveness probes: `/health`, `/health/live`
/// - Readiness probes: `/health/ready`
/// - Stream monitoring: `/stream/info`
/// - Prometheus metrics: `/metrics`
/// - DLQ admin: `/admin/dlq/*`
async fn start_health_server(health_state: HealthState, port: u16) -> Result<()> {
    let app: Router = full_admin_router(health_state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", addr))?;

    info!(port = %port, "Health and admin server listening");

    axum::serve(listener, app)
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Run the message worker
///
/// This is the main entry point for the worker. It:
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Connects to Redis for stream processing and conversation state
/// 3. Builds the agent dispatcher, gateway client and workflow engine
/// 4. Starts the worker with graceful shutdown handling
pub async fn run() -> Result<()> {
    // Initialize tracing (env-aware: JSON for prod, pretty for dev)
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    // Initialize Prometheus metrics
    metrics::init_metrics();

    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, "Starting message worker service");
    info!("Environment: {:?}", environment);

    // Health server port (default 8082)
    let health_port: u16 = std::env::var("WORKER_HEALTH_PORT")
        .or_else(|_| std::env::var("HEALTH_PORT"))
        .unwrap_or_else(|_| "8082".to_string())
        .parse()
        .unwrap_or(8082);

    // Load configuration from the environment
    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    let gateway_config =
        GatewayConfig::from_env().wrap_err("Failed to load gateway configuration")?;
    let agents_config = AgentsConfig::from_env().wrap_err("Failed to load agents configuration")?;
    let llm_config = LlmConfig::from_env().wrap_err("Failed to load LLM configuration")?;
    let admission_config =
        AdmissionConfig::from_env().wrap_err("Failed to load admission configuration")?;
    let dlq_admin_config =
        DlqAdminConfig::from_env().wrap_err("Failed to load DLQ admin configuration")?;

    // Connect to Redis with retry logic
    info!("Connecting to Redis...");
    let redis = connect_with_retry(&redis_config.url, None)
        .await
        .wrap_err("Failed to connect to Redis")?;
    info!("Connected to Redis successfully");

    // Composition root: breakers, clients, LLM, workflow engine
    let breakers = Arc::new(BreakerRegistry::default());

    let dispatcher = Arc::new(
        HttpAgentDispatcher::new(agents_config, Arc::clone(&breakers))
            .map_err(|e| eyre::eyre!("{}", e))?,
    );

    let sender = Arc::new(
        EvolutionClient::new(gateway_config, Arc::clone(&breakers))
            .map_err(|e| eyre::eyre!("{}", e))?,
    );

    let chat_model = HttpChatModel::from_config(&llm_config, environment.is_development())
        .map_err(|e| eyre::eyre!("{}", e))?;

    let definitions =
        build_registry(dispatcher, chat_model).map_err(|e| eyre::eyre!("{}", e))?;
    let engine = Arc::new(WorkflowEngine::new(definitions));
    info!(workflows = ?engine.workflow_names(), "Workflow engine ready");

    // Worker configuration from the message stream definition
    let worker_config = WorkerConfig::from_stream_def::<MessageStream>();
    info!(
        stream = %worker_config.stream_name,
        consumer_group = %worker_config.consumer_group,
        consumer_id = %worker_config.consumer_id,
        batch_size = %worker_config.batch_size,
        block_ms = %worker_config.block_ms,
        "Worker configuration loaded"
    );

    // The processor and its collaborators
    let monitor = Arc::new(LoadMonitor::new(
        redis.clone(),
        MessageStream::STREAM_NAME,
        MessageStream::CONSUMER_GROUP,
        admission_config,
    ));
    let producer = StreamProducer::from_stream_def::<MessageStream>(redis.clone());
    let idempotency = IdempotencyStore::new(redis.clone());

    let processor = MessageProcessor::new(engine, sender, idempotency, producer, monitor);
    info!("Message processor initialized");

    // Set up a shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    // Health and admin server on its own port
    let health_state = HealthState::new(
        redis.clone(),
        app_info.name,
        app_info.version,
        worker_config.stream_name.clone(),
    )
    .with_admin_token(dlq_admin_config.admin_token);

    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_port).await {
            error!(error = %e, "Health server failed");
        }
    });

    // Run the worker
    info!("Starting message processor loop...");
    let worker = StreamWorker::<ProcessingJob, _>::new(redis, processor, worker_config);
    worker
        .run(shutdown_rx)
        .await
        .map_err(|e| eyre::eyre!("{}", e))?;

    info!("Message worker service stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
