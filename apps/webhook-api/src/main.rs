//! Webhook API - the ingress surface of the message fabric.
//!
//! Admission order on every request: backpressure gate → rate limiter →
//! adaptive throttle → correlation context → handler. Observability paths
//! bypass the gates.

use admission::{
    backpressure_middleware, rate_limit_middleware, throttle_middleware, AdmissionState,
};
use axum::{middleware, routing::get, Router};
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_messaging::{ConversationStateStore, IdempotencyStore, MessageStream};
use evolution_client::EvolutionClient;
use observability::correlation_middleware;
use resilience::BreakerRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use stream_worker::{connect_with_retry, dlq_admin_router, HealthState, StreamDef, StreamProducer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

mod api;
mod config;
mod openapi;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Install color-eyre first for colored error output
    install_color_eyre();

    // Load configuration from environment variables
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.environment);

    // Initialize Prometheus metrics recorder
    observability::init_metrics();
    info!("Prometheus metrics initialized");

    // Connect to Redis with retry
    let redis = connect_with_retry(&config.redis.url, None)
        .await
        .map_err(|e| eyre::eyre!("Redis connection failed: {}", e))?;

    // Composition root
    let breakers = Arc::new(BreakerRegistry::default());
    let sender = Arc::new(
        EvolutionClient::new(config.gateway.clone(), Arc::clone(&breakers))
            .map_err(|e| eyre::eyre!("Failed to build gateway client: {}", e))?,
    );

    let producer = StreamProducer::from_stream_def::<MessageStream>(redis.clone());
    let conversations = ConversationStateStore::new(redis.clone());
    let idempotency = IdempotencyStore::new(redis.clone());

    let admission_state = AdmissionState::new(
        redis.clone(),
        MessageStream::STREAM_NAME,
        MessageStream::CONSUMER_GROUP,
        config.admission.clone(),
    );

    let state = AppState {
        config: config.clone(),
        redis: redis.clone(),
        producer,
        conversations,
        idempotency,
        sender,
    };

    // DLQ admin surface shares the stream-worker admin router
    let dlq_state = HealthState::new(
        redis.clone(),
        config.app.name,
        config.app.version,
        MessageStream::STREAM_NAME,
    )
    .with_admin_token(config.dlq_admin.admin_token.clone());

    // CORS per configuration
    let cors = if config.admission.allow_any_origin() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .admission
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Layer order (outermost first): CORS → trace → metrics → backpressure
    // → rate limit → throttle → correlation → handlers. Health, metrics and
    // DLQ admin routes bypass the admission gates inside the middleware.
    let stream_info_routes = Router::new()
        .route("/stream/info", get(stream_worker::stream_info_handler))
        .with_state(dlq_state.clone());

    let app = Router::new()
        .merge(api::routes(state.clone()))
        .merge(api::health_routes(state.clone()))
        .merge(dlq_admin_router(dlq_state))
        .merge(stream_info_routes)
        .route("/api-docs/openapi.json", get(openapi_document))
        .route("/metrics", get(observability::metrics_handler))
        .layer(middleware::from_fn(correlation_middleware))
        .layer(middleware::from_fn_with_state(
            admission_state.clone(),
            throttle_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            admission_state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            admission_state,
            backpressure_middleware,
        ))
        .layer(middleware::from_fn(
            observability::middleware::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(config.server.address()).await?;
    info!("Webhook API listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Webhook API shutdown complete");
    Ok(())
}

/// Serve the OpenAPI document.
async fn openapi_document() -> axum::Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;
    axum::Json(openapi::ApiDoc::openapi())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
