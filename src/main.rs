use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sellsy_leads::circuit_breaker::create_upstream_circuit_breaker;
use sellsy_leads::config::Config;
use sellsy_leads::errors::ResultExt;
use sellsy_leads::handlers::{self, AppState};
use sellsy_leads::pipeline::PipelineContext;

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading (fails fast on missing Sellsy credentials).
/// - The ingestion pipeline and its token cache.
/// - The dataset cache and upstream circuit breaker.
/// - HTTP routes and middleware (CORS, Rate Limiting).
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sellsy_leads=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Validates the step alias table and builds the HTTP clients
    let pipeline =
        PipelineContext::from_config(&config).context("Failed to build ingestion pipeline")?;
    tracing::info!("Ingestion pipeline initialized");

    let app_state = Arc::new(AppState::new(
        config.clone(),
        pipeline,
        create_upstream_circuit_breaker(),
    ));
    tracing::info!(
        "Dataset cache initialized ({}s refresh interval)",
        config.refresh_interval_secs
    );

    // Warm the cache so the first request does not pay for a full run
    let warmup_state = app_state.clone();
    tokio::spawn(async move {
        match warmup_state.dataset().await {
            Ok(dataset) => tracing::info!("✓ Initial dataset ready: {} leads", dataset.leads.len()),
            Err(e) => tracing::error!("Initial ingestion failed: {}", e),
        }
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = Router::new()
        .route("/api/v1/leads", get(handlers::list_leads))
        .route("/api/v1/leads/summary", get(handlers::leads_summary))
        .route("/api/v1/pipelines", get(handlers::filter_options))
        .route("/api/v1/departments", get(handlers::list_departments))
        .layer(ServiceBuilder::new().layer(GovernorLayer {
            config: governor_conf,
        }));

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
