//! Chirp server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, middleware, routing::get};
use chirp_api::{AppState, auth_middleware, router as api_router};
use chirp_common::{Config, config::RedisConfig};
use chirp_core::{
    HttpIdentityProvider, IdentityGateway, InMemorySlidingWindow, PostRateLimiter, PostService,
    ProfileService, RateLimitConfig, RedisSlidingWindow, SlidingWindowStore,
};
use chirp_db::repositories::PostRepository;
use fred::prelude::*;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Connect the shared counter store, or fall back to process-local windows.
async fn counter_store(
    redis: Option<&RedisConfig>,
    limits: RateLimitConfig,
) -> Result<Arc<dyn SlidingWindowStore>, Box<dyn std::error::Error>> {
    let Some(redis) = redis else {
        info!("No Redis configured, using in-memory rate limiting (single instance only)");
        let store = InMemorySlidingWindow::new();

        // Keys for authors who stopped posting would otherwise linger
        let sweeper = store.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limits.window.max(Duration::from_secs(1)));
            loop {
                interval.tick().await;
                sweeper.cleanup(limits.window).await;
            }
        });

        return Ok(Arc::new(store));
    };

    info!("Connecting to Redis...");
    let fred_config = fred::types::config::Config::from_url(&redis.url)?;
    let fred_client = fred::clients::Client::new(fred_config, None, None, None);
    fred_client.connect();
    fred_client.wait_for_connect().await?;
    info!("Connected to Redis");

    Ok(Arc::new(RedisSlidingWindow::new(
        Arc::new(fred_client),
        redis.prefix.clone(),
    )))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chirp=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting chirp server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = Arc::new(chirp_db::init(&config).await?);
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    chirp_db::migrate(&db).await?;
    info!("Migrations completed");

    // Collaborators
    let identity: IdentityGateway = Arc::new(HttpIdentityProvider::new(&config.identity)?);
    let limits = RateLimitConfig::from(&config.rate_limit);
    let store = counter_store(config.redis.as_ref(), limits).await?;
    info!(
        max_posts = limits.max_requests,
        window_secs = limits.window.as_secs(),
        "Post rate limiting enabled"
    );

    // Services
    let post_service = PostService::new(
        PostRepository::new(Arc::clone(&db)),
        Arc::clone(&identity),
        PostRateLimiter::new(store, limits),
    );
    let profile_service = ProfileService::new(identity);
    let state = AppState::new(post_service, profile_service, &config.auth)?;

    // Build router
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.server.request_timeout_secs,
                )))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
