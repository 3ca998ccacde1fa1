use service_core::middleware::rate_limit::create_ip_rate_limiter;
use service_core::observability::init_tracing;
use social_service::{
    build_router,
    config::SocialConfig,
    db,
    services::{
        AdapterRegistry, Clock, CredentialVault, Database, ForgeryGuard, PasswordAuthAdapter,
        RedisService, RelationshipService, SessionAuthenticator, SystemClock,
    },
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = SocialConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    social_service::services::metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to initialize metrics: {}", e))?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting social service"
    );

    tracing::info!("Initializing database connections");
    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;
    let database = Arc::new(Database::new(pool));
    tracing::info!("Database initialized successfully");

    let retention = (config.session.remember_ttl_days.max(1) as u64) * 24 * 60 * 60;
    let redis = Arc::new(
        RedisService::new(&config.redis, retention)
            .await
            .map_err(service_core::error::AppError::InternalError)?,
    );
    tracing::info!("Redis service initialized");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store_timeout = config.session.store_timeout();

    let vault = CredentialVault::new(
        redis.clone(),
        config.security.remember_signing_key.as_bytes(),
        config.session.remember_ttl(),
        clock.clone(),
        store_timeout,
    );
    let authenticator =
        SessionAuthenticator::new(vault, database.clone(), database.clone(), store_timeout);
    let adapters = AdapterRegistry::new(Arc::new(PasswordAuthAdapter::new(database.clone())));
    let forgery_guard = ForgeryGuard::new(
        config.security.csrf_secret.as_bytes(),
        config.security.csrf_token_ttl_seconds,
        redis.clone(),
        clock,
        store_timeout,
    );
    let relationships = RelationshipService::new(database, store_timeout);

    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );
    tracing::info!("Rate limiters initialized: Login");

    let state = AppState {
        config: config.clone(),
        relationships,
        authenticator,
        adapters,
        forgery_guard,
        sessions: redis,
        login_rate_limiter,
    };
    let app = build_router(state).await?;

    let addr: SocketAddr = config.common.bind_address().parse().map_err(|e| {
        service_core::error::AppError::ConfigError(anyhow::anyhow!(
            "Invalid bind address: {}",
            e
        ))
    })?;

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
