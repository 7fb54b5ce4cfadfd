use account_service::{
    build_router,
    config::AccountConfig,
    services::{
        AuthPolicy, AuthService, EmailService, LogActivitySink, PgCredentialStore,
        RedisSessionStore,
    },
    AppState,
};
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = AccountConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting account service"
    );

    let pg_store = PgCredentialStore::connect(&config.database).await?;
    pg_store.run_migrations().await?;
    tracing::info!("Database initialized successfully");

    let sessions = RedisSessionStore::new(&config.redis).await?;
    tracing::info!("Session sink initialized");

    let email = EmailService::new(&config.smtp)?;

    let store: Arc<dyn account_service::services::CredentialStore> = Arc::new(pg_store);
    let sessions: Arc<dyn account_service::services::SessionSink> = Arc::new(sessions);

    let auth = AuthService::new(
        store.clone(),
        sessions.clone(),
        Arc::new(email),
        Arc::new(LogActivitySink),
        AuthPolicy::from_config(&config),
    );

    let state = AppState {
        config: config.clone(),
        store,
        sessions,
        auth,
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

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
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
