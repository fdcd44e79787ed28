//! Admin auth service binary entry point.

use acton_reactive::prelude::ActonApp;
use admin_auth::{
    connect_store, router, seed_admins, AdminAuthConfig, AuthServices, CredentialSweeperAgent,
    OsEntropy, SystemClock, TracingMailer,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "admin_auth=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting admin-auth");

    // Load configuration
    let config = AdminAuthConfig::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", *e);
        AdminAuthConfig::default()
    });
    config.validate()?;

    let clock = Arc::new(SystemClock);
    let store = connect_store(&config.store).await?;
    let seeded = seed_admins(store.as_ref(), &config.bootstrap, clock.as_ref()).await?;
    if seeded == 0 {
        tracing::warn!("No bootstrap administrators configured");
    }

    let services = AuthServices::build(
        &config,
        store,
        Arc::new(TracingMailer),
        clock,
        Arc::new(OsEntropy),
    )?;

    // Initialize acton-reactive runtime
    let mut runtime = ActonApp::launch();

    let _sweeper = CredentialSweeperAgent::spawn(
        &mut runtime,
        services.sweep_targets(),
        Duration::from_secs(config.session.cleanup_interval_seconds),
    )
    .await?;

    tracing::info!("Credential sweeper agent started");

    let app = router(services.app_state(&config));

    // Build server address
    let addr: SocketAddr = format!("{}:{}", config.service.host, config.service.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Shutdown runtime
    runtime.shutdown_all().await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
