use anyhow::{Context, Result};
use session_broker::api::{create_app, SessionAppState, SettingsAppState};
use session_broker::broker::CredentialBroker;
use session_broker::config::{load_config, BrokerConfig};
use session_broker::settings::{
    run_confirmation_cleanup, ClearConfirmations, SealingKey, SettingsService, SettingsStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_broker=info".into()),
        )
        .init();

    let config = match std::env::var("SESSION_BROKER_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => BrokerConfig::default(),
    }
    .with_env_overrides();
    config.validate().context("Invalid configuration")?;

    let encryption_key = std::env::var("SESSION_BROKER_ENCRYPTION_KEY")
        .context("SESSION_BROKER_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;
    let key = SealingKey::from_base64(&encryption_key).context("Invalid encryption key")?;

    let store = Arc::new(
        SettingsStore::new(&config.storage.database_path, key)
            .context("Failed to initialize settings store")?,
    );

    // Teardown: reset the record and exit
    if std::env::args().nth(1).as_deref() == Some("purge") {
        store.delete().context("Failed to purge settings")?;
        info!(database = %config.storage.database_path, "Settings purged");
        return Ok(());
    }

    info!(
        bind_addr = %config.server.bind_addr,
        database = %config.storage.database_path,
        upstream = %config.upstream.session_token_url,
        timeout_seconds = config.upstream.timeout_seconds,
        "Session broker starting"
    );

    let admin_token = std::env::var("SESSION_BROKER_ADMIN_TOKEN")
        .ok()
        .filter(|t| !t.is_empty());
    if admin_token.is_none() {
        warn!("SESSION_BROKER_ADMIN_TOKEN not set, settings API is unrestricted");
    }

    let confirmations = ClearConfirmations::new(config.clear.confirmation_ttl_seconds);
    tokio::spawn(run_confirmation_cleanup(
        confirmations.clone(),
        config.clear.cleanup_interval_seconds,
    ));

    let service = Arc::new(SettingsService::new(Arc::clone(&store), confirmations));

    let broker = Arc::new(
        CredentialBroker::new(
            Arc::clone(&store),
            config.upstream.session_token_url.clone(),
            Duration::from_secs(config.upstream.timeout_seconds),
            &config.upstream.user_agent,
        )
        .context("Failed to build upstream HTTP client")?,
    );

    let app = create_app(
        SettingsAppState {
            service,
            admin_token,
        },
        SessionAppState { broker },
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(bind_addr = %config.server.bind_addr, "Session broker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for ctrl_c signal");
            }
            info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    info!("Session broker stopped");
    Ok(())
}
