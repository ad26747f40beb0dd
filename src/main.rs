//! chatterd server binary.

use chatterd::config::Config;
use chatterd::engine::Engine;
use chatterd::network::Gateway;
use chatterd::state::{RoomRegistry, SessionRegistry};
use chatterd::store::SqliteStore;
use chatterd::{http, metrics};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "chatterd.toml".to_string());

    let config = if std::path::Path::new(&config_path).exists() {
        Config::load(&config_path).map_err(|e| {
            error!(path = %config_path, error = %e, "failed to load config");
            e
        })?
    } else {
        warn!(path = %config_path, "config file not found, using built-in defaults");
        Config::default()
    };

    info!(listen = %config.server.listen, "starting chatterd");

    // Refuse to start with the placeholder token secret. A guessable secret
    // lets anyone mint valid session tokens.
    if config.has_insecure_secret() {
        if std::env::var("CHATTERD_ALLOW_INSECURE_SECRET").is_ok() {
            warn!(
                "running with an insecure jwt_secret (allowed via CHATTERD_ALLOW_INSECURE_SECRET)"
            );
        } else {
            error!("insecure jwt_secret detected");
            error!("  set a strong secret in the config:");
            error!("    [auth]");
            error!("    jwt_secret = \"<random-32-char-string>\"");
            error!("  generate one with: openssl rand -hex 32");
            error!("  for development only, set CHATTERD_ALLOW_INSECURE_SECRET=1 to bypass");
            anyhow::bail!("refusing to start with insecure jwt_secret");
        }
    }

    let store = SqliteStore::open(&config.store.path).await?;

    let registry = Arc::new(SessionRegistry::new());
    let rooms = Arc::new(RoomRegistry::new());
    let engine = Arc::new(Engine::new(
        Arc::clone(&registry),
        Arc::clone(&rooms),
        Arc::new(store),
        config.policy.clone(),
        config.limits.clone(),
    ));

    // Prometheus metrics are optional; metrics_port = 0 disables the
    // endpoint (used by tests).
    if config.server.metrics_port == 0 {
        info!("metrics disabled");
    } else {
        metrics::init();
        let port = config.server.metrics_port;
        tokio::spawn(async move {
            http::run_http_server(port).await;
        });
        info!(port, "metrics endpoint started");
    }

    let gateway = Gateway::bind(
        &config.server,
        config.auth.jwt_secret.clone(),
        Arc::clone(&engine),
    )
    .await?;

    gateway.run().await
}
