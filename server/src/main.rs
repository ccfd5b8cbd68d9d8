//! TimeBank HTTP and WebSocket server.
//!
//! ```bash
//! DATABASE_URL=postgres://... JWT_SECRET=... cargo run --bin timebank
//! ```

use timebank_server::{app, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,timebank=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    for warning in config.warnings() {
        tracing::warn!("{warning}");
    }
    tracing::info!(
        port = config.server.port,
        frontend = %config.server.frontend_url,
        "Configuration loaded"
    );

    app::run(config).await
}
