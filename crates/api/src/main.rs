use std::sync::Arc;

use anyhow::Context;

use coursedesk_api::app::{AppState, build_app};
use coursedesk_infra::{AppConfig, InMemoryStore, PostgresStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    coursedesk_observability::init();

    let config = AppConfig::from_env().context("reading configuration")?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.max_connections)
                .await
                .context("connecting to postgres")?;
            store.ensure_schema().await.context("applying schema")?;
            tracing::info!(max_connections = config.max_connections, "using postgres store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };

    let app = build_app(AppState::new(store, config.session_ttl));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
