use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use table_actions::app::{create_router, AppState};
use table_actions::config::config;
use table_actions::database::{DatabaseManager, HandlerRepository, MemoryHandlerRepository, PgHandlerRepository};
use table_actions::services::ActionHandlerService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize configuration (this loads the config singleton, .env included)
    let config = config();
    tracing::info!("Starting table-actions server in {:?} mode", config.environment);

    let (repo, pool) = match config.database.url {
        Some(_) => {
            let pool = DatabaseManager::connect(&config.database)
                .await
                .context("failed to connect to the handler database")?;
            let repo = PgHandlerRepository::new(pool.clone());
            repo.ensure_schema().await.context("failed to create action_handlers")?;
            let repo: Arc<dyn HandlerRepository> = Arc::new(repo);
            (repo, Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, handlers are kept in memory");
            let repo: Arc<dyn HandlerRepository> = Arc::new(MemoryHandlerRepository::new());
            (repo, None)
        }
    };

    let service = ActionHandlerService::from_config(config, repo)
        .context("handler encryption key is not configured")?;
    let seeded = service.seed_defaults().await?;
    if seeded > 0 {
        tracing::info!("Seeded {} default handlers", seeded);
    }

    let app = create_router(AppState::new(Arc::new(service), pool), config.server.enable_cors);

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("table-actions server listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("server")?;
    Ok(())
}
