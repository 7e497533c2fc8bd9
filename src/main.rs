use std::sync::Arc;

use convo_server::error::AppError;
use convo_server::state::AppState;
use convo_server::websocket::ConnectionRegistry;
use convo_server::{config, db, logging, migrations, routes};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();

    let config = Arc::new(config::Config::from_env()?);

    let db = db::init_pool(&config.database_url)
        .await
        .map_err(|e| AppError::StartServer(format!("database connection failed: {e}")))?;

    // Schema must be current before any request is served
    migrations::run_all(&db)
        .await
        .map_err(|e| AppError::StartServer(format!("database migrations failed: {e}")))?;

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .map_err(|e| AppError::StartServer(format!("upload directory unavailable: {e}")))?;

    let state = AppState {
        db,
        registry: ConnectionRegistry::new(),
        config: config.clone(),
    };
    let app = routes::build_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::StartServer(format!("failed to bind {bind_addr}: {e}")))?;
    tracing::info!(%bind_addr, "convo-server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;

    Ok(())
}
