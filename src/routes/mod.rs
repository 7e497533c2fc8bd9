pub mod auth;
pub mod chat;
pub mod uploads;
pub mod users;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post, put};
use axum::{middleware as axum_middleware, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::middleware;
use crate::state::AppState;
use crate::websocket::handlers::ws_handler;

/// Pagination envelope shared by every listing endpoint.
#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        Self {
            page,
            limit,
            total,
            has_more: crate::services::has_more(page, limit, total),
        }
    }
}

async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "convo-server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
    }))
}

fn cors_layer(config: &Config) -> CorsLayer {
    match config
        .cors_origin
        .as_deref()
        .and_then(|origin| origin.parse::<HeaderValue>().ok())
    {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    }
}

pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        // The socket authenticates itself from its token parameter
        .route("/ws", get(ws_handler));

    let protected = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/users", get(users::list_users))
        .route("/api/users/profile", put(users::update_profile))
        .route("/api/users/:user_id", get(users::get_user))
        .route("/api/chat/conversations", get(chat::list_conversations))
        .route("/api/chat/send", post(chat::send_message))
        .route(
            "/api/chat/messages/:id",
            get(chat::get_messages)
                .put(chat::update_message)
                .delete(chat::delete_message),
        )
        .route(
            "/api/upload",
            post(uploads::upload_file).layer(DefaultBodyLimit::max(uploads::MAX_UPLOAD_BYTES)),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let router = middleware::with_defaults(public.merge(protected));

    router
        .nest_service(
            "/uploads",
            ServeDir::new(state.config.upload_dir.clone()),
        )
        .layer(cors_layer(&state.config))
        .with_state(state)
}
