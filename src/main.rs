//! Photoshare Backend
//!
//! A REST backend for sharing photos with SQLite persistence, JWT
//! authentication, Cloudinary or local media storage and Tantivy full-text search.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod search;
mod storage;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::TokenService;
use config::Config;
use db::Repository;
use search::SearchIndex;
use storage::{MediaStore, MEDIA_ROUTE};

/// Slack on top of the file limit for multipart framing and text fields.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub search: Arc<SearchIndex>,
    pub storage: Arc<MediaStore>,
    pub tokens: Arc<TokenService>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Open every backing service described by `config`.
    pub async fn build(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let pool = db::init_database(&config.db_path).await?;
        let repo = Arc::new(Repository::new(pool));

        let search = Arc::new(SearchIndex::open(&config.index_path)?);
        let photos = repo.list_all_photos().await?;
        search.rebuild(&photos).await?;

        let storage = Arc::new(MediaStore::from_config(&config).await?);
        let tokens = Arc::new(TokenService::new(
            &config.jwt_secret,
            config.access_token_ttl(),
            config.refresh_token_ttl(),
        ));

        Ok(Self {
            repo,
            search,
            storage,
            tokens,
            config: Arc::new(config),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Photoshare Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.ephemeral_jwt_secret {
        tracing::warn!("No JWT secret configured (PHOTOSHARE_JWT_SECRET). Tokens will not survive a restart!");
    }

    let bind_addr = config.bind_addr;
    let state = AppState::build(config).await?;

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Routes reachable without an access token
    let public_routes = Router::new()
        .route("/auth/signup", post(api::signup))
        .route("/auth/login", post(api::login))
        .route("/auth/refresh_token", get(api::refresh_token));

    let protected_routes = Router::new()
        // Auth
        .route("/auth/logout", post(api::logout))
        // Users
        .route("/users/me", get(api::get_me))
        .route("/users/count", get(api::count_users))
        .route("/users/avatar", patch(api::update_avatar))
        .route("/users/{id}/role", patch(api::update_role))
        // Photos
        .route("/photos", get(api::list_photos).post(api::upload_photo))
        .route(
            "/photos/{id}",
            get(api::get_photo)
                .put(api::update_photo)
                .delete(api::delete_photo),
        )
        // Search
        .route("/search", get(api::search_photos))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .layer(DefaultBodyLimit::max(
            state.config.max_upload_bytes + MULTIPART_OVERHEAD,
        ));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    let mut router = Router::new()
        .nest("/api", public_routes.merge(protected_routes))
        .merge(health_routes);

    if let MediaStore::Local(local) = state.storage.as_ref() {
        router = router.nest_service(MEDIA_ROUTE, ServeDir::new(local.root()));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
