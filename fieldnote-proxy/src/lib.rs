//! fieldnote-proxy library interface
//!
//! The proxy is a thin authenticated gateway between the Fieldnote client
//! and the third-party AI and source-control APIs. It owns the upstream
//! credentials; clients authenticate with minted bearer tokens.

pub mod api;
pub mod config;
pub mod error;
pub mod upstream;
pub mod users;

pub use error::ApiError;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::ProxyConfig;
use crate::upstream::{AiUpstream, RepoUpstream};
use crate::users::UserRecord;

/// Multipart uploads are capped at 50 MB
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Upstream request timeout
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub users: Arc<Vec<UserRecord>>,
    pub ai: AiUpstream,
    pub repo: RepoUpstream,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ProxyConfig, users: Vec<UserRecord>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");

        Self {
            ai: AiUpstream::new(http.clone(), config.ai.clone()),
            repo: RepoUpstream::new(http, config.repo.clone()),
            config: Arc::new(config),
            users: Arc::new(users),
            startup_time: Utc::now(),
        }
    }
}

/// Build the application router
///
/// `/api/auth/login` and `/health` are public; every other `/api` route
/// sits behind the bearer-token middleware.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/ai/transcribe", post(api::transcribe))
        .route("/api/ai/chat", post(api::chat))
        .route("/api/repo/issues", post(api::create_issue))
        .route("/api/repo/companies", get(api::companies))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new()
        .route("/api/auth/login", post(api::login))
        .route("/health", get(api::health));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(cors_layer(&state.config.frontend_origin))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// CORS restricted to the configured frontend origin
fn cors_layer(frontend_origin: &str) -> CorsLayer {
    let origin = frontend_origin.parse::<HeaderValue>().unwrap_or_else(|_| {
        warn!("Invalid FIELDNOTE_FRONTEND_URL {frontend_origin}; CORS limited to localhost");
        HeaderValue::from_static("http://localhost:5173")
    });

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
