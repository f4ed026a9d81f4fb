//! fieldnote-proxy - Authenticated gateway to the AI and repository APIs
//!
//! Thin by design: validates input, checks bearer tokens, forwards to the
//! configured third-party services, and maps upstream failures through.

use anyhow::Result;
use tracing::info;

use fieldnote_proxy::config::ProxyConfig;
use fieldnote_proxy::users::load_users;
use fieldnote_proxy::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!(
        "Starting fieldnote-proxy v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = ProxyConfig::from_env();
    let users = load_users(config.users_file.as_deref())?;
    info!("Loaded {} login user(s)", users.len());

    let port = config.port;
    let frontend = config.frontend_origin.clone();
    let state = AppState::new(config, users);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("fieldnote-proxy listening on http://0.0.0.0:{port}");
    info!("CORS allowed origin: {frontend}");
    info!("Health check: http://127.0.0.1:{port}/health");

    axum::serve(listener, app).await?;

    Ok(())
}
