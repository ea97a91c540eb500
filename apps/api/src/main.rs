mod config;
mod errors;
mod llm_client;
mod pipeline;
mod render;
mod routes;
mod runs;
mod search;
mod session;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::routes::build_router;
use crate::runs::collaborators::HttpCollaborators;
use crate::session::{spawn_idle_sweeper, SessionStore};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Jobcrew v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {config:?}");

    // One connection pool shared by every run's collaborators
    let http = reqwest::Client::builder()
        .user_agent(concat!("jobcrew/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let collaborators = Arc::new(HttpCollaborators::from_config(http, &config));
    info!("Collaborators ready (model: {})", config.gemini_model);

    let sessions = SessionStore::new(Duration::from_secs(config.session_ttl_secs));
    spawn_idle_sweeper(sessions.clone());

    let state = AppState {
        config: config.clone(),
        sessions,
        collaborators,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
