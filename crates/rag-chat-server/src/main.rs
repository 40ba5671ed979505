use anyhow::Result;
use std::net::SocketAddr;
use tracing::info;

use rag_chat_server::config::Settings;
use rag_chat_server::logging::{build_activity_logger, init_tracing};
use rag_chat_server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    let _log_guard = init_tracing(&settings.logging);
    info!("Starting RAG Chat Server...");

    let activity_logger = build_activity_logger(&settings.logging)?;

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let state = AppState::from_settings(settings, activity_logger)?;
    info!(
        "Services initialized (llm model: {}, memory limit: {} tokens)",
        state.settings.llm.model, state.settings.memory.max_token_limit
    );

    let app = build_router(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
