use std::error::Error;
use std::sync::Arc;

use chatstream_core::observability::{LogDefaults, init_observability};
use chatstream_server::{AppState, ServerConfig, UpstreamClient, router};
use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    init_observability(LogDefaults::GATEWAY);

    let config = ServerConfig::parse();
    config.validate()?;

    let state = AppState {
        upstream: Arc::new(UpstreamClient::new(config.upstream_config())?),
        image_store: config.image_store()?,
    };
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(
        event = "server.listening",
        domain = "gateway",
        addr = %listener.local_addr()?,
        upstream = %config.upstream_url,
        image_offload = state.image_store.is_some()
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
}
