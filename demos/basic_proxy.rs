//! Start a messages-bridge server programmatically.
//!
//! Usage:
//!   export OPENAI_API_KEY=sk-your-key
//!   cargo run --example basic_proxy

use messages_bridge::{build_router, AppState, ProxyConfig, SharedLog};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ProxyConfig::find_and_load(None)?;

    println!("Upstream: {}", config.responses_url());
    println!("Models mapped: {}", config.models.len());

    let log = SharedLog::new("bridge-example.log", false, config.logging.max_chars)?;
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let port = config.port;
    let state = Arc::new(AppState::new(config, client, log)?);

    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("Listening on http://{}", addr);
    println!();
    println!("  ANTHROPIC_BASE_URL=http://localhost:{} claude", port);

    axum::serve(listener, app).await?;
    Ok(())
}
