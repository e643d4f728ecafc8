//! Serve command - Run the HTTP server.

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use yeevu_core::YeevuConfig;
use yeevu_server::{serve, AppState};

#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind (overrides [server].bind)
    #[arg(short, long)]
    pub bind: Option<String>,
}

pub async fn execute(args: ServeArgs, config: YeevuConfig) -> Result<()> {
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());

    if let Err(e) = config.require_credentials() {
        warn!("{}; generation requests will be rejected", e);
    }
    info!(
        "Sandbox provider: {:?}, model: {}, profile: {}",
        config.sandbox.provider, config.llm.model, config.generation.profile
    );

    println!("🚀 Yeevu listening on http://{}", bind);
    serve(AppState::from_config(&config), &bind)
        .await
        .with_context(|| format!("Server on {} stopped with an error", bind))
}
