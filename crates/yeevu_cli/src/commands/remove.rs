//! Remove command - Tear down a sandbox.

use anyhow::{Context, Result};
use clap::Args;

use yeevu_core::YeevuConfig;

#[derive(Args)]
pub struct RemoveArgs {
    /// Sandbox to remove
    pub sandbox_id: String,
}

pub async fn execute(args: RemoveArgs, config: YeevuConfig) -> Result<()> {
    let provider = config.build_provider()?;
    provider
        .remove(&args.sandbox_id)
        .await
        .with_context(|| format!("Failed to remove sandbox {}", args.sandbox_id))?;

    println!("🗑️  Removed sandbox {}", args.sandbox_id);
    Ok(())
}
