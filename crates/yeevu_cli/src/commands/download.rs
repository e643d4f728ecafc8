//! Download command - Save a sandbox's project as a zip archive.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use yeevu_core::{archive_file_name, build_archive, project_dir_for, YeevuConfig};

#[derive(Args)]
pub struct DownloadArgs {
    /// Sandbox holding the project
    pub sandbox_id: String,

    /// Output file (defaults to website-project-<id>.zip)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

pub async fn execute(args: DownloadArgs, config: YeevuConfig) -> Result<()> {
    let provider = config.build_provider()?;
    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(archive_file_name(&args.sandbox_id)));

    println!("📦 Downloading project from sandbox {}...", args.sandbox_id);
    let sandbox = provider
        .connect(&args.sandbox_id)
        .await
        .with_context(|| format!("Sandbox not reachable: {}", args.sandbox_id))?;
    let root = sandbox.user_root_dir().await?;
    let project_dir = project_dir_for(&root);
    info!("Archiving {}", project_dir);

    let archive = build_archive(&sandbox, &project_dir)
        .await
        .context("Download failed")?;
    tokio::fs::write(&out, &archive)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    println!("   ✅ Saved {} ({} bytes)", out.display(), archive.len());
    Ok(())
}
