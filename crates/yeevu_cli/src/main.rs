//! Yeevu CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or configuration
//! - 3: Generation failure

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use yeevu_core::YeevuConfig;

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const GENERATION_FAILURE: u8 = 3;
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional
    let _ = dotenvy::dotenv();

    let mut filter = EnvFilter::from_default_env();
    for directive in ["yeevu=info", "warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();

    let cli = Cli::parse();

    let result = match YeevuConfig::load(cli.config.as_deref()).context("Failed to load configuration") {
        Ok(config) => match cli.command {
            Commands::Serve(args) => commands::serve::execute(args, config).await,
            Commands::Generate(args) => commands::generate::execute(args, config).await,
            Commands::Download(args) => commands::download::execute(args, config).await,
            Commands::Remove(args) => commands::remove::execute(args, config).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    let msg = format!("{:#}", e).to_lowercase();

    if msg.contains("generation failed") {
        ExitCodes::GENERATION_FAILURE
    } else if msg.contains("configuration") || msg.contains("api key") || msg.contains("argument") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
