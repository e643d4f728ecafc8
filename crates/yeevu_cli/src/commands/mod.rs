//! CLI command definitions.
//!
//! Each subcommand maps to one entry point of the generator: the HTTP server,
//! an in-process session, or a sandbox operation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod download;
pub mod generate;
pub mod remove;
pub mod serve;

/// Yeevu - AI website generator
#[derive(Parser)]
#[command(name = "yeevu")]
#[command(version, about = "Yeevu - generate and preview websites from a prompt")]
#[command(long_about = r#"
Yeevu turns a natural-language prompt into a running Next.js website inside
an isolated sandbox and returns a public preview link.

COMMANDS:
  serve     → Run the HTTP server (POST /generate, POST /download, ...)
  generate  → Run one generation session in this process
  download  → Save a sandbox's project as a zip archive
  remove    → Tear down a sandbox

ENVIRONMENT:
  DAYTONA_API_KEY, DAYTONA_API_URL, ANTHROPIC_API_KEY,
  YEEVU_LLM_MODEL, YEEVU_MAX_TURNS (a .env file is read if present)

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or configuration
  3 - Generation failure
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to ./yeevu.toml when present)
    #[arg(short, long, global = true, env = "YEEVU_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve(serve::ServeArgs),

    /// Generate a website from a prompt
    Generate(generate::GenerateArgs),

    /// Download a sandbox's project as a zip
    Download(download::DownloadArgs),

    /// Remove a sandbox
    Remove(remove::RemoveArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use yeevu_core::ProfileKind;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_generate() {
        let cli = Cli::try_parse_from([
            "yeevu",
            "generate",
            "A portfolio site",
            "--profile",
            "minimal",
            "--max-turns",
            "5",
        ])
        .unwrap();

        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.prompt, "A portfolio site");
                assert_eq!(args.profile, Some(ProfileKind::Minimal));
                assert_eq!(args.max_turns, Some(5));
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_profile() {
        let result = Cli::try_parse_from(["yeevu", "generate", "x", "--profile", "brutalist"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_download_and_remove() {
        let cli = Cli::try_parse_from(["yeevu", "download", "sb-1", "--out", "site.zip"]).unwrap();
        match cli.command {
            Commands::Download(args) => {
                assert_eq!(args.sandbox_id, "sb-1");
                assert_eq!(args.out, Some(PathBuf::from("site.zip")));
            }
            _ => panic!("expected download"),
        }

        let cli = Cli::try_parse_from(["yeevu", "--config", "prod.toml", "remove", "sb-2"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("prod.toml")));
        assert!(matches!(cli.command, Commands::Remove(args) if args.sandbox_id == "sb-2"));
    }
}
