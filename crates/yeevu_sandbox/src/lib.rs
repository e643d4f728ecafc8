//! # yeevu_sandbox
//!
//! Sandbox execution wrapper for Yeevu.
//!
//! Every file the generator writes and every command it runs goes through a
//! [`Sandbox`]: an isolated filesystem and process space owned by a single
//! generation session.
//!
//! # Features
//!
//! - **Daytona**: REST-backed remote sandboxes with public preview links
//! - **Local**: directory-backed sandboxes driven by `sh -c`, for development
//! - **Mock**: in-memory filesystem with scripted command responses, for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use yeevu_sandbox::{CommandOptions, LocalProvider, SandboxProvider, SandboxSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = LocalProvider::new("/tmp/yeevu-sandboxes");
//!     let sandbox = provider.create(&SandboxSpec::default()).await?;
//!
//!     let root = sandbox.user_root_dir().await?;
//!     let output = sandbox
//!         .execute_command("node --version", &CommandOptions::new().cwd(root))
//!         .await?;
//!     println!("Exit code: {}", output.exit_code);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod daytona;
pub mod error;
pub mod local;
pub mod mock;
pub mod sandbox;
pub mod shell;

pub use config::{CommandOptions, SandboxSpec};
pub use daytona::{DaytonaProvider, DaytonaSandbox};
pub use error::{SandboxError, SandboxResult};
pub use local::{LocalProvider, LocalSandbox};
pub use mock::{CapturedCommand, MockResponse, MockSandbox, MockSandboxProvider};
pub use sandbox::{CommandOutput, PreviewLink, Sandbox, SandboxProvider};
