//! Shell helpers shared by command-driven sandboxes.
//!
//! File transfer over a command channel is done with base64 so binary content
//! and quotes survive the trip. Uploads are split into chunks to stay under
//! the per-argument size limit of the remote shell.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{SandboxError, SandboxResult};
use crate::sandbox::CommandOutput;

/// Exit code used by the download command when the file is absent.
pub const MISSING_FILE_EXIT_CODE: i64 = 44;

/// Maximum base64 characters per upload command.
const UPLOAD_CHUNK: usize = 64 * 1024;

/// Directories and files never included in project listings.
pub const LISTING_EXCLUDES: &[&str] = &["node_modules", ".next", ".git"];

/// Quote a string for POSIX `sh`.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Prefix a command with `export` statements for the given variables.
pub fn with_env(command: &str, env: &HashMap<String, String>) -> String {
    if env.is_empty() {
        return command.to_string();
    }
    let mut keys: Vec<_> = env.keys().collect();
    keys.sort();
    let mut prefixed = String::new();
    for key in keys {
        prefixed.push_str(&format!("export {}={}; ", key, quote(&env[key])));
    }
    prefixed.push_str(command);
    prefixed
}

/// Parent directory of a sandbox path.
pub fn parent_dir(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((parent, _)) => parent,
        None => ".",
    }
}

/// Commands that write `content` to `path`, in order.
pub fn upload_commands(path: &str, content: &[u8]) -> Vec<String> {
    let encoded = STANDARD.encode(content);
    let staging = format!("{}.yeevu-b64", path);

    let mut commands = vec![format!(
        "mkdir -p {} && : > {}",
        quote(parent_dir(path)),
        quote(&staging)
    )];
    for chunk in encoded.as_bytes().chunks(UPLOAD_CHUNK) {
        // base64 output is ASCII, so chunk boundaries are valid UTF-8
        let chunk = String::from_utf8_lossy(chunk);
        commands.push(format!("printf '%s' '{}' >> {}", chunk, quote(&staging)));
    }
    commands.push(format!(
        "base64 -d {} > {} && rm -f {}",
        quote(&staging),
        quote(path),
        quote(&staging)
    ));
    commands
}

/// Command that prints the base64 content of `path`, or exits with
/// [`MISSING_FILE_EXIT_CODE`] when the file does not exist.
pub fn download_command(path: &str) -> String {
    let quoted = quote(path);
    format!(
        "if [ -f {q} ]; then base64 {q} | tr -d '\\n'; else exit {code}; fi",
        q = quoted,
        code = MISSING_FILE_EXIT_CODE
    )
}

/// Decode the output of [`download_command`].
pub fn decode_download(path: &str, output: &CommandOutput) -> SandboxResult<Option<Vec<u8>>> {
    if output.exit_code == MISSING_FILE_EXIT_CODE {
        return Ok(None);
    }
    if !output.success() {
        return Err(SandboxError::Transfer {
            path: path.to_string(),
            message: output.result.clone(),
        });
    }
    let cleaned: String = output.result.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(cleaned.as_bytes())
        .map(Some)
        .map_err(|e| SandboxError::Transfer {
            path: path.to_string(),
            message: format!("invalid base64 payload: {}", e),
        })
}

/// Command listing project files relative to the working directory.
pub fn list_command() -> String {
    let mut command = String::from("find . -type f");
    for exclude in LISTING_EXCLUDES {
        command.push_str(&format!(" -not -path './{}/*'", exclude));
    }
    command.push_str(" -not -name '*.log' -not -name '*.yeevu-b64'");
    command
}

/// Parse `find` output into sorted relative paths.
pub fn parse_listing(output: &str) -> Vec<String> {
    let mut files: Vec<String> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.strip_prefix("./").unwrap_or(line).to_string())
        .collect();
    files.sort();
    files
}

/// Whether a relative path belongs in a project listing.
pub fn is_listable(relative: &str) -> bool {
    let excluded_dir = relative
        .split('/')
        .any(|segment| LISTING_EXCLUDES.contains(&segment));
    !excluded_dir && !relative.ends_with(".log") && !relative.ends_with(".yeevu-b64")
}
