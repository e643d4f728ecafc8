//! Required-file validation.
//!
//! Each required file has a [`FileCheck`] describing the minimal structure it
//! must have. Checks are versioned so reports from different releases can be
//! told apart.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use yeevu_sandbox::Sandbox;

use crate::error::PipelineResult;

/// Version of the check semantics below.
pub const VALIDATOR_VERSION: u32 = 1;

/// Structural check for one kind of file. All checks reject empty content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileCheck {
    /// Any non-blank content
    NonEmpty,
    /// Content matches a regular expression
    Marker { pattern: String },
    /// JSON manifest listing `dependency` in dependencies or devDependencies
    JsonManifest { dependency: String },
    /// JSON object containing `key`
    JsonObject { key: String },
}

impl FileCheck {
    /// Default-export marker for UI entry files.
    pub fn default_export() -> Self {
        Self::Marker {
            pattern: r"export\s+default".to_string(),
        }
    }

    /// Export marker for JavaScript config files.
    pub fn config_export() -> Self {
        Self::Marker {
            pattern: r"module\.exports|export\s+default".to_string(),
        }
    }

    pub fn manifest(dependency: impl Into<String>) -> Self {
        Self::JsonManifest {
            dependency: dependency.into(),
        }
    }

    pub fn json_object(key: impl Into<String>) -> Self {
        Self::JsonObject { key: key.into() }
    }

    /// Whether `content` passes this check.
    pub fn check(&self, content: &str) -> bool {
        if content.trim().is_empty() {
            return false;
        }
        match self {
            Self::NonEmpty => true,
            Self::Marker { pattern } => Regex::new(pattern)
                .map(|re| re.is_match(content))
                .unwrap_or(false),
            Self::JsonManifest { dependency } => {
                match serde_json::from_str::<serde_json::Value>(content) {
                    Ok(manifest) => ["dependencies", "devDependencies"].iter().any(|section| {
                        manifest
                            .get(section)
                            .and_then(|deps| deps.get(dependency))
                            .is_some()
                    }),
                    Err(_) => false,
                }
            }
            Self::JsonObject { key } => match serde_json::from_str::<serde_json::Value>(content) {
                Ok(serde_json::Value::Object(map)) => map.contains_key(key),
                _ => false,
            },
        }
    }
}

/// A file the project must contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredFile {
    /// Path relative to the project root
    pub path: String,
    pub check: FileCheck,
}

impl RequiredFile {
    pub fn new(path: impl Into<String>, check: FileCheck) -> Self {
        Self {
            path: path.into(),
            check,
        }
    }
}

/// Validation outcome for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileValidation {
    pub path: String,
    pub exists: bool,
    pub valid: bool,
}

impl FileValidation {
    pub fn passed(&self) -> bool {
        self.exists && self.valid
    }
}

/// Validation outcome for all required files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub version: u32,
    pub files: Vec<FileValidation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.files.iter().all(FileValidation::passed)
    }

    /// Files that are missing or fail their check.
    pub fn failing(&self) -> Vec<&FileValidation> {
        self.files.iter().filter(|f| !f.passed()).collect()
    }

    pub fn missing(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|f| !f.exists)
            .map(|f| f.path.as_str())
            .collect()
    }
}

/// Check every required file under `project_dir`.
pub async fn validate_project(
    sandbox: &Arc<dyn Sandbox>,
    project_dir: &str,
    required: &[RequiredFile],
) -> PipelineResult<ValidationReport> {
    let mut files = Vec::with_capacity(required.len());
    for file in required {
        let path = format!("{}/{}", project_dir.trim_end_matches('/'), file.path);
        let content = sandbox.download_file(&path).await?;
        let validation = match content {
            Some(bytes) => FileValidation {
                path: file.path.clone(),
                exists: true,
                valid: file.check.check(&String::from_utf8_lossy(&bytes)),
            },
            None => FileValidation {
                path: file.path.clone(),
                exists: false,
                valid: false,
            },
        };
        debug!(
            "Validated {}: exists={} valid={}",
            validation.path, validation.exists, validation.valid
        );
        files.push(validation);
    }
    Ok(ValidationReport {
        version: VALIDATOR_VERSION,
        files,
    })
}
