//! Sandbox and command configuration types.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Parameters for creating a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSpec {
    /// Base image for the sandbox
    pub image: String,
    /// Whether preview links are publicly reachable
    pub public: bool,
    /// Labels attached to the sandbox
    pub labels: HashMap<String, String>,
}

impl Default for SandboxSpec {
    fn default() -> Self {
        Self {
            image: "node:20".to_string(),
            public: true,
            labels: HashMap::new(),
        }
    }
}

impl SandboxSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Options for a single command execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandOptions {
    /// Working directory inside the sandbox
    pub cwd: Option<String>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
    /// Timeout (None = provider default)
    #[serde(with = "optional_duration_secs")]
    pub timeout: Option<Duration>,
}

impl CommandOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cwd(mut self, dir: impl Into<String>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Timeout in whole seconds, rounded up.
    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout
            .map(|t| t.as_secs() + u64::from(t.subsec_nanos() > 0))
    }
}

mod optional_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
