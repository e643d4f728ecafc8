//! Runtime configuration.
//!
//! Defaults, then an optional TOML file, then environment overrides.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use yeevu_llm::{AnthropicClient, LlmClient};
use yeevu_sandbox::{DaytonaProvider, LocalProvider, SandboxProvider, SandboxSpec};

use crate::deploy::DeploySettings;
use crate::error::{PipelineError, PipelineResult};
use crate::profile::{GenerationProfile, ProfileKind};
use crate::session::{SessionSettings, TeardownPolicy};
use crate::tools::BASH_TIMEOUT;

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "yeevu.toml";

/// Which sandbox backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxProviderKind {
    #[default]
    Daytona,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub provider: SandboxProviderKind,
    pub api_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Container image for new sandboxes
    pub image: String,
    /// Base directory for the local provider
    pub local_dir: PathBuf,
    pub teardown: TeardownPolicy,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            provider: SandboxProviderKind::default(),
            api_url: None,
            api_key: None,
            image: SandboxSpec::default().image,
            local_dir: std::env::temp_dir().join("yeevu-sandboxes"),
            teardown: TeardownPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: yeevu_llm::anthropic::DEFAULT_MODEL.to_string(),
            max_tokens: yeevu_llm::anthropic::DEFAULT_MAX_TOKENS,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub profile: ProfileKind,
    /// Overrides the profile's turn budget
    pub max_turns: Option<u32>,
    pub port: u16,
    pub health_attempts: u32,
    pub health_interval_secs: u64,
    pub install_timeout_secs: u64,
    /// Limit for each shell command the model runs
    pub bash_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let deploy = DeploySettings::default();
        Self {
            profile: ProfileKind::default(),
            max_turns: None,
            port: deploy.port,
            health_attempts: deploy.health_attempts,
            health_interval_secs: deploy.health_interval.as_secs(),
            install_timeout_secs: deploy.install_timeout.as_secs(),
            bash_timeout_secs: BASH_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Generations allowed per UTC day
    pub daily_capacity: u32,
    /// Skip the quota for loopback clients
    pub exempt_localhost: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_capacity: 3,
            exempt_localhost: true,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct YeevuConfig {
    pub server: ServerConfig,
    pub sandbox: SandboxConfig,
    pub llm: LlmConfig,
    pub generation: GenerationConfig,
    pub quota: QuotaConfig,
}

impl YeevuConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> PipelineResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] if it exists, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::from_toml(&std::fs::read_to_string(path)?)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                info!("Loading configuration from {}", DEFAULT_CONFIG_FILE);
                Self::from_toml(&std::fs::read_to_string(DEFAULT_CONFIG_FILE)?)?
            }
            None => {
                debug!("No configuration file, using defaults");
                Self::default()
            }
        };
        config.apply_env_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from an environment lookup. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = get("DAYTONA_API_KEY") {
            self.sandbox.api_key = Some(key);
        }
        if let Some(url) = get("DAYTONA_API_URL") {
            self.sandbox.api_url = Some(url);
        }
        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = get("YEEVU_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(turns) = get("YEEVU_MAX_TURNS").and_then(|v| v.parse::<u32>().ok()) {
            self.generation.max_turns = Some(turns);
        }
    }

    /// Fail unless the keys needed for a generation are present.
    pub fn require_credentials(&self) -> PipelineResult<()> {
        let needs_daytona = self.sandbox.provider == SandboxProviderKind::Daytona;
        match (needs_daytona && self.sandbox.api_key.is_none(), self.llm.api_key.is_none()) {
            (false, false) => Ok(()),
            (true, _) => Err(PipelineError::Config(
                "Missing required API keys. Need DAYTONA_API_KEY and ANTHROPIC_API_KEY".to_string(),
            )),
            (false, true) => Err(PipelineError::Config(
                "Missing required API key. Need ANTHROPIC_API_KEY".to_string(),
            )),
        }
    }

    /// Fail unless sandbox operations (download, remove) can be performed.
    pub fn require_sandbox_credentials(&self) -> PipelineResult<()> {
        if self.sandbox.provider == SandboxProviderKind::Daytona && self.sandbox.api_key.is_none() {
            return Err(PipelineError::Config(
                "DAYTONA_API_KEY is not configured".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build_provider(&self) -> PipelineResult<Arc<dyn SandboxProvider>> {
        match self.sandbox.provider {
            SandboxProviderKind::Daytona => {
                self.require_sandbox_credentials()?;
                let key = self.sandbox.api_key.clone().unwrap_or_default();
                let provider = match &self.sandbox.api_url {
                    Some(url) => DaytonaProvider::with_api_url(key, url.clone()),
                    None => DaytonaProvider::new(key),
                };
                Ok(Arc::new(provider))
            }
            SandboxProviderKind::Local => {
                Ok(Arc::new(LocalProvider::new(self.sandbox.local_dir.clone())))
            }
        }
    }

    pub fn build_llm(&self) -> PipelineResult<Arc<dyn LlmClient>> {
        let key = self.llm.api_key.clone().ok_or_else(|| {
            PipelineError::Config("ANTHROPIC_API_KEY is not configured".to_string())
        })?;
        let mut client = AnthropicClient::new(key)
            .with_model(self.llm.model.clone())
            .max_tokens(self.llm.max_tokens);
        if let Some(url) = &self.llm.base_url {
            client = client.base_url(url.clone());
        }
        Ok(Arc::new(client))
    }

    pub fn deploy_settings(&self) -> DeploySettings {
        DeploySettings {
            port: self.generation.port,
            install_timeout: Duration::from_secs(self.generation.install_timeout_secs),
            health_attempts: self.generation.health_attempts,
            health_interval: Duration::from_secs(self.generation.health_interval_secs),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        let mut profile = GenerationProfile::for_kind(self.generation.profile);
        if let Some(turns) = self.generation.max_turns {
            profile = profile.max_turns(turns);
        }
        SessionSettings {
            profile,
            sandbox: SandboxSpec {
                image: self.sandbox.image.clone(),
                ..SandboxSpec::default()
            },
            deploy: self.deploy_settings(),
            teardown: self.sandbox.teardown,
            bash_timeout: Duration::from_secs(self.generation.bash_timeout_secs.max(1)),
        }
    }
}
