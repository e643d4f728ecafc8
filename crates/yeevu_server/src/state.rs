//! Shared application state.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{info, warn};
use yeevu_core::{
    is_local_client, DailyQuota, QuotaDecision, SessionRunner, SessionSettings, YeevuConfig,
};
use yeevu_llm::LlmClient;
use yeevu_sandbox::SandboxProvider;

use crate::error::{ServerError, ServerResult};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    settings: SessionSettings,
    provider: Option<Arc<dyn SandboxProvider>>,
    llm: Option<Arc<dyn LlmClient>>,
    /// Why a generation cannot run, if it cannot
    missing_credentials: Option<String>,
    quota: Mutex<DailyQuota>,
    exempt_localhost: bool,
}

impl AppState {
    /// Build clients from configuration.
    ///
    /// Missing credentials are not fatal here: the server starts and the
    /// affected endpoints answer with a configuration error.
    pub fn from_config(config: &YeevuConfig) -> Self {
        let provider = config
            .build_provider()
            .map_err(|e| warn!("Sandbox provider unavailable: {}", e))
            .ok();
        let llm = config
            .build_llm()
            .map_err(|e| warn!("LLM client unavailable: {}", e))
            .ok();
        let missing_credentials = config.require_credentials().err().map(|e| e.to_string());

        Self::build(config, provider, llm, missing_credentials)
    }

    /// State with explicit clients.
    pub fn new(
        config: &YeevuConfig,
        provider: Arc<dyn SandboxProvider>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self::build(config, Some(provider), Some(llm), None)
    }

    fn build(
        config: &YeevuConfig,
        provider: Option<Arc<dyn SandboxProvider>>,
        llm: Option<Arc<dyn LlmClient>>,
        missing_credentials: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings: config.session_settings(),
                provider,
                llm,
                missing_credentials,
                quota: Mutex::new(DailyQuota::new(config.quota.daily_capacity, Utc::now())),
                exempt_localhost: config.quota.exempt_localhost,
            }),
        }
    }

    /// Runner for a new session, or the configuration error preventing one.
    pub fn runner(&self) -> ServerResult<SessionRunner> {
        if let Some(message) = &self.inner.missing_credentials {
            return Err(ServerError::Config(message.clone()));
        }
        match (&self.inner.provider, &self.inner.llm) {
            (Some(provider), Some(llm)) => Ok(SessionRunner::new(
                provider.clone(),
                llm.clone(),
                self.inner.settings.clone(),
            )),
            _ => Err(ServerError::Config(
                "Missing required API keys. Need DAYTONA_API_KEY and ANTHROPIC_API_KEY".to_string(),
            )),
        }
    }

    /// Provider for sandbox operations outside a session.
    pub fn provider(&self) -> ServerResult<Arc<dyn SandboxProvider>> {
        self.inner
            .provider
            .clone()
            .ok_or_else(|| ServerError::Config("DAYTONA_API_KEY is not configured".to_string()))
    }

    /// Count a generation request against the daily quota.
    pub fn admit(
        &self,
        forwarded_for: Option<&str>,
        real_ip: Option<&str>,
        peer: Option<IpAddr>,
    ) -> ServerResult<()> {
        if self.inner.exempt_localhost && is_local_client(forwarded_for, real_ip, peer) {
            return Ok(());
        }
        match self.inner.quota.lock().check_and_increment(Utc::now()) {
            QuotaDecision::Allowed { remaining } => {
                info!("Generation admitted, {} remaining today", remaining);
                Ok(())
            }
            QuotaDecision::Denied { reset_at } => {
                warn!("Daily quota exhausted until {}", reset_at);
                Err(ServerError::QuotaExceeded { reset_at })
            }
        }
    }
}
