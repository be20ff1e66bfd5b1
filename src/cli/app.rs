//! Wiring of configuration into live components.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::info;

use crate::config::Config;
use crate::engine::{EngineSettings, RemediationEngine};
use crate::error::{AppError, ProviderError};
use crate::llm::AnthropicClient;
use crate::notify::NotifierSet;
use crate::providers::ProviderRegistry;
use crate::reports::{SloLedger, TokenLedger};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};
use crate::resolver::ProjectFileResolver;
use crate::shutdown::ShutdownSignal;
use crate::storage::Stores;
use crate::traits::{ModelClient, PreVerifier, SkipVerifier};
use crate::verify::CommandPreVerifier;

const NOTIFY_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a command needs.
pub struct App {
    /// Loaded configuration.
    pub config: Config,
    /// Durable state.
    pub stores: Stores,
    /// Log sources.
    pub registry: Arc<ProviderRegistry>,
    /// Process shutdown flag.
    pub shutdown: ShutdownSignal,
    model: Option<Arc<dyn ModelClient>>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("stores", &self.stores)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Open stores and build the provider registry.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the stores cannot be opened or the HTTP client
    /// cannot be built.
    pub async fn open(config: Config, shutdown: ShutdownSignal) -> Result<Self, AppError> {
        let stores = Stores::open(&config.state).await?;
        let registry = Arc::new(ProviderRegistry::from_env()?);
        Ok(Self {
            config,
            stores,
            registry,
            shutdown,
            model: None,
        })
    }

    /// Use `model` instead of the Anthropic client.
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn ModelClient>) -> Self {
        self.model = Some(model);
        self
    }

    /// Token ledger at the configured path.
    #[must_use]
    pub fn token_ledger(&self) -> TokenLedger {
        TokenLedger::new(&self.config.state.token_log_path, self.config.state.token_budget_alert)
    }

    /// SLO ledger at the configured path.
    #[must_use]
    pub fn slo_ledger(&self) -> SloLedger {
        SloLedger::new(&self.config.state.slo_log_path)
    }

    /// Build the engine, with the Anthropic client unless a model was injected.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the API key is missing, or
    /// [`AppError::Provider`] if the notification HTTP client cannot be built.
    pub fn engine(&self) -> Result<RemediationEngine, AppError> {
        let model: Arc<dyn ModelClient> = match &self.model {
            Some(model) => Arc::clone(model),
            None => Arc::new(AnthropicClient::from_config(&self.config.model)?),
        };
        self.engine_with(model)
    }

    /// Build the engine around `model`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`] if the notification HTTP client cannot
    /// be built.
    pub fn engine_with(&self, model: Arc<dyn ModelClient>) -> Result<RemediationEngine, AppError> {
        let config = &self.config;
        let http = Client::builder()
            .timeout(NOTIFY_HTTP_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Api {
                provider: "notify".into(),
                message: format!("Failed to create HTTP client: {e}"),
            })?;
        let notifier = NotifierSet::from_config(&config.notify, &http);
        let verifier: Arc<dyn PreVerifier> = if config.pipeline.skip_pre_verify {
            Arc::new(SkipVerifier)
        } else {
            Arc::new(CommandPreVerifier::default())
        };

        info!(
            notifiers = notifier.len(),
            pre_verify = !config.pipeline.skip_pre_verify,
            project_root = %config.pipeline.project_root.display(),
            "Engine configured"
        );

        Ok(RemediationEngine::new(
            model,
            Arc::new(ProjectFileResolver::new(&config.pipeline.project_root)),
            &self.stores,
            EngineSettings::from_config(config),
        )
        .with_breaker(Arc::new(CircuitBreaker::new(CircuitBreakerConfig::from(
            &config.breaker,
        ))))
        .with_notifier(Arc::new(notifier))
        .with_verifier(verifier)
        .with_ledgers(self.token_ledger(), self.slo_ledger())
        .with_shutdown(self.shutdown.clone()))
    }
}
