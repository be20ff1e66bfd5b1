//! CI providers.
//!
//! [`Provider`] is the closed set of CI systems logs can come from. Each has
//! a [`LogSource`] implementation; [`ProviderRegistry`] builds them from the
//! provider environment (`GITHUB_TOKEN`, `JENKINS_URL`, ...).

mod local;
mod remote;

pub use local::{simulated_logs, LocalSource, SimulatedFailure, LOCAL_FAILURE_LOG};
pub use remote::{AzureSource, GithubSource, GitlabSource, JenkinsSource};

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{env_opt, env_string, SecretString};
use crate::error::ProviderError;
use crate::traits::{LogSource, LogSources};

/// Timeout for provider HTTP calls.
pub const PROVIDER_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Supported CI systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Local simulation.
    #[default]
    Local,
    /// GitHub Actions.
    Github,
    /// Jenkins.
    Jenkins,
    /// GitLab CI.
    Gitlab,
    /// Azure DevOps Pipelines.
    Azure,
}

impl Provider {
    /// Every provider.
    pub const ALL: [Self; 5] = [
        Self::Local,
        Self::Github,
        Self::Jenkins,
        Self::Gitlab,
        Self::Azure,
    ];

    /// Lowercase name used on the command line and in the audit log.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Github => "github",
            Self::Jenkins => "jenkins",
            Self::Gitlab => "gitlab",
            Self::Azure => "azure",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == name)
            .ok_or(ProviderError::UnknownProvider { name })
    }
}

/// Provider credentials and endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEnv {
    /// `GITHUB_TOKEN`.
    pub github_token: Option<SecretString>,
    /// `GITHUB_REPOSITORY` (`owner/repo`).
    pub github_repository: String,
    /// `GITHUB_API_URL`.
    pub github_api_url: String,
    /// Pre-downloaded log file checked before the API.
    pub github_log_file: PathBuf,
    /// `JENKINS_URL`.
    pub jenkins_url: Option<String>,
    /// `JENKINS_USER`.
    pub jenkins_user: Option<String>,
    /// `JENKINS_TOKEN`.
    pub jenkins_token: Option<SecretString>,
    /// `GITLAB_TOKEN`.
    pub gitlab_token: Option<SecretString>,
    /// `GITLAB_URL`.
    pub gitlab_url: String,
    /// `CI_PROJECT_ID`.
    pub gitlab_project_id: Option<String>,
    /// `AZURE_DEVOPS_ORG`.
    pub azure_org: Option<String>,
    /// `AZURE_DEVOPS_PROJECT`.
    pub azure_project: Option<String>,
    /// `AZURE_DEVOPS_PAT`.
    pub azure_pat: Option<SecretString>,
    /// `AZURE_DEVOPS_URL`.
    pub azure_url: String,
}

impl Default for ProviderEnv {
    fn default() -> Self {
        Self {
            github_token: None,
            github_repository: "user/repo".into(),
            github_api_url: "https://api.github.com".into(),
            github_log_file: PathBuf::from("build_logs.txt"),
            jenkins_url: None,
            jenkins_user: None,
            jenkins_token: None,
            gitlab_token: None,
            gitlab_url: "https://gitlab.com".into(),
            gitlab_project_id: None,
            azure_org: None,
            azure_project: None,
            azure_pat: None,
            azure_url: "https://dev.azure.com".into(),
        }
    }
}

impl ProviderEnv {
    /// Read provider variables from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            github_token: env_opt("GITHUB_TOKEN").map(SecretString::new),
            github_repository: env_string("GITHUB_REPOSITORY", &defaults.github_repository),
            github_api_url: env_string("GITHUB_API_URL", &defaults.github_api_url),
            github_log_file: env_opt("GITHUB_LOG_FILE").map_or(defaults.github_log_file, PathBuf::from),
            jenkins_url: env_opt("JENKINS_URL"),
            jenkins_user: env_opt("JENKINS_USER"),
            jenkins_token: env_opt("JENKINS_TOKEN").map(SecretString::new),
            gitlab_token: env_opt("GITLAB_TOKEN").map(SecretString::new),
            gitlab_url: env_string("GITLAB_URL", &defaults.gitlab_url),
            gitlab_project_id: env_opt("CI_PROJECT_ID"),
            azure_org: env_opt("AZURE_DEVOPS_ORG"),
            azure_project: env_opt("AZURE_DEVOPS_PROJECT"),
            azure_pat: env_opt("AZURE_DEVOPS_PAT").map(SecretString::new),
            azure_url: env_string("AZURE_DEVOPS_URL", &defaults.azure_url),
        }
    }
}

/// Builds [`LogSource`]s from a [`ProviderEnv`].
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    env: ProviderEnv,
    client: Client,
}

impl ProviderRegistry {
    /// Create a registry.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Api`] if the HTTP client cannot be built.
    pub fn new(env: ProviderEnv) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(PROVIDER_HTTP_TIMEOUT)
            .user_agent(concat!("ci-healer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Api {
                provider: "http".into(),
                message: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self { env, client })
    }

    /// Registry over the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Api`] if the HTTP client cannot be built.
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::new(ProviderEnv::from_env())
    }
}

impl LogSources for ProviderRegistry {
    fn source_for(&self, provider: Provider) -> Result<Arc<dyn LogSource>, ProviderError> {
        let env = &self.env;
        let client = self.client.clone();
        let source: Arc<dyn LogSource> = match provider {
            Provider::Local => Arc::new(LocalSource::new()),
            Provider::Github => Arc::new(GithubSource::new(
                client,
                env.github_token.clone(),
                env.github_repository.clone(),
                env.github_api_url.clone(),
                env.github_log_file.clone(),
            )),
            Provider::Jenkins => Arc::new(JenkinsSource::new(
                client,
                env.jenkins_url.clone(),
                env.jenkins_user.clone(),
                env.jenkins_token.clone(),
            )),
            Provider::Gitlab => Arc::new(GitlabSource::new(
                client,
                env.gitlab_token.clone(),
                env.gitlab_url.clone(),
                env.gitlab_project_id.clone(),
            )),
            Provider::Azure => Arc::new(AzureSource::new(
                client,
                env.azure_org.clone(),
                env.azure_project.clone(),
                env.azure_pat.clone(),
                env.azure_url.clone(),
            )),
        };
        Ok(source)
    }
}

pub(crate) fn missing(provider: Provider, message: impl Into<String>) -> ProviderError {
    ProviderError::MissingEnv {
        provider: provider.to_string(),
        message: message.into(),
    }
}

pub(crate) fn api_error(provider: Provider, message: impl Into<String>) -> ProviderError {
    ProviderError::Api {
        provider: provider.to_string(),
        message: message.into(),
    }
}

pub(crate) fn invalid_run_id(provider: Provider, run_id: &str, reason: &str) -> ProviderError {
    ProviderError::InvalidRunId {
        provider: provider.to_string(),
        run_id: run_id.to_string(),
        reason: reason.to_string(),
    }
}
