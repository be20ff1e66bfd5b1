//! HTTP-backed providers: GitHub Actions, Jenkins, GitLab CI, Azure DevOps.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, info};

use super::{api_error, invalid_run_id, missing, Provider};
use crate::config::SecretString;
use crate::error::ProviderError;
use crate::traits::LogSource;

/// Maximum Azure log documents fetched per run.
const AZURE_MAX_LOGS: usize = 5;

async fn send_text(provider: Provider, request: RequestBuilder) -> Result<String, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| api_error(provider, format!("request failed: {e}")))?;
    let response = ensure_success(provider, response)?;
    response
        .text()
        .await
        .map_err(|e| api_error(provider, format!("failed to read body: {e}")))
}

fn ensure_success(provider: Provider, response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(api_error(
            provider,
            format!("{} returned {status}", response.url().path()),
        ))
    }
}

fn require_numeric(provider: Provider, run_id: &str) -> Result<(), ProviderError> {
    if !run_id.is_empty() && run_id.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(invalid_run_id(provider, run_id, "expected a numeric id"))
    }
}

/// GitHub Actions job logs.
///
/// A pre-downloaded log file (default `build_logs.txt`) wins over the API.
#[derive(Debug, Clone)]
pub struct GithubSource {
    client: Client,
    token: Option<SecretString>,
    repository: String,
    api_url: String,
    log_file: PathBuf,
}

impl GithubSource {
    /// Create a GitHub source.
    #[must_use]
    pub fn new(
        client: Client,
        token: Option<SecretString>,
        repository: String,
        api_url: String,
        log_file: PathBuf,
    ) -> Self {
        Self {
            client,
            token,
            repository,
            api_url: api_url.trim_end_matches('/').to_string(),
            log_file,
        }
    }
}

#[async_trait]
impl LogSource for GithubSource {
    async fn fetch_logs(&self, run_id: &str) -> Result<String, ProviderError> {
        self.validate_env()?;
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| missing(Provider::Github, "GITHUB_TOKEN is required"))?;

        if let Ok(bytes) = tokio::fs::read(&self.log_file).await {
            info!(file = %self.log_file.display(), "Using downloaded GitHub log file");
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }

        require_numeric(Provider::Github, run_id)?;
        let (owner, repo) = self
            .repository
            .split_once('/')
            .ok_or_else(|| missing(Provider::Github, "GITHUB_REPOSITORY must be owner/repo"))?;
        let url = format!("{}/repos/{owner}/{repo}/actions/jobs/{run_id}/logs", self.api_url);
        info!(run_id, repository = %self.repository, "Fetching GitHub job logs");

        send_text(
            Provider::Github,
            self.client
                .get(&url)
                .bearer_auth(token.expose())
                .header("Accept", "application/vnd.github+json")
                .header("X-GitHub-Api-Version", "2022-11-28"),
        )
        .await
    }

    fn context(&self) -> String {
        format!("GitHub Actions ({})", self.repository)
    }

    fn validate_env(&self) -> Result<(), ProviderError> {
        match &self.token {
            Some(t) if !t.is_blank() => Ok(()),
            _ => Err(missing(
                Provider::Github,
                "GITHUB_TOKEN is required for GitHub provider",
            )),
        }
    }
}

/// Jenkins console output.
///
/// Run ids are `job/123` or `folder/job/123`: job path segments followed by
/// the build number.
#[derive(Debug, Clone)]
pub struct JenkinsSource {
    client: Client,
    url: Option<String>,
    user: Option<String>,
    token: Option<SecretString>,
}

impl JenkinsSource {
    /// Create a Jenkins source.
    #[must_use]
    pub fn new(
        client: Client,
        url: Option<String>,
        user: Option<String>,
        token: Option<SecretString>,
    ) -> Self {
        Self {
            client,
            url: url.map(|u| u.trim_end_matches('/').to_string()),
            user,
            token,
        }
    }

    fn console_path(run_id: &str) -> Result<String, ProviderError> {
        let segments: Vec<&str> = run_id.split('/').collect();
        let Some((build, jobs)) = segments.split_last() else {
            return Err(invalid_run_id(Provider::Jenkins, run_id, "empty run id"));
        };
        if jobs.is_empty()
            || jobs.iter().any(|s| s.is_empty() || *s == "." || *s == "..")
            || require_numeric(Provider::Jenkins, build).is_err()
        {
            return Err(invalid_run_id(
                Provider::Jenkins,
                run_id,
                "expected <job path>/<build number>",
            ));
        }
        let job_path: String = jobs.iter().map(|j| format!("/job/{j}")).collect();
        Ok(format!("{job_path}/{build}/consoleText"))
    }
}

#[async_trait]
impl LogSource for JenkinsSource {
    async fn fetch_logs(&self, run_id: &str) -> Result<String, ProviderError> {
        self.validate_env()?;
        let base = self
            .url
            .as_deref()
            .ok_or_else(|| missing(Provider::Jenkins, "JENKINS_URL is required"))?;
        let url = format!("{base}{}", Self::console_path(run_id)?);
        info!(url = %url, "Fetching Jenkins console output");

        let mut request = self.client.get(&url);
        if let (Some(user), Some(token)) = (&self.user, &self.token) {
            request = request.basic_auth(user, Some(token.expose()));
        }
        send_text(Provider::Jenkins, request).await
    }

    fn context(&self) -> String {
        format!("Jenkins Host: {}", self.url.as_deref().unwrap_or("<unset>"))
    }

    fn validate_env(&self) -> Result<(), ProviderError> {
        if self.url.is_none() {
            return Err(missing(
                Provider::Jenkins,
                "JENKINS_URL is required for Jenkins provider",
            ));
        }
        if self.user.is_none() || self.token.is_none() {
            return Err(missing(
                Provider::Jenkins,
                "JENKINS_USER and JENKINS_TOKEN are required for Jenkins API auth",
            ));
        }
        Ok(())
    }
}

/// GitLab CI job traces.
#[derive(Debug, Clone)]
pub struct GitlabSource {
    client: Client,
    token: Option<SecretString>,
    base_url: String,
    project_id: Option<String>,
}

impl GitlabSource {
    /// Create a GitLab source.
    #[must_use]
    pub fn new(
        client: Client,
        token: Option<SecretString>,
        base_url: String,
        project_id: Option<String>,
    ) -> Self {
        Self {
            client,
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id,
        }
    }
}

#[async_trait]
impl LogSource for GitlabSource {
    async fn fetch_logs(&self, run_id: &str) -> Result<String, ProviderError> {
        self.validate_env()?;
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| missing(Provider::Gitlab, "GITLAB_TOKEN is required"))?;
        let project = self
            .project_id
            .as_deref()
            .ok_or_else(|| missing(Provider::Gitlab, "CI_PROJECT_ID is required"))?
            .replace('/', "%2F");
        require_numeric(Provider::Gitlab, run_id)?;

        let url = format!(
            "{}/api/v4/projects/{project}/jobs/{run_id}/trace",
            self.base_url
        );
        info!(run_id, "Fetching GitLab job trace");
        send_text(
            Provider::Gitlab,
            self.client.get(&url).header("PRIVATE-TOKEN", token.expose()),
        )
        .await
    }

    fn context(&self) -> String {
        format!("GitLab CI ({})", self.base_url)
    }

    fn validate_env(&self) -> Result<(), ProviderError> {
        if self.token.is_none() {
            return Err(missing(Provider::Gitlab, "GITLAB_TOKEN is required"));
        }
        if self.project_id.is_none() {
            return Err(missing(Provider::Gitlab, "CI_PROJECT_ID is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Timeline {
    #[serde(default)]
    records: Vec<TimelineRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimelineRecord {
    #[serde(default)]
    record_type: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogList {
    #[serde(default)]
    value: Vec<LogRef>,
}

#[derive(Debug, Deserialize)]
struct LogRef {
    id: u64,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Azure DevOps pipeline timeline and logs.
#[derive(Debug, Clone)]
pub struct AzureSource {
    client: Client,
    org: Option<String>,
    project: Option<String>,
    pat: Option<SecretString>,
    base_url: String,
}

impl AzureSource {
    /// Create an Azure DevOps source.
    #[must_use]
    pub fn new(
        client: Client,
        org: Option<String>,
        project: Option<String>,
        pat: Option<SecretString>,
        base_url: String,
    ) -> Self {
        Self {
            client,
            org,
            project,
            pat,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn get(&self, url: &str, pat: &SecretString) -> RequestBuilder {
        self.client.get(url).basic_auth("", Some(pat.expose()))
    }
}

#[async_trait]
impl LogSource for AzureSource {
    async fn fetch_logs(&self, run_id: &str) -> Result<String, ProviderError> {
        self.validate_env()?;
        let (Some(org), Some(project), Some(pat)) = (&self.org, &self.project, &self.pat) else {
            return Err(missing(
                Provider::Azure,
                "AZURE_DEVOPS_ORG, AZURE_DEVOPS_PROJECT and AZURE_DEVOPS_PAT must be set",
            ));
        };
        require_numeric(Provider::Azure, run_id)?;
        let base = format!("{}/{org}/{project}/_apis/build/builds/{run_id}", self.base_url);
        info!(run_id, "Fetching Azure DevOps timeline");

        let timeline: Timeline = ensure_success(
            Provider::Azure,
            self.get(&format!("{base}/timeline?api-version=7.1"), pat)
                .send()
                .await
                .map_err(|e| api_error(Provider::Azure, format!("request failed: {e}")))?,
        )?
        .json()
        .await
        .map_err(|e| api_error(Provider::Azure, format!("invalid timeline: {e}")))?;

        let mut lines: Vec<String> = timeline
            .records
            .iter()
            .map(|r| {
                format!(
                    "[{}] {}: {} - {}",
                    r.record_type.as_deref().unwrap_or_default(),
                    r.name.as_deref().unwrap_or_default(),
                    r.state.as_deref().unwrap_or_default(),
                    r.result.as_deref().unwrap_or_default(),
                )
            })
            .collect();

        // log bodies are best effort; the timeline alone is still useful
        let list = self
            .get(&format!("{base}/logs?api-version=7.1"), pat)
            .send()
            .await
            .ok()
            .filter(|r| r.status().is_success());
        if let Some(response) = list {
            let logs: LogList = response.json().await.unwrap_or(LogList { value: Vec::new() });
            for log in logs.value.iter().take(AZURE_MAX_LOGS) {
                let url = format!("{base}/logs/{}?api-version=7.1", log.id);
                match send_text(Provider::Azure, self.get(&url, pat)).await {
                    Ok(body) => lines.push(format!(
                        "\n--- Log {} ---\n{body}",
                        log.kind.as_deref().unwrap_or_default()
                    )),
                    Err(e) => debug!(log_id = log.id, error = %e, "Skipping Azure log"),
                }
            }
        }

        if lines.is_empty() {
            Ok(format!(
                "Run {run_id} timeline retrieved but no log content."
            ))
        } else {
            Ok(lines.join("\n"))
        }
    }

    fn context(&self) -> String {
        format!(
            "Azure DevOps ({}/{})",
            self.org.as_deref().unwrap_or("<unset>"),
            self.project.as_deref().unwrap_or("<unset>")
        )
    }

    fn validate_env(&self) -> Result<(), ProviderError> {
        if self.org.is_none() {
            return Err(missing(Provider::Azure, "AZURE_DEVOPS_ORG is required"));
        }
        if self.project.is_none() {
            return Err(missing(Provider::Azure, "AZURE_DEVOPS_PROJECT is required"));
        }
        if self.pat.is_none() {
            return Err(missing(
                Provider::Azure,
                "AZURE_DEVOPS_PAT is required for Azure DevOps API",
            ));
        }
        Ok(())
    }
}
