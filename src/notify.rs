//! Outbound notifications: Slack, `PagerDuty` and a generic JSON webhook.
//!
//! [`NotifierSet`] fans one event out to every configured channel. Delivery
//! is best effort: failures are logged and reported as `false`, never raised.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{NotifyConfig, SecretString};
use crate::traits::Notifier;

/// Repeated analysis failures crossed the alert threshold.
pub const EVENT_HEAL_FAILURE: &str = "heal_failure";
/// A diagnosis was below the confidence threshold.
pub const EVENT_NEEDS_REVIEW: &str = "needs_human_review";
/// A fix was written to disk.
pub const EVENT_FIX_APPLIED: &str = "fix_applied";

/// `PagerDuty` Events v2 endpoint.
pub const PAGERDUTY_EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Human-readable one-liner for an event.
fn summary(event: &str, payload: &Value) -> String {
    payload
        .get("message")
        .and_then(Value::as_str)
        .map_or_else(|| format!("[{event}] {payload}"), |m| format!("[{event}] {m}"))
}

async fn post_json(channel: &str, request: reqwest::RequestBuilder, body: &Value) -> bool {
    match request.timeout(NOTIFY_TIMEOUT).json(body).send().await {
        Ok(response) if response.status().is_success() => {
            debug!(channel, "Notification delivered");
            true
        }
        Ok(response) => {
            warn!(channel, status = %response.status(), "Notification rejected");
            false
        }
        Err(e) => {
            warn!(channel, error = %e, "Notification failed");
            false
        }
    }
}

/// Slack incoming webhook.
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    client: Client,
    webhook_url: SecretString,
}

impl SlackNotifier {
    /// Create a Slack notifier.
    #[must_use]
    pub const fn new(client: Client, webhook_url: SecretString) -> Self {
        Self {
            client,
            webhook_url,
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, event: &str, payload: &Value) -> bool {
        let text = summary(event, payload);
        let color = if event == EVENT_HEAL_FAILURE { "danger" } else { "warning" };
        let body = json!({
            "text": text,
            "attachments": [{"color": color, "text": text}],
        });
        post_json("slack", self.client.post(self.webhook_url.expose()), &body).await
    }
}

/// `PagerDuty` Events v2. Only failure alerts page.
#[derive(Debug, Clone)]
pub struct PagerDutyNotifier {
    client: Client,
    routing_key: SecretString,
    endpoint: String,
}

impl PagerDutyNotifier {
    /// Create a `PagerDuty` notifier targeting the public events endpoint.
    #[must_use]
    pub fn new(client: Client, routing_key: SecretString) -> Self {
        Self {
            client,
            routing_key,
            endpoint: PAGERDUTY_EVENTS_URL.to_string(),
        }
    }

    /// Override the events endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Notifier for PagerDutyNotifier {
    async fn notify(&self, event: &str, payload: &Value) -> bool {
        if event != EVENT_HEAL_FAILURE {
            return false;
        }
        let body = json!({
            "routing_key": self.routing_key.expose(),
            "event_action": "trigger",
            "payload": {
                "summary": summary(event, payload),
                "severity": "error",
                "source": "ci-healer",
            },
        });
        post_json("pagerduty", self.client.post(&self.endpoint), &body).await
    }
}

/// Generic webhook receiving `{"event": ..., "payload": ...}`.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    secret: Option<SecretString>,
}

impl WebhookNotifier {
    /// Create a webhook notifier.
    #[must_use]
    pub const fn new(client: Client, url: String, secret: Option<SecretString>) -> Self {
        Self {
            client,
            url,
            secret,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &str, payload: &Value) -> bool {
        let mut request = self.client.post(&self.url);
        if let Some(secret) = &self.secret {
            request = request.header("X-Webhook-Secret", secret.expose());
        }
        let body = json!({"event": event, "payload": payload});
        post_json("webhook", request, &body).await
    }
}

/// Every configured channel.
#[derive(Clone, Default)]
pub struct NotifierSet {
    channels: Vec<Arc<dyn Notifier>>,
}

impl std::fmt::Debug for NotifierSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierSet")
            .field("channels", &self.channels.len())
            .finish()
    }
}

impl NotifierSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel.
    #[must_use]
    pub fn with(mut self, channel: Arc<dyn Notifier>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Build the set from configuration; unset channels are skipped.
    #[must_use]
    pub fn from_config(config: &NotifyConfig, client: &Client) -> Self {
        let mut set = Self::new();
        if let Some(url) = config.slack_webhook_url.clone().filter(|u| !u.is_blank()) {
            set = set.with(Arc::new(SlackNotifier::new(client.clone(), url)));
        }
        if let Some(key) = config.pagerduty_routing_key.clone().filter(|k| !k.is_blank()) {
            set = set.with(Arc::new(PagerDutyNotifier::new(client.clone(), key)));
        }
        if let Some(url) = config.webhook_url.clone().filter(|u| !u.trim().is_empty()) {
            set = set.with(Arc::new(WebhookNotifier::new(
                client.clone(),
                url,
                config.webhook_secret.clone(),
            )));
        }
        set
    }

    /// Number of configured channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if no channel is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[async_trait]
impl Notifier for NotifierSet {
    async fn notify(&self, event: &str, payload: &Value) -> bool {
        let results = futures_util::future::join_all(
            self.channels.iter().map(|c| c.notify(event, payload)),
        )
        .await;
        results.into_iter().any(|delivered| delivered)
    }
}
