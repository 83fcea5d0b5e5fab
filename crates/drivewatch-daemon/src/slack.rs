//! Slack incoming-webhook notifier.

use async_trait::async_trait;
use drivewatch_core::{Notifier, NotifyError};
use serde_json::json;
use tracing::warn;

/// Posts each notification as `{"text": ...}` to a webhook URL.
pub struct SlackNotifier {
    http: reqwest::Client,
    webhook_url: Option<String>,
}

impl SlackNotifier {
    /// Without a URL every message is dropped with a warning.
    pub fn new(http: reqwest::Client, webhook_url: Option<String>) -> Self {
        if webhook_url.is_none() {
            warn!("Slack webhook URL is not set; notifications will only be logged");
        }
        Self { http, webhook_url }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let Some(url) = &self.webhook_url else {
            warn!("Slack webhook URL is not set");
            return Ok(());
        };

        let response = self
            .http
            .post(url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
