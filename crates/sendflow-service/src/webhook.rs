//! Webhook notifications for completed requests.
//!
//! Errors are logged and never reach the caller or the per-request result
//! channel.

use sendflow_core::transport::TransportResult;
use sendflow_core::{Priority, RequestId, Timestamp};
use std::time::Duration;
use tracing::{debug, error};

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts completion summaries to a configured URL
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// POST the completion summary. Best-effort.
    pub async fn notify(
        &self,
        request_id: &RequestId,
        priority: Priority,
        result: &TransportResult,
        metadata: &serde_json::Value,
    ) {
        let payload = serde_json::json!({
            "request_id": request_id,
            "timestamp": Timestamp::now(),
            "priority": priority.name(),
            "success": result.success,
            "duration": result.duration,
            "metadata": metadata,
        });

        let outcome = self
            .client
            .post(&self.url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(&payload)
            .send()
            .await;

        match outcome {
            Ok(response) => {
                debug!(request_id = %request_id, status = response.status().as_u16(), "Webhook delivered")
            }
            Err(err) => error!(request_id = %request_id, %err, "Webhook notification failed"),
        }
    }
}
