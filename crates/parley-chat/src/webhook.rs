//! Workflow-engine webhook client.
//!
//! Forwards chat input to the configured n8n webhook and normalizes the
//! reply, which arrives in one of several known JSON shapes, into a single
//! string.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use parley_core::config::WebhookConfig;

use crate::error::RelayError;

/// Returned when the workflow engine answers 2xx but none of the known
/// reply shapes match.
pub const NO_REPLY_FALLBACK: &str = "No response from agent.";

/// HTTP client for the external workflow engine.
///
/// The URL is selected once at construction from the configured mode
/// (test vs production base path). Every call runs under the configured
/// timeout; exceeding it is a failure, not a hang.
pub struct WebhookClient {
    client: reqwest::Client,
    url: String,
}

impl WebhookClient {
    /// Build a client for the configured webhook endpoint.
    pub fn new(config: &WebhookConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RelayError::Upstream(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url().to_string(),
        })
    }

    /// The endpoint this client posts to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Forward a chat message and return the extracted bot reply.
    ///
    /// Transport failures, timeouts, and non-2xx statuses all surface as
    /// `Upstream` errors. An unrecognized 2xx body is not an error; it
    /// yields [`NO_REPLY_FALLBACK`].
    pub async fn forward(
        &self,
        session_id: Uuid,
        user_id: &str,
        message: &str,
    ) -> Result<String, RelayError> {
        let payload = serde_json::json!({
            "sessionId": session_id,
            "userId": user_id,
            "chatInput": message,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RelayError::Upstream(format!("Webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Upstream(format!(
                "Webhook returned status {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RelayError::Upstream(format!("Webhook reply was not JSON: {}", e)))?;

        debug!(session_id = %session_id, "Webhook reply received");

        let reply = extract_reply(&body).unwrap_or_else(|| NO_REPLY_FALLBACK.to_string());
        Ok(normalize_reply(&reply))
    }
}

/// Try the known reply shapes in order.
///
/// 1. `{"response": "..."}`
/// 2. `{"markdown": "..."}`
/// 3. `{"data": {"response": "..."}}` (one level of nesting only)
/// 4. a list of any of the above; the first element wins
pub fn extract_reply(body: &Value) -> Option<String> {
    match body {
        Value::Object(_) => extract_from_object(body),
        Value::Array(items) => items.first().and_then(extract_from_object),
        _ => None,
    }
}

fn extract_from_object(value: &Value) -> Option<String> {
    value
        .get("response")
        .and_then(Value::as_str)
        .or_else(|| value.get("markdown").and_then(Value::as_str))
        .or_else(|| {
            value
                .get("data")
                .and_then(|data| data.get("response"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
}

/// Collapse embedded newlines to single spaces. Display formatting only.
fn normalize_reply(text: &str) -> String {
    text.replace("\r\n", " ").replace('\n', " ")
}
