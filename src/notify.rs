//! Change notifications
//!
//! The storage stage requests a notification after every changelog append.
//! Delivery is fire-and-forget: implementations log failures and never
//! propagate them, so a broken notification channel cannot fail a crawl.

use crate::model::ChangeEvent;
use async_trait::async_trait;
use std::time::Duration;

/// Receiver of add/update events
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Reports one detected change; must not fail the caller
    async fn notify(&self, event: ChangeEvent, bts_id: i64);
}

/// Default notifier: records the event in the log and nothing else
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: ChangeEvent, bts_id: i64) {
        tracing::info!("[notify] {} b{}", event, bts_id);
    }
}

/// POSTs each event as JSON to a configured webhook
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: ChangeEvent, bts_id: i64) {
        let payload = serde_json::json!({
            "event": event.to_db_string(),
            "bts_id": bts_id,
        });

        let result = self
            .client
            .post(&self.url)
            .timeout(Duration::from_secs(5))
            .json(&payload)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("[notify] delivered {} b{}", event, bts_id);
            }
            Ok(response) => {
                tracing::warn!(
                    "[notify] webhook returned {} for {} b{}",
                    response.status(),
                    event,
                    bts_id
                );
            }
            Err(e) => {
                tracing::warn!("[notify] webhook delivery failed for b{}: {}", bts_id, e);
            }
        }
    }
}
