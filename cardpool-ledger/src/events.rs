//! Webhook event journals. `baas_events` is the raw audit table and is
//! written for every delivery; `processed_events` is the dedup table and is
//! written only once a handler has committed, so a failed handler leaves the
//! event eligible for the provider's retry.

use cardpool_common::model::{BaasEvent, ProcessedEvent};
use cardpool_common::utils::time::current_time;

use crate::manager::Ledger;

impl Ledger {
    /// Records the raw event for audit. Returns `false` when the
    /// `(provider, event id)` pair was already journaled; the first payload
    /// wins and `received_at` is not touched again.
    pub async fn record_event(
        &self,
        provider_name: &str,
        provider_event_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> bool {
        let event = {
            let mut state = self.state.write().await;
            let key = (provider_name.to_string(), provider_event_id.to_string());
            if state.baas_events.contains_key(&key) {
                return false;
            }
            let event = BaasEvent {
                provider_name: provider_name.to_string(),
                provider_event_id: provider_event_id.to_string(),
                event_type: event_type.to_string(),
                payload,
                received_at: current_time(),
                processed_at: None,
            };
            state.baas_events.insert(key, event.clone());
            event
        };
        self.journal_event(&event).await;
        true
    }

    pub async fn is_event_processed(&self, provider_name: &str, provider_event_id: &str) -> bool {
        self.state
            .read()
            .await
            .processed_events
            .contains_key(&(provider_name.to_string(), provider_event_id.to_string()))
    }

    /// Marks the event processed: inserts the dedup row and stamps the audit
    /// row. Idempotent under concurrent deliveries; the first writer wins.
    pub async fn mark_event_processed(&self, provider_name: &str, provider_event_id: &str) {
        let now = current_time();
        let mut state = self.state.write().await;
        let key = (provider_name.to_string(), provider_event_id.to_string());
        state.processed_events.entry(key.clone()).or_insert(ProcessedEvent {
            provider_name: provider_name.to_string(),
            provider_event_id: provider_event_id.to_string(),
            processed_at: now,
        });
        if let Some(event) = state.baas_events.get_mut(&key) {
            event.processed_at.get_or_insert(now);
        }
    }

    pub async fn event(&self, provider_name: &str, provider_event_id: &str) -> Option<BaasEvent> {
        self.state
            .read()
            .await
            .baas_events
            .get(&(provider_name.to_string(), provider_event_id.to_string()))
            .cloned()
    }

    pub async fn processed_event_count(&self) -> usize {
        self.state.read().await.processed_events.len()
    }
}
