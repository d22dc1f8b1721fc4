use serde::{Deserialize, Serialize};

/// Raw audit row for every webhook the pipeline has seen, retained
/// indefinitely so operators can replay offline. Unique on
/// `(provider_name, provider_event_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaasEvent {
    pub provider_name: String,
    pub provider_event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub received_at: u64,
    pub processed_at: Option<u64>,
}

/// Dedup row, written only once the event's handler has committed. Keeping
/// this separate from the audit row is what lets a failed handler be retried
/// by the provider without the retry being swallowed as a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub provider_name: String,
    pub provider_event_id: String,
    pub processed_at: u64,
}
