use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use cardpool_common::model::{BaasEvent, PostingReceipt};
use cardpool_common::Result;

use crate::binlog::{Binlog, BinlogRecord};
use crate::state::State;

/// The ledger manager. All persisted state lives behind one `RwLock`; a
/// single write acquisition is the storage transaction every mutating method
/// runs inside. The lock is never held across an await on outside I/O.
#[derive(Debug)]
pub struct Ledger {
    pub(crate) state: Arc<RwLock<State>>,
    binlog: Option<Arc<Mutex<Binlog>>>,
}

impl Ledger {
    /// In-memory ledger without a durable audit log. This is what tests use.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::new())),
            binlog: None,
        }
    }

    /// Ledger with an append-only audit log under `data_dir`.
    pub async fn with_binlog(data_dir: &str) -> Result<Self> {
        let binlog = Binlog::new(data_dir).await?;
        Ok(Self {
            state: Arc::new(RwLock::new(State::new())),
            binlog: Some(Arc::new(Mutex::new(binlog))),
        })
    }

    /// Number of committed ledger entries. Cheap observability hook.
    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Appends a committed posting to the audit log. Best effort: the state
    /// change has already committed, so a write failure is logged rather than
    /// surfaced to the caller.
    pub(crate) async fn journal_posting(&self, receipt: &PostingReceipt) {
        if receipt.replayed {
            return;
        }
        if let Some(binlog) = &self.binlog {
            let record = BinlogRecord::Posting {
                receipt: receipt.clone(),
            };
            if let Err(e) = binlog.lock().await.append(&record).await {
                tracing::error!(
                    transaction_id = %receipt.transaction_id,
                    "failed to write posting to binlog: {}", e
                );
            }
        }
    }

    pub(crate) async fn journal_event(&self, event: &BaasEvent) {
        if let Some(binlog) = &self.binlog {
            let record = BinlogRecord::Event {
                event: event.clone(),
            };
            if let Err(e) = binlog.lock().await.append(&record).await {
                tracing::error!(
                    provider = %event.provider_name,
                    event_id = %event.provider_event_id,
                    "failed to write event to binlog: {}", e
                );
            }
        }
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
