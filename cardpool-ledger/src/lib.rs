pub mod binlog;
pub mod directory;
pub mod engine;
pub mod events;
pub mod funding;
pub mod holds;
pub mod manager;
pub mod reconciliation;
pub mod service;
pub mod state;
pub mod withdrawals;

// Public re-exports
pub use engine::PostingError;
pub use holds::{AuthorizationDecision, DeclineReason};
pub use manager::Ledger;
pub use reconciliation::{CardReconciliation, MemberEquity, WalletReconciliation};
