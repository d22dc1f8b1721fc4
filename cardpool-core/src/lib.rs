pub mod card_program;
pub mod funding;
pub mod kyc;
pub mod pipeline;
pub mod splitting;
pub mod withdrawal;

pub use card_program::CardProgram;
pub use funding::FundingRouter;
pub use kyc::StatusUpdater;
pub use pipeline::{IngestOutcome, WebhookPipeline};
pub use splitting::{PolicyService, compute_splits};
pub use withdrawal::WithdrawalCoordinator;
