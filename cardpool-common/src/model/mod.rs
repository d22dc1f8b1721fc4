pub mod account;
pub mod card;
pub mod entry;
pub mod event;
pub mod funding;
pub mod hold;
pub mod kyc;
pub mod wallet;
pub mod withdrawal;

pub type UserId = String;
pub type WalletId = String;
pub type CardId = String;
pub type AccountId = String;

/// Monetary amount in integer minor units (cents). Always signed; the posting
/// engine rejects non-positive entry amounts, balances carry the sign.
pub type AmountMinor = i64;

pub use account::{AccountScope, LedgerAccount};
pub use card::{Card, CardStatus};
pub use entry::{CaptureSplit, LedgerEntry, Posting, PostingReceipt};
pub use event::{BaasEvent, ProcessedEvent};
pub use funding::BaasFundingRoute;
pub use hold::{CardAuthHold, HoldStatus};
pub use kyc::{KycRecord, KycStatus};
pub use wallet::{MemberRole, SplitPolicy, Wallet, WalletMember};
pub use withdrawal::{TransferStatus, WithdrawalRequest, WithdrawalStatus, WithdrawalTransfer};
