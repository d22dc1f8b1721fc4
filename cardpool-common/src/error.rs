use thiserror::Error;

/// Central error taxonomy for the cardpool core.
///
/// The interface layer maps these onto HTTP status codes; everything below it
/// propagates them with `?`. `Invariant` is reserved for conditions that can
/// only be reached through a bug and is logged at fatal severity at the point
/// of detection.
#[derive(Debug, Error)]
pub enum CardpoolError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient equity for member {user_id}: available {available}, requested {requested}")]
    InsufficientEquity {
        user_id: String,
        available: i64,
        requested: i64,
    },

    #[error("Insufficient pending balance on card {card_id}: available {available}, requested {requested}")]
    InsufficientPendingBalance {
        card_id: String,
        available: i64,
        requested: i64,
    },

    #[error("Provider account {0} is already linked to a card")]
    AccountAlreadyLinkedToCard(String),

    #[error("Withdrawal {0} is already processing and can no longer be cancelled")]
    CannotCancelProcessingWithdrawal(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Ledger invariant violated: {0}")]
    Invariant(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Provider rejected request ({code}): {detail}")]
    ProviderRejected { code: String, detail: String },

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Unsupported event type: {0}")]
    UnsupportedEventType(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CardpoolError>;
