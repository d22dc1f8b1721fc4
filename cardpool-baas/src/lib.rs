pub mod event;
pub mod mock;
pub mod provider;
pub mod signature;
pub mod synctera;

pub use event::{NormalizedEvent, PayoutState};
pub use mock::MockProvider;
pub use provider::{
    AccountHandle, BaasProvider, CardHandle, CardType, CustomerHandle, PayoutHandle,
    PayoutRequest, ProviderError, WebhookHeaders,
};
pub use synctera::{SyncteraConfig, SyncteraProvider};
