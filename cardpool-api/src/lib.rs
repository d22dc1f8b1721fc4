pub mod auth;
pub mod config;
pub mod interface;

pub use auth::Authenticator;
pub use config::{Config, ProviderKind};
pub use interface::api::{router, AppState};
