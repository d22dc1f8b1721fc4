//! Environment configuration. Anything the selected provider needs must be
//! present at start; a missing variable fails the boot instead of failing the
//! first request.

use cardpool_baas::SyncteraConfig;
use cardpool_common::{CardpoolError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Mock,
    Synctera,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub log_level: String,
    pub provider: ProviderKind,
    /// Binlog location; absent disables the audit log.
    pub data_dir: Option<String>,
    pub synctera: Option<SyncteraConfig>,
}

fn require(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CardpoolError::Config(format!("missing required environment variable {}", name)))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = require("JWT_SECRET")?;
        let log_level = optional("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let bind_addr = optional("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let data_dir = optional("DATA_DIR");

        let provider = match require("BAAS_PROVIDER")?.as_str() {
            "MOCK" => ProviderKind::Mock,
            "SYNCTERA" => ProviderKind::Synctera,
            other => {
                return Err(CardpoolError::Config(format!(
                    "unknown BAAS_PROVIDER {} (expected MOCK or SYNCTERA)",
                    other
                )))
            }
        };

        let synctera = match provider {
            ProviderKind::Synctera => Some(SyncteraConfig {
                api_key: require("SYNCTERA_API_KEY")?,
                base_url: require("SYNCTERA_BASE_URL")?,
                webhook_secret: require("SYNCTERA_WEBHOOK_SECRET")?,
                account_template_id: optional("SYNCTERA_ACCOUNT_TEMPLATE_ID"),
                card_product_id: require("SYNCTERA_CARD_PRODUCT_ID")?,
                account_currency: optional("SYNCTERA_ACCOUNT_CURRENCY")
                    .unwrap_or_else(|| "USD".to_string()),
            }),
            ProviderKind::Mock => None,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            log_level,
            provider,
            data_dir,
            synctera,
        })
    }
}
