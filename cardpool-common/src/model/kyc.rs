use serde::{Deserialize, Serialize};

use super::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    Unverified,
    Pending,
    Verified,
    Rejected,
}

/// Last verification verdict the provider reported for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycRecord {
    pub user_id: UserId,
    pub status: KycStatus,
    pub updated_at: u64,
}
