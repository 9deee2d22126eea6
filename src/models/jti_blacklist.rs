use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A blacklisted JWT ID. Membership here, checked during every verification, is authoritative:
/// no in-memory-only revocation state is permitted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JtiBlacklistEntry {
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

impl JtiBlacklistEntry {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
