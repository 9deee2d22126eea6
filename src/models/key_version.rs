use chrono::{DateTime, Utc};

/// One RSA key pair in the signing key lifecycle. At most two versions are ever
/// verification-eligible at once: `current` and `previous` (see the Key Service).
#[derive(Clone)]
pub struct KeyVersion {
    pub version: String,
    pub public_key_pem: String,
    pub private_key_pem: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl std::fmt::Debug for KeyVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVersion")
            .field("version", &self.version)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}
