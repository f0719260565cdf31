use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signed-in user as published by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Bearer token presented to the document store.
    pub id_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthUser {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
