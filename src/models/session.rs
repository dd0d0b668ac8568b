use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Identity attached to a session by the session store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens issued by the session store
///
/// Matches the store's token response, so the same type is decoded from
/// the network and from the session cookie.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Unix timestamp (seconds)
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default, skip_serializing)]
    pub expires_in: Option<i64>,
    pub user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Fill `expires_at` from `expires_in` when the store only sent the latter
    pub fn normalized(mut self) -> Self {
        if self.expires_at == 0 {
            if let Some(expires_in) = self.expires_in {
                self.expires_at = Utc::now().timestamp() + expires_in;
            }
        }
        self
    }

    /// True when the session expires within `margin_secs` from now
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        self.expires_at - Utc::now().timestamp() <= margin_secs
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
