use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mirrored user row kept in the `users` collection
///
/// Inserted once after the first successful sign-in; never updated or
/// deleted by this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Identity issued by the session store (opaque)
    pub id: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build the mirror record for a freshly authenticated identity
    pub fn mirror(id: &str, email: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            email: email.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    /// Minimal shape check for an email entered on the sign-in form
    pub fn validate_email(email: &str) -> bool {
        let email = email.trim();
        match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !email.chars().any(char::is_whitespace)
                    && !domain.contains('@')
            }
            None => false,
        }
    }
}
