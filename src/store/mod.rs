//! Session Store access
//!
//! The hosted backend issues sessions and stores the `users`, `properties`
//! and `subscriptions` collections. Every data call carries the caller's
//! access token so the backend's row-level policies scope it to that user.

pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Property, Session, Subscription, TrackedProperty, User};

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

/// Errors surfaced by a session store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Network failure, timeout or a 5xx from the backend
    #[error("Session store unavailable: {0}")]
    Unavailable(String),

    /// Credentials, token or authorization code rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unique constraint violation
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Session store error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Authentication and data operations offered by the backend
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Probe the backend
    async fn health_check(&self) -> StoreResult<()>;

    // Authentication

    /// Address that starts the OAuth flow for `provider`
    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> String;

    /// Email a one-time sign-in link
    async fn send_magic_link(
        &self,
        email: &str,
        redirect_to: &str,
        code_challenge: &str,
        create_user: bool,
    ) -> StoreResult<()>;

    /// Trade an authorization code plus PKCE verifier for a session
    async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> StoreResult<Session>;

    async fn refresh_session(&self, refresh_token: &str) -> StoreResult<Session>;

    /// Revoke every session of the token's user
    async fn sign_out(&self, access_token: &str) -> StoreResult<()>;

    // Data

    async fn find_user(&self, access_token: &str, user_id: &str) -> StoreResult<Option<User>>;

    async fn insert_user(&self, access_token: &str, user: &User) -> StoreResult<()>;

    /// Find the property with `url`, creating it when absent
    ///
    /// Relies on the unique URL constraint, so concurrent callers converge
    /// on one row.
    async fn upsert_property(&self, access_token: &str, url: &str) -> StoreResult<Property>;

    async fn find_subscription(
        &self,
        access_token: &str,
        user_id: &str,
        property_id: Uuid,
    ) -> StoreResult<Option<Subscription>>;

    /// Fails with [`StoreError::Conflict`] when the pair already exists
    async fn insert_subscription(
        &self,
        access_token: &str,
        user_id: &str,
        property_id: Uuid,
    ) -> StoreResult<Subscription>;

    async fn list_tracked(
        &self,
        access_token: &str,
        user_id: &str,
    ) -> StoreResult<Vec<TrackedProperty>>;

    /// Returns whether a subscription owned by `user_id` was removed
    async fn delete_subscription(
        &self,
        access_token: &str,
        user_id: &str,
        subscription_id: Uuid,
    ) -> StoreResult<bool>;
}
