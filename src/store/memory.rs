//! In-process session store
//!
//! Honours the same contract as the hosted backend: unique property URLs,
//! unique (user, property) pairs, rows scoped to the token's user, PKCE
//! verification on code exchange and single-use refresh tokens, plus the
//! `users` reference from subscriptions.
//!
//! Nothing is delivered to a browser: the `memory://` authorize URL and the
//! one-time links exist only for tests, which finish a sign-in through
//! [`MemoryStore::complete_sign_in`]. Run with this backend for local work
//! on the pages; real sign-ins need the hosted backend.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{SessionStore, StoreError, StoreResult};
use crate::models::{AuthUser, Property, Session, Subscription, TrackedProperty, User};
use crate::session::pkce;

/// Lifetime of issued access tokens
const DEFAULT_SESSION_TTL_SECS: i64 = 3600;

/// Unbound PKCE challenges kept; the oldest are dropped first
const MAX_PENDING_CHALLENGES: usize = 64;

#[derive(Debug, Clone)]
struct AccessGrant {
    user: AuthUser,
    expires_at: i64,
}

#[derive(Debug, Clone)]
struct PendingCode {
    email: String,
    code_challenge: String,
}

#[derive(Default)]
struct State {
    /// Auth identities by email
    accounts: HashMap<String, AuthUser>,
    access_tokens: HashMap<String, AccessGrant>,
    refresh_tokens: HashMap<String, AuthUser>,
    /// Challenges handed out by authorize/magic-link and not yet bound to a code
    pending_challenges: Vec<String>,
    codes: HashMap<String, PendingCode>,
    magic_links: Vec<String>,
    users: HashMap<String, User>,
    properties: Vec<Property>,
    subscriptions: Vec<Subscription>,
    unavailable: bool,
    failing_user_inserts: bool,
    refresh_delay: Option<Duration>,
}

impl State {
    fn push_challenge(&mut self, code_challenge: &str) {
        if self.pending_challenges.len() >= MAX_PENDING_CHALLENGES {
            self.pending_challenges.remove(0);
        }
        self.pending_challenges.push(code_challenge.to_string());
    }
}

pub struct MemoryStore {
    state: Mutex<State>,
    session_ttl_secs: i64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock the state, failing like an unreachable backend when switched off
    fn available(&self) -> StoreResult<MutexGuard<'_, State>> {
        let state = self.lock();
        if state.unavailable {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(state)
    }

    /// Simulate an outage (`true`) or recovery (`false`)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Make `insert_user` fail as if the backend were unreachable
    pub fn set_user_inserts_failing(&self, failing: bool) {
        self.lock().failing_user_inserts = failing;
    }

    /// Delay every `refresh_session` call by `delay`
    pub fn set_refresh_delay(&self, delay: Option<Duration>) {
        self.lock().refresh_delay = delay;
    }

    /// Sign `email` in directly, bypassing the code exchange
    pub fn sign_in(&self, email: &str) -> Session {
        let expires_at = Utc::now().timestamp() + self.session_ttl_secs;
        self.sign_in_expiring(email, expires_at)
    }

    /// Sign `email` in with a session expiring at `expires_at`
    pub fn sign_in_expiring(&self, email: &str, expires_at: i64) -> Session {
        let mut state = self.lock();
        let user = account_for(&mut state, email);
        issue_session(&mut state, user, expires_at)
    }

    /// Play the provider's part: bind the most recent PKCE challenge to a
    /// fresh authorization code for `email`
    pub fn complete_sign_in(&self, email: &str) -> Option<String> {
        let mut state = self.lock();
        let code_challenge = state.pending_challenges.pop()?;
        let code = Uuid::new_v4().to_string();
        state.codes.insert(
            code.clone(),
            PendingCode {
                email: email.to_string(),
                code_challenge,
            },
        );
        Some(code)
    }

    /// Addresses a one-time link was sent to, oldest first
    pub fn magic_links_sent(&self) -> Vec<String> {
        self.lock().magic_links.clone()
    }

    pub fn users(&self) -> Vec<User> {
        self.lock().users.values().cloned().collect()
    }

    pub fn properties(&self) -> Vec<Property> {
        self.lock().properties.clone()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.lock().subscriptions.clone()
    }

    /// Record a status as the listing checker would
    pub fn set_property_status(&self, url: &str, status: &str) {
        let mut state = self.lock();
        if let Some(property) = state.properties.iter_mut().find(|p| p.url == url) {
            property.current_status = Some(status.to_string());
            property.last_checked_at = Some(Utc::now());
        }
    }

    /// Whether `access_token` is still accepted
    pub fn is_token_active(&self, access_token: &str) -> bool {
        let state = self.lock();
        authorize(&state, access_token).is_ok()
    }
}

fn account_for(state: &mut State, email: &str) -> AuthUser {
    state
        .accounts
        .entry(email.to_lowercase())
        .or_insert_with(|| AuthUser {
            id: Uuid::new_v4().to_string(),
            email: Some(email.to_lowercase()),
        })
        .clone()
}

fn issue_session(state: &mut State, user: AuthUser, expires_at: i64) -> Session {
    let access_token = Uuid::new_v4().to_string();
    let refresh_token = Uuid::new_v4().to_string();

    state.access_tokens.insert(
        access_token.clone(),
        AccessGrant {
            user: user.clone(),
            expires_at,
        },
    );
    state.refresh_tokens.insert(refresh_token.clone(), user.clone());

    Session {
        access_token,
        refresh_token,
        token_type: "bearer".to_string(),
        expires_at,
        expires_in: None,
        user,
    }
}

/// Resolve the user behind a live access token
fn authorize(state: &State, access_token: &str) -> StoreResult<AuthUser> {
    match state.access_tokens.get(access_token) {
        Some(grant) if grant.expires_at > Utc::now().timestamp() => Ok(grant.user.clone()),
        Some(_) => Err(StoreError::Unauthorized("JWT expired".to_string())),
        None => Err(StoreError::Unauthorized("invalid JWT".to_string())),
    }
}

/// Row policy: callers only touch rows they own
fn authorize_owner(state: &State, access_token: &str, user_id: &str) -> StoreResult<AuthUser> {
    let user = authorize(state, access_token)?;
    if user.id != user_id {
        return Err(StoreError::Unauthorized(
            "row-level policy violation".to_string(),
        ));
    }
    Ok(user)
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        self.available().map(|_| ())
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> String {
        self.lock().push_challenge(code_challenge);

        format!(
            "memory://auth/authorize?provider={}&redirect_to={}&code_challenge={}",
            urlencoding::encode(provider),
            urlencoding::encode(redirect_to),
            urlencoding::encode(code_challenge)
        )
    }

    async fn send_magic_link(
        &self,
        email: &str,
        _redirect_to: &str,
        code_challenge: &str,
        create_user: bool,
    ) -> StoreResult<()> {
        let mut state = self.available()?;

        let known = state.accounts.contains_key(&email.to_lowercase());
        if !known && !create_user {
            return Err(StoreError::Unauthorized("Signups not allowed for otp".to_string()));
        }

        state.push_challenge(code_challenge);
        state.magic_links.push(email.to_string());
        Ok(())
    }

    async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> StoreResult<Session> {
        let mut state = self.available()?;

        let pending = state
            .codes
            .remove(auth_code)
            .ok_or_else(|| StoreError::Unauthorized("invalid flow state".to_string()))?;

        if pkce::challenge(code_verifier) != pending.code_challenge {
            return Err(StoreError::Unauthorized(
                "code challenge does not match previously saved code verifier".to_string(),
            ));
        }

        let user = account_for(&mut state, &pending.email);
        let expires_at = Utc::now().timestamp() + self.session_ttl_secs;
        Ok(issue_session(&mut state, user, expires_at))
    }

    async fn refresh_session(&self, refresh_token: &str) -> StoreResult<Session> {
        let delay = self.lock().refresh_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.available()?;

        let user = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| StoreError::Unauthorized("Invalid Refresh Token".to_string()))?;

        let expires_at = Utc::now().timestamp() + self.session_ttl_secs;
        Ok(issue_session(&mut state, user, expires_at))
    }

    async fn sign_out(&self, access_token: &str) -> StoreResult<()> {
        let mut state = self.available()?;

        let user_id = match state.access_tokens.get(access_token) {
            Some(grant) => grant.user.id.clone(),
            None => return Err(StoreError::Unauthorized("invalid JWT".to_string())),
        };

        state.access_tokens.retain(|_, grant| grant.user.id != user_id);
        state.refresh_tokens.retain(|_, user| user.id != user_id);
        Ok(())
    }

    async fn find_user(&self, access_token: &str, user_id: &str) -> StoreResult<Option<User>> {
        let state = self.available()?;
        authorize_owner(&state, access_token, user_id)?;
        Ok(state.users.get(user_id).cloned())
    }

    async fn insert_user(&self, access_token: &str, user: &User) -> StoreResult<()> {
        let mut state = self.available()?;
        authorize_owner(&state, access_token, &user.id)?;

        if state.failing_user_inserts {
            return Err(StoreError::Unavailable("users insert failed".to_string()));
        }

        if state.users.contains_key(&user.id) {
            return Err(StoreError::Conflict("users_pkey".to_string()));
        }
        state.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn upsert_property(&self, access_token: &str, url: &str) -> StoreResult<Property> {
        let mut state = self.available()?;
        authorize(&state, access_token)?;

        if let Some(existing) = state.properties.iter().find(|p| p.url == url) {
            return Ok(existing.clone());
        }

        let property = Property {
            id: Uuid::new_v4(),
            url: url.to_string(),
            current_status: None,
            last_checked_at: None,
        };
        state.properties.push(property.clone());
        Ok(property)
    }

    async fn find_subscription(
        &self,
        access_token: &str,
        user_id: &str,
        property_id: Uuid,
    ) -> StoreResult<Option<Subscription>> {
        let state = self.available()?;
        authorize_owner(&state, access_token, user_id)?;

        Ok(state
            .subscriptions
            .iter()
            .find(|s| s.user_id == user_id && s.property_id == property_id)
            .cloned())
    }

    async fn insert_subscription(
        &self,
        access_token: &str,
        user_id: &str,
        property_id: Uuid,
    ) -> StoreResult<Subscription> {
        let mut state = self.available()?;
        authorize_owner(&state, access_token, user_id)?;

        if !state.users.contains_key(user_id) {
            return Err(StoreError::Api {
                status: 409,
                message: "subscriptions_user_id_fkey".to_string(),
            });
        }

        if !state.properties.iter().any(|p| p.id == property_id) {
            return Err(StoreError::Api {
                status: 409,
                message: "subscriptions_property_id_fkey".to_string(),
            });
        }

        if state
            .subscriptions
            .iter()
            .any(|s| s.user_id == user_id && s.property_id == property_id)
        {
            return Err(StoreError::Conflict(
                "subscriptions_user_id_property_id_key".to_string(),
            ));
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            property_id,
            created_at: Some(Utc::now()),
        };
        state.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn list_tracked(
        &self,
        access_token: &str,
        user_id: &str,
    ) -> StoreResult<Vec<TrackedProperty>> {
        let state = self.available()?;
        authorize_owner(&state, access_token, user_id)?;

        // Newest first
        Ok(state
            .subscriptions
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id)
            .filter_map(|s| {
                state
                    .properties
                    .iter()
                    .find(|p| p.id == s.property_id)
                    .map(|property| TrackedProperty {
                        subscription_id: s.id,
                        property: property.clone(),
                    })
            })
            .collect())
    }

    async fn delete_subscription(
        &self,
        access_token: &str,
        user_id: &str,
        subscription_id: Uuid,
    ) -> StoreResult<bool> {
        let mut state = self.available()?;
        authorize_owner(&state, access_token, user_id)?;

        let before = state.subscriptions.len();
        state
            .subscriptions
            .retain(|s| !(s.id == subscription_id && s.user_id == user_id));
        Ok(state.subscriptions.len() < before)
    }
}
