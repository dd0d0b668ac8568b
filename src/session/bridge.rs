use std::sync::Arc;
use std::time::Duration;

use super::cookies::{decode_session, encode_session, CookieJar, SessionCookie, SetCookie};
use crate::config::Config;
use crate::constants::{
    CODE_VERIFIER_MAX_AGE_SECS, CODE_VERIFIER_SUFFIX, SESSION_COOKIE_MAX_AGE_SECS,
    SESSION_EXPIRY_MARGIN_SECS,
};
use crate::models::Session;
use crate::store::{SessionStore, StoreError};

/// Outcome of resolving the session for one request
#[derive(Debug, Default)]
pub struct ResolvedSession {
    pub session: Option<Session>,
    /// Cookies to write on the outgoing response
    pub cookies: Vec<SetCookie>,
}

impl ResolvedSession {
    fn anonymous() -> Self {
        Self::default()
    }
}

/// Keeps the session cookie in step with the session store
///
/// The single place that reads, refreshes, writes and clears auth cookies.
/// Every execution context (middleware, page handlers, API routes) goes
/// through it.
#[derive(Clone)]
pub struct SessionBridge {
    store: Arc<dyn SessionStore>,
    cookie_name: String,
    secure: bool,
    refresh_timeout: Duration,
}

impl SessionBridge {
    pub fn new(store: Arc<dyn SessionStore>, config: &Config) -> Self {
        Self {
            store,
            cookie_name: config.session_cookie_name(),
            secure: config.secure_cookies(),
            refresh_timeout: Duration::from_millis(config.session_refresh_timeout_ms),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn verifier_cookie_name(&self) -> String {
        format!("{}{}", self.cookie_name, CODE_VERIFIER_SUFFIX)
    }

    /// Determine the current session, refreshing it when close to expiry
    ///
    /// Never fails: an unreachable store or a slow refresh yields an
    /// anonymous result with the cookies left as they were.
    pub async fn get_session(&self, jar: &CookieJar) -> ResolvedSession {
        let session = match decode_session(jar, &self.cookie_name) {
            SessionCookie::Absent => return ResolvedSession::anonymous(),
            SessionCookie::Corrupt => {
                tracing::warn!("Undecodable session cookie, clearing");
                return ResolvedSession {
                    session: None,
                    cookies: self.clear_session(jar),
                };
            }
            SessionCookie::Valid(session) => session,
        };

        if !session.expires_within(SESSION_EXPIRY_MARGIN_SECS) {
            return ResolvedSession {
                session: Some(session),
                cookies: Vec::new(),
            };
        }

        self.refresh(jar, &session).await
    }

    async fn refresh(&self, jar: &CookieJar, session: &Session) -> ResolvedSession {
        let refreshed = tokio::time::timeout(
            self.refresh_timeout,
            self.store.refresh_session(&session.refresh_token),
        )
        .await;

        match refreshed {
            Ok(Ok(fresh)) => {
                tracing::debug!("Refreshed session for user {}", fresh.user_id());
                ResolvedSession {
                    cookies: self.session_cookies(jar, &fresh),
                    session: Some(fresh),
                }
            }
            Ok(Err(StoreError::Unauthorized(reason))) => {
                tracing::info!("Session refresh rejected ({}), clearing cookies", reason);
                ResolvedSession {
                    session: None,
                    cookies: self.clear_session(jar),
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("Session refresh failed, continuing anonymously: {}", e);
                ResolvedSession::anonymous()
            }
            Err(_) => {
                tracing::warn!(
                    "Session refresh timed out after {:?}, continuing anonymously",
                    self.refresh_timeout
                );
                ResolvedSession::anonymous()
            }
        }
    }

    /// Cookies persisting `session`, expiring stale chunks still on the request
    pub fn session_cookies(&self, jar: &CookieJar, session: &Session) -> Vec<SetCookie> {
        let pairs = match encode_session(&self.cookie_name, session) {
            Ok(pairs) => pairs,
            Err(e) => {
                tracing::error!("Failed to encode session cookie: {}", e);
                return self.clear_session(jar);
            }
        };

        let mut cookies: Vec<SetCookie> = jar
            .chunk_names(&self.cookie_name)
            .into_iter()
            .filter(|existing| !pairs.iter().any(|(name, _)| name == existing))
            .map(|stale| SetCookie::removal(stale).secure(self.secure))
            .collect();

        cookies.extend(pairs.into_iter().map(|(name, value)| {
            SetCookie::new(name, value, SESSION_COOKIE_MAX_AGE_SECS).secure(self.secure)
        }));

        cookies
    }

    /// Expire every auth cookie on the request plus the primary session cookie
    pub fn clear_session(&self, jar: &CookieJar) -> Vec<SetCookie> {
        let mut names: Vec<String> = jar.auth_cookie_names().map(str::to_string).collect();
        if !names.iter().any(|name| name == &self.cookie_name) {
            names.push(self.cookie_name.clone());
        }

        names
            .into_iter()
            .map(|name| SetCookie::removal(name).secure(self.secure))
            .collect()
    }

    /// Revoke the session at the store (best effort) and clear all auth cookies
    ///
    /// Safe to call without a session.
    pub async fn sign_out(&self, jar: &CookieJar, session: Option<&Session>) -> Vec<SetCookie> {
        if let Some(session) = session {
            match self.store.sign_out(&session.access_token).await {
                Ok(()) => tracing::info!("User {} signed out", session.user_id()),
                Err(e) => tracing::warn!("Store sign-out failed, clearing cookies anyway: {}", e),
            }
        }

        self.clear_session(jar)
    }

    pub fn verifier_cookie(&self, verifier: &str) -> SetCookie {
        SetCookie::new(
            self.verifier_cookie_name(),
            verifier,
            CODE_VERIFIER_MAX_AGE_SECS,
        )
        .secure(self.secure)
    }

    pub fn clear_verifier_cookie(&self) -> SetCookie {
        SetCookie::removal(self.verifier_cookie_name()).secure(self.secure)
    }
}
