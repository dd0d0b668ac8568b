use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{SessionStore, StoreError, StoreResult};
use crate::models::{Property, Session, Subscription, TrackedProperty, User};

/// Postgres unique_violation
const UNIQUE_VIOLATION: &str = "23505";

const PKCE_METHOD: &str = "s256";

/// Client for the hosted backend's auth (`/auth/v1`) and data (`/rest/v1`) APIs
#[derive(Clone)]
pub struct SupabaseStore {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

/// Error body shapes returned by the auth and data APIs
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<serde_json::Value>,
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl ErrorBody {
    fn code(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        }
    }

    fn message(&self) -> String {
        self.error_description
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

#[derive(Clone, Copy)]
enum Surface {
    Auth,
    Data,
}

/// Subscription row with its property embedded
#[derive(Debug, Deserialize)]
struct SubscriptionRow {
    id: Uuid,
    properties: Option<Property>,
}

impl SupabaseStore {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> StoreResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Request carrying the project key and, when given, the user's token
    fn request(&self, method: Method, url: String, access_token: Option<&str>) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token.unwrap_or(self.anon_key.as_str()))
    }

    async fn check(response: Response, surface: Surface) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        let error = classify(status, &body, surface);
        if let StoreError::Unavailable(ref message) = error {
            tracing::error!("Session store returned {}: {}", status, message);
        }
        Err(error)
    }

    async fn json<T: DeserializeOwned>(response: Response, surface: Surface) -> StoreResult<T> {
        let response = Self::check(response, surface).await?;
        Ok(response.json().await?)
    }

    async fn token_request(&self, grant_type: &str, body: serde_json::Value) -> StoreResult<Session> {
        let response = self
            .request(Method::POST, self.auth_url("token"), None)
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await?;

        let session: Session = Self::json(response, Surface::Auth).await?;
        Ok(session.normalized())
    }

    async fn find_property_by_url(&self, access_token: &str, url: &str) -> StoreResult<Option<Property>> {
        let response = self
            .request(Method::GET, self.rest_url("properties"), Some(access_token))
            .query(&[
                ("select", "id,url,current_status,last_checked_at".to_string()),
                ("url", format!("eq.{}", url)),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<Property> = Self::json(response, Surface::Data).await?;
        Ok(rows.into_iter().next())
    }
}

/// Map a failed response onto [`StoreError`]
///
/// Only a unique violation is a conflict. PostgREST also answers 409 for
/// foreign key violations (23503); those stay [`StoreError::Api`].
fn classify(status: StatusCode, body: &ErrorBody, surface: Surface) -> StoreError {
    let message = body.message();

    if status.is_server_error() {
        return StoreError::Unavailable(message);
    }

    if body.code().as_deref() == Some(UNIQUE_VIOLATION) {
        return StoreError::Conflict(message);
    }

    let rejected = match surface {
        // Invalid grants, expired codes and unknown flow states all come
        // back as 4xx from the auth API.
        Surface::Auth => matches!(status.as_u16(), 400..=404 | 422),
        Surface::Data => matches!(status.as_u16(), 401 | 403),
    };

    if rejected {
        StoreError::Unauthorized(message)
    } else {
        StoreError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl SessionStore for SupabaseStore {
    async fn health_check(&self) -> StoreResult<()> {
        let response = self
            .request(Method::GET, self.auth_url("health"), None)
            .send()
            .await?;
        Self::check(response, Surface::Auth).await?;
        Ok(())
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> String {
        let params = [
            ("provider", provider),
            ("redirect_to", redirect_to),
            ("code_challenge", code_challenge),
            ("code_challenge_method", PKCE_METHOD),
        ];

        match reqwest::Url::parse_with_params(&self.auth_url("authorize"), &params) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::error!("Failed to build authorize URL: {}", e);
                self.auth_url("authorize")
            }
        }
    }

    async fn send_magic_link(
        &self,
        email: &str,
        redirect_to: &str,
        code_challenge: &str,
        create_user: bool,
    ) -> StoreResult<()> {
        let response = self
            .request(Method::POST, self.auth_url("otp"), None)
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({
                "email": email,
                "create_user": create_user,
                "code_challenge": code_challenge,
                "code_challenge_method": PKCE_METHOD,
            }))
            .send()
            .await?;

        Self::check(response, Surface::Auth).await?;
        Ok(())
    }

    async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> StoreResult<Session> {
        self.token_request(
            "pkce",
            json!({ "auth_code": auth_code, "code_verifier": code_verifier }),
        )
        .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> StoreResult<Session> {
        self.token_request("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn sign_out(&self, access_token: &str) -> StoreResult<()> {
        let response = self
            .request(Method::POST, self.auth_url("logout"), Some(access_token))
            .query(&[("scope", "global")])
            .send()
            .await?;

        Self::check(response, Surface::Auth).await?;
        Ok(())
    }

    async fn find_user(&self, access_token: &str, user_id: &str) -> StoreResult<Option<User>> {
        let response = self
            .request(Method::GET, self.rest_url("users"), Some(access_token))
            .query(&[
                ("select", "id,email,created_at".to_string()),
                ("id", format!("eq.{}", user_id)),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<User> = Self::json(response, Surface::Data).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_user(&self, access_token: &str, user: &User) -> StoreResult<()> {
        let response = self
            .request(Method::POST, self.rest_url("users"), Some(access_token))
            .header("Prefer", "return=minimal")
            .json(&[user])
            .send()
            .await?;

        Self::check(response, Surface::Data).await?;
        Ok(())
    }

    async fn upsert_property(&self, access_token: &str, url: &str) -> StoreResult<Property> {
        // Existing rows are skipped by the unique constraint and not returned.
        let response = self
            .request(Method::POST, self.rest_url("properties"), Some(access_token))
            .query(&[("on_conflict", "url")])
            .header("Prefer", "resolution=ignore-duplicates,return=representation")
            .json(&[json!({ "url": url })])
            .send()
            .await?;

        let inserted: Vec<Property> = Self::json(response, Surface::Data).await?;
        if let Some(property) = inserted.into_iter().next() {
            tracing::info!("Created property {}", property.id);
            return Ok(property);
        }

        self.find_property_by_url(access_token, url)
            .await?
            .ok_or_else(|| StoreError::Decode("property missing after upsert".to_string()))
    }

    async fn find_subscription(
        &self,
        access_token: &str,
        user_id: &str,
        property_id: Uuid,
    ) -> StoreResult<Option<Subscription>> {
        let response = self
            .request(Method::GET, self.rest_url("subscriptions"), Some(access_token))
            .query(&[
                ("select", "id,user_id,property_id,created_at".to_string()),
                ("user_id", format!("eq.{}", user_id)),
                ("property_id", format!("eq.{}", property_id)),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<Subscription> = Self::json(response, Surface::Data).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_subscription(
        &self,
        access_token: &str,
        user_id: &str,
        property_id: Uuid,
    ) -> StoreResult<Subscription> {
        let response = self
            .request(Method::POST, self.rest_url("subscriptions"), Some(access_token))
            .header("Prefer", "return=representation")
            .json(&[json!({ "user_id": user_id, "property_id": property_id })])
            .send()
            .await?;

        let rows: Vec<Subscription> = Self::json(response, Surface::Data).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no subscription".to_string()))
    }

    async fn list_tracked(
        &self,
        access_token: &str,
        user_id: &str,
    ) -> StoreResult<Vec<TrackedProperty>> {
        let response = self
            .request(Method::GET, self.rest_url("subscriptions"), Some(access_token))
            .query(&[
                (
                    "select",
                    "id,created_at,properties(id,url,current_status,last_checked_at)".to_string(),
                ),
                ("user_id", format!("eq.{}", user_id)),
                ("order", "created_at.desc".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<SubscriptionRow> = Self::json(response, Surface::Data).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                row.properties.map(|property| TrackedProperty {
                    subscription_id: row.id,
                    property,
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
        let response = self
            .request(Method::DELETE, self.rest_url("subscriptions"), Some(access_token))
            .query(&[
                ("id", format!("eq.{}", subscription_id)),
                ("user_id", format!("eq.{}", user_id)),
            ])
            .header("Prefer", "return=representation")
            .send()
            .await?;

        let removed: Vec<Subscription> = Self::json(response, Surface::Data).await?;
        Ok(!removed.is_empty())
    }
}
