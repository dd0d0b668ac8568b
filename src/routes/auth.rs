use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::json;

use super::redirect_with_error;
use crate::constants::{
    DASHBOARD_PATH, ERR_INVALID_EMAIL, ERR_SIGN_IN_FAILED, HOME_PATH, SIGNOUT_HEADER, SIGN_IN_PATH,
};
use crate::models::User;
use crate::session::cookies::with_cookies;
use crate::session::{pkce, CookieJar, CurrentSession};
use crate::store::StoreError;
use crate::tracking::ensure_user_record;
use crate::views::{self, SignInNotice};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SignInParams {
    pub error: Option<String>,
    pub sent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MagicLinkForm {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Message for a failed auth round trip; store detail only when it is a
/// rejection the user can act on
fn sign_in_error(err: &StoreError) -> String {
    match err {
        StoreError::Unauthorized(msg) | StoreError::Api { message: msg, .. } => msg.clone(),
        _ => ERR_SIGN_IN_FAILED.to_string(),
    }
}

/// Sign-in page
///
/// GET /sign-in. Signed-in visitors go straight to the dashboard.
pub async fn sign_in_page(
    CurrentSession(session): CurrentSession,
    Query(params): Query<SignInParams>,
) -> Response {
    if session.is_some() {
        return Redirect::to(DASHBOARD_PATH).into_response();
    }

    views::sign_in_page(SignInNotice {
        error: params.error.as_deref(),
        link_sent: params.sent.is_some(),
    })
    .into_response()
}

/// Start the OAuth flow
///
/// POST /auth/oauth. Stores a PKCE verifier cookie and redirects to the
/// provider through the session store.
pub async fn oauth_sign_in(State(state): State<AppState>) -> Response {
    let verifier = pkce::generate_verifier();
    let authorize_url = state.store.authorize_url(
        &state.config.oauth_provider,
        &state.config.callback_url(),
        &pkce::challenge(&verifier),
    );

    tracing::info!("Starting {} sign-in", state.config.oauth_provider);

    with_cookies(
        Redirect::to(&authorize_url),
        &[state.bridge.verifier_cookie(&verifier)],
    )
}

/// Request a one-time sign-in link
///
/// POST /auth/magic-link. First-time addresses get an account created by
/// the store.
pub async fn magic_link_sign_in(
    State(state): State<AppState>,
    Form(form): Form<MagicLinkForm>,
) -> Response {
    let email = form.email.trim();
    if !User::validate_email(email) {
        return redirect_with_error(SIGN_IN_PATH, ERR_INVALID_EMAIL);
    }

    let verifier = pkce::generate_verifier();
    let sent = state
        .store
        .send_magic_link(
            email,
            &state.config.callback_url(),
            &pkce::challenge(&verifier),
            true,
        )
        .await;

    match sent {
        Ok(()) => {
            tracing::info!("Magic link requested");
            with_cookies(
                Redirect::to(&format!("{}?sent=1", SIGN_IN_PATH)),
                &[state.bridge.verifier_cookie(&verifier)],
            )
        }
        Err(e) => {
            tracing::warn!("Magic link request failed: {}", e);
            redirect_with_error(SIGN_IN_PATH, &sign_in_error(&e))
        }
    }
}

/// OAuth / one-time-link callback
///
/// GET /auth/callback?code=... Exchanges the code for a session, writes the
/// session cookies and mirrors the user record. Any failure returns to the
/// sign-in page without a session.
pub async fn auth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let jar = CookieJar::from_headers(&headers);
    let clear_verifier = state.bridge.clear_verifier_cookie();

    if let Some(error) = params.error {
        let message = params.error_description.unwrap_or(error);
        tracing::warn!("Provider returned an error: {}", message);
        return with_cookies(redirect_with_error(SIGN_IN_PATH, &message), &[clear_verifier]);
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        tracing::warn!("Callback without authorization code");
        return with_cookies(
            redirect_with_error(SIGN_IN_PATH, ERR_SIGN_IN_FAILED),
            &[clear_verifier],
        );
    };

    let Some(verifier) = jar.get(&state.bridge.verifier_cookie_name()) else {
        tracing::warn!("Callback without PKCE verifier cookie");
        return redirect_with_error(SIGN_IN_PATH, ERR_SIGN_IN_FAILED);
    };

    match state.store.exchange_code(&code, verifier).await {
        Ok(session) => {
            if let Err(e) = ensure_user_record(state.store.as_ref(), &session).await {
                // Retried on the next add-property
                tracing::warn!("Could not mirror user {}: {}", session.user_id(), e);
            }

            let mut cookies = state.bridge.session_cookies(&jar, &session);
            cookies.push(clear_verifier);

            tracing::info!("User {} signed in", session.user_id());
            with_cookies(Redirect::to(DASHBOARD_PATH), &cookies)
        }
        Err(e) => {
            tracing::warn!("Code exchange failed: {}", e);
            with_cookies(
                redirect_with_error(SIGN_IN_PATH, &sign_in_error(&e)),
                &[clear_verifier],
            )
        }
    }
}

/// Sign-out endpoint
///
/// POST /api/auth/signout. Always succeeds; repeated calls are harmless.
pub async fn sign_out_api(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentSession(session): CurrentSession,
) -> Response {
    let jar = CookieJar::from_headers(&headers);
    let cleared = state.bridge.sign_out(&jar, session.as_ref()).await;

    let mut response = with_cookies(
        Json(json!({ "success": true, "message": "Signed out successfully" })),
        &cleared,
    );
    response
        .headers_mut()
        .insert(SIGNOUT_HEADER, HeaderValue::from_static("true"));
    response
}

/// Sign-out button in the header
///
/// POST /sign-out, then back to the landing page.
pub async fn sign_out_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentSession(session): CurrentSession,
) -> Response {
    let jar = CookieJar::from_headers(&headers);
    let cleared = state.bridge.sign_out(&jar, session.as_ref()).await;

    with_cookies(Redirect::to(HOME_PATH), &cleared)
}
