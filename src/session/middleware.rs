use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, Uri},
    middleware::Next,
    response::{Redirect, Response},
};

use super::cookies::{self, CookieJar, SetCookie};
use crate::constants::{HOME_PATH, SIGNOUT_HEADER, SIGNOUT_PATH_FRAGMENT, SIGNOUT_QUERY_PARAM};
use crate::error::AppError;
use crate::models::Session;
use crate::AppState;

/// Session resolved for the current request (`None` when anonymous)
#[derive(Debug, Clone, Default)]
pub struct CurrentSession(pub Option<Session>);

/// Extractor for handlers that need a signed-in user; rejects with 401
#[derive(Debug, Clone)]
pub struct RequireSession(pub Session);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequireSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .and_then(|current| current.0.clone())
            .map(RequireSession)
            .ok_or(AppError::Unauthorized)
    }
}

/// Whether the request carries one of the sign-out flags
pub fn is_sign_out_request(uri: &Uri, headers: &HeaderMap) -> bool {
    let path_flag = uri.path().contains(SIGNOUT_PATH_FRAGMENT);

    let query_flag = uri.query().is_some_and(|query| {
        query
            .split('&')
            .any(|pair| pair.split('=').next() == Some(SIGNOUT_QUERY_PARAM))
    });

    let header_flag = headers
        .get(SIGNOUT_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("true"));

    path_flag || query_flag || header_flag
}

/// Resolve the session ahead of every handler and write back cookie changes
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(request.headers());

    if is_sign_out_request(request.uri(), request.headers()) {
        let cleared = state.bridge.clear_session(&jar);
        tracing::info!("Sign-out flag on {}, clearing auth cookies", request.uri().path());
        return cookies::with_cookies(Redirect::to(HOME_PATH), &cleared);
    }

    let resolved = state.bridge.get_session(&jar).await;
    request
        .extensions_mut()
        .insert(CurrentSession(resolved.session));

    let mut response = next.run(request).await;

    // Cookies the handler wrote itself (sign-in, sign-out) take precedence.
    // Expiring the session cookie also voids a pending refresh, chunks included.
    let signed_out = cookies::removed_cookie_names(response.headers())
        .contains(state.bridge.cookie_name());
    let handled = cookies::set_cookie_names(response.headers());
    let pending: Vec<SetCookie> = if signed_out {
        Vec::new()
    } else {
        resolved
            .cookies
            .into_iter()
            .filter(|cookie| !handled.contains(&cookie.name))
            .collect()
    };
    cookies::apply(response.headers_mut(), &pending);

    response
}
