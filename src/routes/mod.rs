pub mod auth;
pub mod health;
pub mod pages;
pub mod properties;

use axum::{
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Router,
};

use crate::session::session_middleware;
use crate::AppState;

pub use auth::{auth_callback, magic_link_sign_in, oauth_sign_in, sign_in_page, sign_out_api, sign_out_form};
pub use health::health_check;
pub use pages::{dashboard, landing};
pub use properties::{
    add_property_api, add_property_form, list_properties_api, unsubscribe_api, unsubscribe_form,
};

/// Build the application router
///
/// The session middleware wraps every route and the fallback, so each
/// request sees the same resolved session.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/health", get(health_check))
        .route("/sign-in", get(sign_in_page))
        .route("/sign-out", post(sign_out_form))
        .route("/auth/oauth", post(oauth_sign_in))
        .route("/auth/magic-link", post(magic_link_sign_in))
        .route("/auth/callback", get(auth_callback))
        .route("/api/auth/signout", post(sign_out_api))
        .route("/dashboard", get(dashboard))
        .route("/dashboard/properties", post(add_property_form))
        .route(
            "/dashboard/subscriptions/:id/unsubscribe",
            post(unsubscribe_form),
        )
        .route(
            "/api/properties",
            get(list_properties_api).post(add_property_api),
        )
        .route("/api/subscriptions/:id", delete(unsubscribe_api))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ))
        .with_state(state)
}

async fn not_found() -> (StatusCode, Html<&'static str>) {
    (StatusCode::NOT_FOUND, Html("<h1>Not found</h1>"))
}

/// Redirect to `path` with a user-visible `error` notice
pub(crate) fn redirect_with_error(path: &str, message: &str) -> Response {
    Redirect::to(&format!("{}?error={}", path, urlencoding::encode(message))).into_response()
}
