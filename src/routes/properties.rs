use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::redirect_with_error;
use crate::constants::{DASHBOARD_PATH, ERR_SIGN_IN_REQUIRED, SIGN_IN_PATH};
use crate::error::Result;
use crate::models::TrackedProperty;
use crate::session::{CurrentSession, RequireSession};
use crate::tracking;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AddPropertyRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeForm {
    pub confirm: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrackedPropertyResponse {
    #[serde(rename = "subscriptionId")]
    pub subscription_id: Uuid,
    #[serde(rename = "propertyId")]
    pub property_id: Uuid,
    pub url: String,
    pub status: String,
    #[serde(rename = "lastCheckedAt")]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl From<TrackedProperty> for TrackedPropertyResponse {
    fn from(tracked: TrackedProperty) -> Self {
        Self {
            subscription_id: tracked.subscription_id,
            property_id: tracked.property.id,
            status: tracked.property.status_or_unknown().to_string(),
            url: tracked.property.url,
            last_checked_at: tracked.property.last_checked_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeResponse {
    pub success: bool,
}

/// Track a listing
///
/// POST /api/properties `{"url": "..."}`
///
/// Returns 201 with the tracked entry, 400 for a URL that is not a listing,
/// 409 when the user already tracks it.
pub async fn add_property_api(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    Json(payload): Json<AddPropertyRequest>,
) -> Response {
    match tracking::add_property(state.store.as_ref(), &session, &payload.url).await {
        Ok(tracked) => {
            (StatusCode::CREATED, Json(TrackedPropertyResponse::from(tracked))).into_response()
        }
        Err(e) => {
            let message = e.add_property_message();
            e.into_response_with(message)
        }
    }
}

/// GET /api/properties
pub async fn list_properties_api(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
) -> Result<Json<Vec<TrackedPropertyResponse>>> {
    let tracked = tracking::list_tracked(state.store.as_ref(), &session).await?;
    Ok(Json(tracked.into_iter().map(Into::into).collect()))
}

/// DELETE /api/subscriptions/:id
pub async fn unsubscribe_api(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<UnsubscribeResponse>> {
    tracking::unsubscribe(state.store.as_ref(), &session, subscription_id).await?;
    Ok(Json(UnsubscribeResponse { success: true }))
}

/// Add-property form on the dashboard
///
/// POST /dashboard/properties, back to the dashboard with a notice.
pub async fn add_property_form(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Form(form): Form<AddPropertyRequest>,
) -> Response {
    let Some(session) = session else {
        return redirect_with_error(SIGN_IN_PATH, ERR_SIGN_IN_REQUIRED);
    };

    match tracking::add_property(state.store.as_ref(), &session, &form.url).await {
        Ok(_) => Redirect::to(&format!("{}?added=1", DASHBOARD_PATH)).into_response(),
        Err(e) => {
            tracing::info!("Add property rejected: {}", e);
            redirect_with_error(DASHBOARD_PATH, &e.add_property_message())
        }
    }
}

/// Unsubscribe control on the dashboard
///
/// POST /dashboard/subscriptions/:id/unsubscribe. Without `confirm=yes`
/// the dashboard is shown again asking for confirmation; nothing is deleted.
pub async fn unsubscribe_form(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(subscription_id): Path<Uuid>,
    Form(form): Form<UnsubscribeForm>,
) -> Response {
    let Some(session) = session else {
        return Redirect::to(SIGN_IN_PATH).into_response();
    };

    if form.confirm.as_deref() != Some("yes") {
        return Redirect::to(&format!("{}?confirm={}", DASHBOARD_PATH, subscription_id))
            .into_response();
    }

    match tracking::unsubscribe(state.store.as_ref(), &session, subscription_id).await {
        Ok(()) => Redirect::to(&format!("{}?removed=1", DASHBOARD_PATH)).into_response(),
        Err(e) => redirect_with_error(DASHBOARD_PATH, &e.user_message()),
    }
}
