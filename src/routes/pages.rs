use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use crate::constants::{ERR_LOAD_FAILED, SIGN_IN_PATH};
use crate::error::AppError;
use crate::session::CurrentSession;
use crate::store::StoreError;
use crate::tracking;
use crate::views::{self, DashboardNotice};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DashboardParams {
    pub error: Option<String>,
    pub added: Option<String>,
    pub removed: Option<String>,
    pub confirm: Option<String>,
}

/// Landing page
pub async fn landing(CurrentSession(session): CurrentSession) -> Html<String> {
    views::landing_page(session.as_ref())
}

/// Dashboard: add form plus the tracked list
///
/// GET /dashboard. Anonymous visitors are sent to the sign-in page.
pub async fn dashboard(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Query(params): Query<DashboardParams>,
) -> Response {
    let Some(session) = session else {
        return Redirect::to(SIGN_IN_PATH).into_response();
    };

    let (tracked, load_error) = match tracking::list_tracked(state.store.as_ref(), &session).await
    {
        Ok(tracked) => (tracked, None),
        Err(AppError::Store(StoreError::Unauthorized(reason))) => {
            tracing::info!("Store rejected session on dashboard: {}", reason);
            return Redirect::to(SIGN_IN_PATH).into_response();
        }
        Err(e) => {
            tracing::error!("Failed to load tracked properties: {}", e);
            (Vec::new(), Some(ERR_LOAD_FAILED))
        }
    };

    views::dashboard_page(
        &session,
        &tracked,
        DashboardNotice {
            error: params.error.as_deref().or(load_error),
            added: params.added.is_some(),
            removed: params.removed.is_some(),
            confirm: params.confirm.as_deref(),
        },
    )
    .into_response()
}
