use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::constants::{
    ERR_ADD_PROPERTY_FAILED, ERR_ALREADY_TRACKING, ERR_INVALID_LISTING_URL, ERR_REQUEST_FAILED,
    ERR_SESSION_REQUIRED, ERR_SIGN_IN_REQUIRED,
};
use crate::store::StoreError;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("{}", ERR_INVALID_LISTING_URL)]
    InvalidListingUrl,

    #[error("{}", ERR_ALREADY_TRACKING)]
    AlreadyTracking,

    #[error("{}", ERR_SESSION_REQUIRED)]
    Unauthorized,

    #[error("Subscription not found")]
    SubscriptionNotFound,
}

impl AppError {
    /// Message safe to show the user
    pub fn user_message(&self) -> String {
        match self {
            AppError::Store(StoreError::Unauthorized(_)) | AppError::Unauthorized => {
                ERR_SESSION_REQUIRED.to_string()
            }
            AppError::Store(StoreError::Conflict(_)) | AppError::AlreadyTracking => {
                ERR_ALREADY_TRACKING.to_string()
            }
            AppError::Store(_) => ERR_REQUEST_FAILED.to_string(),
            other => other.to_string(),
        }
    }

    /// Message for a failed add-property attempt
    pub fn add_property_message(&self) -> String {
        match self {
            AppError::Store(StoreError::Unauthorized(_)) | AppError::Unauthorized => {
                ERR_SIGN_IN_REQUIRED.to_string()
            }
            AppError::Store(StoreError::Conflict(_)) => ERR_ALREADY_TRACKING.to_string(),
            AppError::Store(_) => ERR_ADD_PROPERTY_FAILED.to_string(),
            other => other.user_message(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Store(e) => match e {
                StoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                StoreError::Conflict(_) => StatusCode::CONFLICT,
                StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                StoreError::Api { .. } | StoreError::Decode(_) => StatusCode::BAD_GATEWAY,
            },
            AppError::InvalidListingUrl => StatusCode::BAD_REQUEST,
            AppError::AlreadyTracking => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::SubscriptionNotFound => StatusCode::NOT_FOUND,
        }
    }

    /// JSON error response carrying `message`
    pub fn into_response_with(self, message: String) -> Response {
        if let AppError::Store(ref e) = self {
            tracing::error!("Session store error: {:?}", e);
        }

        let body = Json(json!({
            "error": message
        }));

        (self.status_code(), body).into_response()
    }
}

/// Implement IntoResponse to convert AppError into HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.user_message();
        self.into_response_with(message)
    }
}

/// Result type alias for application results
pub type Result<T> = std::result::Result<T, AppError>;
