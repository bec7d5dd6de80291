//! API error types and response mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pledgetrack_billing::BillingError;
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Access gate: neither trial nor subscription coverage is active.
    #[error("active subscription or trial required")]
    RenewalRequired { renew_path: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Billing(BillingError::Database(msg)) => {
                tracing::error!(error = %msg, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
            ApiError::Billing(BillingError::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, json!({ "error": msg }))
            }
            ApiError::Billing(BillingError::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            ApiError::Billing(BillingError::AlreadyProcessed { .. }) => (
                StatusCode::CONFLICT,
                json!({ "error": "This request has already been processed." }),
            ),
            ApiError::Billing(BillingError::OrganizationInactive) => (
                StatusCode::FORBIDDEN,
                json!({ "error": "organization is inactive" }),
            ),
            ApiError::Billing(BillingError::VerificationFailed(msg)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": msg }),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::RenewalRequired { renew_path } => (
                StatusCode::PAYMENT_REQUIRED,
                json!({
                    "error": "active subscription or trial required",
                    "renew": renew_path,
                }),
            ),
        };

        (status, Json(body)).into_response()
    }
}
