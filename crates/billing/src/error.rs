//! Billing error types

use thiserror::Error;
use uuid::Uuid;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("database error: {0}")]
    Database(String),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Approving a request whose status is no longer pending. Reported to
    /// the caller as "already processed", never fatal.
    #[error("payment request {id} already processed")]
    AlreadyProcessed { id: Uuid },

    #[error("organization is inactive")]
    OrganizationInactive,

    /// Post-save verification mismatch. Carried in bulk summaries as a
    /// warning; the approval itself is never rolled back.
    #[error("save verification failed: {0}")]
    VerificationFailed(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Database(e.to_string())
    }
}
