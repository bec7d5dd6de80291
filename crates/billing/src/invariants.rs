//! Billing invariants
//!
//! Runnable consistency checks over the subscription and ledger tables.
//! Checks only read, never write: the subscribed-without-expiry case in
//! particular is deliberately detected and reported rather than repaired.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// A single invariant violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Organization(s) affected
    pub org_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct OrgRow {
    org_id: Uuid,
    org_name: String,
}

#[derive(Debug, sqlx::FromRow)]
struct RequestShapeRow {
    request_id: Uuid,
    org_id: Uuid,
    months: i32,
    is_trial: bool,
    amount_tzs_cents: i64,
}

/// Service for running billing invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_subscribed_has_expiry().await?);
        violations.extend(self.check_trial_status_has_start().await?);
        violations.extend(self.check_request_shape().await?);
        violations.extend(self.check_expired_status_stale().await?);

        let checks_run = 4;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: SUBSCRIBED organizations have an expiry date.
    ///
    /// A SUBSCRIBED row with a NULL expiry cannot be swept and will keep
    /// coverage forever. Detector only: the fix is a manual decision.
    async fn check_subscribed_has_expiry(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<OrgRow> = sqlx::query_as(
            r#"
            SELECT id AS org_id, name AS org_name
            FROM organizations
            WHERE subscription_status = 'SUBSCRIBED'
              AND subscription_expires_at IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "subscribed_has_expiry".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "Organization '{}' is SUBSCRIBED with no expiration date set",
                    row.org_name
                ),
                context: serde_json::json!({ "org_name": row.org_name }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 2: FREE_TRIAL organizations have a trial start date.
    async fn check_trial_status_has_start(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<OrgRow> = sqlx::query_as(
            r#"
            SELECT id AS org_id, name AS org_name
            FROM organizations
            WHERE subscription_status = 'FREE_TRIAL'
              AND trial_started_at IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "trial_status_has_start".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "Organization '{}' is FREE_TRIAL with no trial start date",
                    row.org_name
                ),
                context: serde_json::json!({ "org_name": row.org_name }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 3: request shape is exactly one of trial / paid.
    ///
    /// `is_trial` with months > 0, a paid row with months < 1, or a trial
    /// row carrying a nonzero amount all indicate a corrupted ledger.
    async fn check_request_shape(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<RequestShapeRow> = sqlx::query_as(
            r#"
            SELECT id AS request_id, org_id, months, is_trial, amount_tzs_cents
            FROM payment_requests
            WHERE NOT ((is_trial AND months = 0) OR (NOT is_trial AND months >= 1))
               OR (is_trial AND amount_tzs_cents <> 0)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "request_shape".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "Payment request {} has inconsistent shape (is_trial={}, months={}, amount={})",
                    row.request_id, row.is_trial, row.months, row.amount_tzs_cents
                ),
                context: serde_json::json!({
                    "request_id": row.request_id,
                    "months": row.months,
                    "is_trial": row.is_trial,
                    "amount_tzs_cents": row.amount_tzs_cents,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 4: status not yet swept despite lapsed windows.
    ///
    /// Expected to be transient: the sweep is opportunistic, so an idle
    /// tenant can sit here until its next request.
    async fn check_expired_status_stale(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<OrgRow> = sqlx::query_as(
            r#"
            SELECT id AS org_id, name AS org_name
            FROM organizations
            WHERE (subscription_status = 'FREE_TRIAL'
                   AND trial_started_at IS NOT NULL
                   AND trial_started_at + INTERVAL '7 days' <= NOW())
               OR (subscription_status = 'SUBSCRIBED'
                   AND subscription_expires_at IS NOT NULL
                   AND subscription_expires_at <= NOW())
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "expired_status_stale".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "Organization '{}' claims coverage but its window has lapsed",
                    row.org_name
                ),
                context: serde_json::json!({ "org_name": row.org_name }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> BillingResult<Vec<InvariantViolation>> {
        match name {
            "subscribed_has_expiry" => self.check_subscribed_has_expiry().await,
            "trial_status_has_start" => self.check_trial_status_has_start().await,
            "request_shape" => self.check_request_shape().await,
            "expired_status_stale" => self.check_expired_status_stale().await,
            _ => Ok(vec![]),
        }
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "subscribed_has_expiry",
            "trial_status_has_start",
            "request_shape",
            "expired_status_stale",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_severity_display() {
        assert_eq!(ViolationSeverity::Critical.to_string(), "CRITICAL");
        assert_eq!(ViolationSeverity::High.to_string(), "HIGH");
        assert_eq!(ViolationSeverity::Medium.to_string(), "MEDIUM");
        assert_eq!(ViolationSeverity::Low.to_string(), "LOW");
    }

    #[test]
    fn test_available_checks() {
        let checks = InvariantChecker::available_checks();
        assert_eq!(checks.len(), 4);
        assert!(checks.contains(&"subscribed_has_expiry"));
        assert!(checks.contains(&"request_shape"));
    }
}
