//! Payment request ledger
//!
//! Append-mostly billing intents. A row is created by a tenant user and
//! resolved exactly once by an administrator; the category and discount
//! are snapshotted at submission time so later policy changes never
//! retroactively alter past requests.

use pledgetrack_shared::RequestStatus;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::org::Organization;
use crate::settings::BillingSettings;

/// A payment request row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentRequest {
    pub id: Uuid,
    pub org_id: Uuid,
    pub submitted_by: Uuid,
    pub months: i32,
    pub is_trial: bool,
    pub amount_tzs_cents: i64,
    pub amount_sent_tzs_cents: Option<i64>,
    pub discount_percent: i32,
    pub category_snapshot: String,
    pub payment_method: Option<String>,
    pub reference_note: Option<String>,
    pub staff_comment: Option<String>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub applied_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl PaymentRequest {
    pub fn status(&self) -> RequestStatus {
        RequestStatus::from_db(&self.status)
    }
}

/// Tenant-supplied fields of a paid submission.
#[derive(Debug, Clone, Deserialize)]
pub struct PaidSubmission {
    pub months: i32,
    pub payment_method: Option<String>,
    pub reference_note: Option<String>,
    pub amount_sent_tzs_cents: Option<i64>,
}

/// Per-status request counts for the admin portal.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RequestStatusCounts {
    pub pending: i64,
    pub approved: i64,
    pub declined: i64,
}

/// Service for creating and reading payment requests.
pub struct LedgerService {
    pool: PgPool,
    settings: BillingSettings,
}

impl LedgerService {
    pub fn new(pool: PgPool, settings: BillingSettings) -> Self {
        Self { pool, settings }
    }

    pub fn settings(&self) -> &BillingSettings {
        &self.settings
    }

    /// Submit a free-trial request: months = 0, amount = 0.
    pub async fn submit_trial(
        &self,
        org: &Organization,
        submitted_by: Uuid,
    ) -> BillingResult<PaymentRequest> {
        if !org.is_active {
            return Err(BillingError::OrganizationInactive);
        }

        let request: PaymentRequest = sqlx::query_as(
            r#"
            INSERT INTO payment_requests
                (org_id, submitted_by, months, is_trial, amount_tzs_cents,
                 discount_percent, category_snapshot, status)
            VALUES ($1, $2, 0, TRUE, 0, 0, $3, 'pending')
            RETURNING *
            "#,
        )
        .bind(org.id)
        .bind(submitted_by)
        .bind(&org.category)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            org_id = %org.id,
            request_id = %request.id,
            "Trial request submitted"
        );

        Ok(request)
    }

    /// Submit a paid request, pricing it from the current settings and
    /// snapshotting category and discount onto the row.
    pub async fn submit_paid(
        &self,
        org: &Organization,
        submitted_by: Uuid,
        submission: PaidSubmission,
    ) -> BillingResult<PaymentRequest> {
        if !org.is_active {
            return Err(BillingError::OrganizationInactive);
        }
        if submission.months < 1 {
            return Err(BillingError::InvalidInput(
                "a paid request must cover at least one month".to_string(),
            ));
        }

        let quote = self.settings.quote(org.category(), submission.months);

        let request: PaymentRequest = sqlx::query_as(
            r#"
            INSERT INTO payment_requests
                (org_id, submitted_by, months, is_trial, amount_tzs_cents,
                 amount_sent_tzs_cents, discount_percent, category_snapshot,
                 payment_method, reference_note, status)
            VALUES ($1, $2, $3, FALSE, $4, $5, $6, $7, $8, $9, 'pending')
            RETURNING *
            "#,
        )
        .bind(org.id)
        .bind(submitted_by)
        .bind(submission.months)
        .bind(quote.total_tzs_cents)
        .bind(submission.amount_sent_tzs_cents)
        .bind(quote.discount_percent)
        .bind(&org.category)
        .bind(&submission.payment_method)
        .bind(&submission.reference_note)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            org_id = %org.id,
            request_id = %request.id,
            months = submission.months,
            amount_tzs_cents = quote.total_tzs_cents,
            "Paid request submitted"
        );

        Ok(request)
    }

    pub async fn get(&self, request_id: Uuid) -> BillingResult<PaymentRequest> {
        sqlx::query_as("SELECT * FROM payment_requests WHERE id = $1")
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                BillingError::NotFound(format!("Payment request {} not found", request_id))
            })
    }

    /// An organization's ledger, newest first.
    pub async fn list_for_org(
        &self,
        org_id: Uuid,
        limit: i64,
    ) -> BillingResult<Vec<PaymentRequest>> {
        let requests = sqlx::query_as(
            "SELECT * FROM payment_requests WHERE org_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(org_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    /// Admin view of the ledger with an optional status filter.
    pub async fn list(
        &self,
        status: Option<RequestStatus>,
        limit: i64,
        offset: i64,
    ) -> BillingResult<Vec<PaymentRequest>> {
        let requests = sqlx::query_as(
            r#"
            SELECT * FROM payment_requests
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    pub async fn counts_by_status(&self) -> BillingResult<RequestStatusCounts> {
        let row: (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending'),
                COUNT(*) FILTER (WHERE status = 'approved'),
                COUNT(*) FILTER (WHERE status = 'declined')
            FROM payment_requests
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(RequestStatusCounts {
            pending: row.0,
            approved: row.1,
            declined: row.2,
        })
    }

    /// Revenue from approved paid requests: all-time and for the calendar
    /// month containing `now`, keyed on resolution time.
    pub async fn approved_revenue_tzs_cents(
        &self,
        now: OffsetDateTime,
    ) -> BillingResult<(i64, i64)> {
        let row: (Option<i64>, Option<i64>) = sqlx::query_as(
            r#"
            SELECT
                SUM(amount_tzs_cents),
                SUM(amount_tzs_cents) FILTER (WHERE updated_at >= date_trunc('month', $1::TIMESTAMPTZ))
            FROM payment_requests
            WHERE status = 'approved' AND NOT is_trial
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.0.unwrap_or(0), row.1.unwrap_or(0)))
    }

    /// Approvals resolved on the calendar day containing `now`.
    pub async fn approved_on_day(&self, now: OffsetDateTime) -> BillingResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM payment_requests
            WHERE status = 'approved'
              AND updated_at >= date_trunc('day', $1::TIMESTAMPTZ)
              AND updated_at < date_trunc('day', $1::TIMESTAMPTZ) + INTERVAL '1 day'
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
