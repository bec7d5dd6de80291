//! Reconciliation hook for approved requests
//!
//! Safety net for the case where a request ended up `approved` but the
//! organization update failed independently. The `applied_at` marker on
//! the request is the guard: once the primary approval path has applied
//! the transition, this hook only confirms the organization is in shape
//! and never recomputes the extension, so a second invocation cannot
//! double-extend the subscription.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::lifecycle::CoverageSnapshot;
use crate::requests::PaymentRequest;

/// What the hook did for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReconcileOutcome {
    /// The request is not approved; nothing to reconcile.
    NotApproved,
    /// The transition was already applied and the organization state
    /// matches the expectation.
    AlreadyConsistent,
    /// The transition had not landed; it was applied now.
    Repaired,
}

#[derive(Debug, sqlx::FromRow)]
struct OrgStateRow {
    subscription_status: String,
    trial_started_at: Option<OffsetDateTime>,
    subscription_expires_at: Option<OffsetDateTime>,
}

impl OrgStateRow {
    fn coverage(&self) -> CoverageSnapshot {
        CoverageSnapshot {
            status: pledgetrack_shared::SubscriptionStatus::from_db(&self.subscription_status),
            trial_started_at: self.trial_started_at,
            subscription_expires_at: self.subscription_expires_at,
        }
    }
}

/// Applies missed lifecycle transitions for approved requests.
pub struct ReconcileService {
    pool: PgPool,
    event_logger: BillingEventLogger,
}

impl ReconcileService {
    pub fn new(pool: PgPool) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self { pool, event_logger }
    }

    /// Ensure the organization mutation for an approved request has been
    /// applied. Idempotent: safe to run any number of times.
    pub async fn ensure_applied(&self, request_id: Uuid) -> BillingResult<ReconcileOutcome> {
        let now = OffsetDateTime::now_utc();

        let mut tx = self.pool.begin().await?;

        // Same lock order as the approval path: request first, then org.
        let request: Option<PaymentRequest> =
            sqlx::query_as("SELECT * FROM payment_requests WHERE id = $1 FOR UPDATE")
                .bind(request_id)
                .fetch_optional(&mut *tx)
                .await?;

        let request = request.ok_or_else(|| {
            BillingError::NotFound(format!("Payment request {} not found", request_id))
        })?;

        if request.status != "approved" {
            return Ok(ReconcileOutcome::NotApproved);
        }

        let org: Option<OrgStateRow> = sqlx::query_as(
            r#"
            SELECT subscription_status, trial_started_at, subscription_expires_at
            FROM organizations WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(request.org_id)
        .fetch_optional(&mut *tx)
        .await?;

        let org = org.ok_or_else(|| {
            BillingError::NotFound(format!("Organization {} not found", request.org_id))
        })?;

        let snapshot = org.coverage();

        if request.applied_at.is_some() {
            // Applied already: the expectation is shape, not a recomputed
            // date. Recomputing here would stack the extension twice.
            let consistent = if request.months > 0 {
                org.subscription_status == "SUBSCRIBED" && org.subscription_expires_at.is_some()
            } else if request.is_trial {
                org.trial_started_at.is_some()
            } else {
                true
            };

            if consistent {
                return Ok(ReconcileOutcome::AlreadyConsistent);
            }

            tracing::warn!(
                request_id = %request_id,
                org_id = %request.org_id,
                status = %org.subscription_status,
                "Approved request marked applied but organization state is inconsistent"
            );
        }

        // The transition never landed (or landed and was lost): run the
        // same arithmetic the approval path runs, from current state.
        let next = if request.months > 0 {
            Some(snapshot.extend_paid(request.months, now))
        } else if request.is_trial {
            snapshot.activate_trial(now)
        } else {
            None
        };

        if let Some(next) = next {
            if next != snapshot {
                sqlx::query(
                    r#"
                    UPDATE organizations SET
                        subscription_status = $1,
                        trial_started_at = $2,
                        subscription_expires_at = $3,
                        updated_at = NOW()
                    WHERE id = $4
                    "#,
                )
                .bind(next.status.as_str())
                .bind(next.trial_started_at)
                .bind(next.subscription_expires_at)
                .bind(request.org_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        sqlx::query("UPDATE payment_requests SET applied_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(request_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            request_id = %request_id,
            org_id = %request.org_id,
            "Reconciled approved request onto organization"
        );

        self.event_logger
            .log_best_effort(
                BillingEventBuilder::new(request.org_id, BillingEventType::StateReconciled).data(
                    serde_json::json!({
                        "request_id": request_id,
                        "months": request.months,
                        "is_trial": request.is_trial,
                    }),
                ),
            )
            .await;

        Ok(ReconcileOutcome::Repaired)
    }

    /// Sweep every approved request whose transition was never marked
    /// applied. Returns how many were repaired.
    pub async fn reconcile_unapplied(&self) -> BillingResult<u64> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM payment_requests WHERE status = 'approved' AND applied_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut repaired = 0;
        for (request_id,) in ids {
            match self.ensure_applied(request_id).await {
                Ok(ReconcileOutcome::Repaired) => repaired += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        request_id = %request_id,
                        error = %e,
                        "Failed to reconcile approved request"
                    );
                }
            }
        }

        Ok(repaired)
    }
}
