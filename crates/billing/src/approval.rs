//! Approval workflow
//!
//! Resolves pending payment requests. Each approval is one database
//! transaction: the request row and then the organization row are locked
//! FOR UPDATE so two concurrent approvals for the same tenant serialize
//! on the read-compute-write of the expiry date instead of clobbering
//! each other. Bulk approval has partial-failure semantics: one bad
//! request is recorded and the rest keep processing.

use pledgetrack_shared::RequestStatus;
use serde::Serialize;
use sqlx::PgPool;
use time::macros::format_description;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::lifecycle::CoverageSnapshot;
use crate::reconcile::ReconcileService;
use crate::requests::PaymentRequest;

/// Row lock projection of the organization's subscription fields.
#[derive(Debug, sqlx::FromRow)]
struct OrgLockRow {
    name: String,
    subscription_status: String,
    trial_started_at: Option<OffsetDateTime>,
    subscription_expires_at: Option<OffsetDateTime>,
}

impl OrgLockRow {
    fn coverage(&self) -> CoverageSnapshot {
        CoverageSnapshot {
            status: pledgetrack_shared::SubscriptionStatus::from_db(&self.subscription_status),
            trial_started_at: self.trial_started_at,
            subscription_expires_at: self.subscription_expires_at,
        }
    }
}

/// Result of approving a single request.
#[derive(Debug, Clone)]
pub enum ApprovalOutcome {
    Approved {
        org_name: String,
        new_expires_at: Option<OffsetDateTime>,
        /// Set when the post-save verification found the organization in
        /// an unexpected state. Detection only; the approval stands.
        verification_warning: Option<String>,
    },
    /// The request was no longer pending. No mutation occurred.
    AlreadyProcessed { current_status: RequestStatus },
}

/// Per-item failure inside a bulk approval.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalFailure {
    pub request_id: Uuid,
    pub message: String,
}

/// Aggregate result of a bulk approval.
#[derive(Debug, Default, Serialize)]
pub struct ApprovalSummary {
    pub approved: usize,
    pub already_processed: Vec<Uuid>,
    /// "Name (expires: ...)" lines for organizations whose coverage moved.
    pub updated_orgs: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<ApprovalFailure>,
}

impl ApprovalSummary {
    /// Fold one per-request result into the summary.
    pub fn absorb(&mut self, request_id: Uuid, result: BillingResult<ApprovalOutcome>) {
        match result {
            Ok(ApprovalOutcome::Approved {
                org_name,
                new_expires_at,
                verification_warning,
            }) => {
                self.approved += 1;
                if let Some(warning) = verification_warning {
                    self.warnings.push(warning);
                }
                if let Some(expires) = new_expires_at {
                    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]");
                    let stamp = expires
                        .format(&fmt)
                        .unwrap_or_else(|_| expires.to_string());
                    self.updated_orgs.push(format!("{} (expires: {})", org_name, stamp));
                }
            }
            Ok(ApprovalOutcome::AlreadyProcessed { .. }) => {
                self.already_processed.push(request_id);
            }
            Err(e) => self.errors.push(ApprovalFailure {
                request_id,
                message: e.to_string(),
            }),
        }
    }

    /// Human-readable line for the admin portal flash message.
    pub fn message(&self) -> String {
        let mut msg = format!("Approved {} payment request(s).", self.approved);
        if !self.updated_orgs.is_empty() {
            msg.push_str(&format!(" Updated: {}", self.updated_orgs.join(", ")));
        }
        if !self.already_processed.is_empty() {
            msg.push_str(&format!(
                " {} request(s) were already processed.",
                self.already_processed.len()
            ));
        }
        if !self.warnings.is_empty() {
            msg.push_str(&format!(" Warnings: {}", self.warnings.join("; ")));
        }
        if !self.errors.is_empty() {
            let details: Vec<String> = self
                .errors
                .iter()
                .map(|f| format!("{}: {}", f.request_id, f.message))
                .collect();
            msg.push_str(&format!(" Errors: {}", details.join("; ")));
        }
        msg
    }
}

/// Result of a decline action.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeclineOutcome {
    pub declined: u64,
}

/// Administrative approve/decline service.
pub struct ApprovalService {
    pool: PgPool,
    event_logger: BillingEventLogger,
    reconcile: ReconcileService,
}

impl ApprovalService {
    pub fn new(pool: PgPool) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        let reconcile = ReconcileService::new(pool.clone());
        Self {
            pool,
            event_logger,
            reconcile,
        }
    }

    /// Approve one request and apply its lifecycle event to the owning
    /// organization, atomically.
    pub async fn approve(
        &self,
        request_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> BillingResult<ApprovalOutcome> {
        let now = OffsetDateTime::now_utc();

        let mut tx = self.pool.begin().await?;

        // Lock the request first. A concurrent approval of the same
        // request blocks here and then observes a non-pending status.
        let request: Option<PaymentRequest> =
            sqlx::query_as("SELECT * FROM payment_requests WHERE id = $1 FOR UPDATE")
                .bind(request_id)
                .fetch_optional(&mut *tx)
                .await?;

        let request = request.ok_or_else(|| {
            BillingError::NotFound(format!("Payment request {} not found", request_id))
        })?;

        if !request.status().is_pending() {
            tracing::info!(
                request_id = %request_id,
                status = %request.status,
                "Skipping approval of already-processed request"
            );
            return Ok(ApprovalOutcome::AlreadyProcessed {
                current_status: request.status(),
            });
        }

        // Lock the organization row; the read-compute-write of the expiry
        // date must serialize per tenant.
        let org: Option<OrgLockRow> = sqlx::query_as(
            r#"
            SELECT name, subscription_status, trial_started_at, subscription_expires_at
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
        let (next, event_type) = if request.months > 0 {
            (
                Some(snapshot.extend_paid(request.months, now)),
                Some(BillingEventType::SubscriptionExtended),
            )
        } else if request.is_trial {
            match snapshot.activate_trial(now) {
                Some(next) => (Some(next), Some(BillingEventType::TrialActivated)),
                // Trial still open: approving must not reset the clock
                None => (None, None),
            }
        } else {
            (None, None)
        };

        if let Some(next) = next {
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

        // applied_at marks the organization mutation as done for this
        // request; the reconciliation hook keys off it.
        sqlx::query(
            r#"
            UPDATE payment_requests
            SET status = 'approved', applied_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let new_expires_at = next.and_then(|n| n.subscription_expires_at);

        // Post-save verification: re-read and confirm the paid extension
        // landed. A mismatch is surfaced, not rolled back.
        let verification_warning = if request.months > 0 {
            self.verify_extension(request.org_id, &org.name).await?
        } else {
            None
        };

        tracing::info!(
            request_id = %request_id,
            org_id = %request.org_id,
            months = request.months,
            is_trial = request.is_trial,
            new_expires_at = ?new_expires_at,
            "Payment request approved"
        );

        self.event_logger
            .log_best_effort(
                BillingEventBuilder::new(request.org_id, BillingEventType::RequestApproved)
                    .data(serde_json::json!({
                        "request_id": request_id,
                        "months": request.months,
                        "is_trial": request.is_trial,
                        "amount_tzs_cents": request.amount_tzs_cents,
                    }))
                    .actor_opt(actor_id, ActorType::Admin),
            )
            .await;

        if let Some(event_type) = event_type {
            self.event_logger
                .log_best_effort(
                    BillingEventBuilder::new(request.org_id, event_type)
                        .data(serde_json::json!({
                            "request_id": request_id,
                            "new_expires_at": new_expires_at.map(|t| t.to_string()),
                        }))
                        .actor_opt(actor_id, ActorType::Admin),
                )
                .await;
        }

        // Redundant trigger: the same transition re-checked through the
        // reconciliation hook. A no-op on the normal path.
        if let Err(e) = self.reconcile.ensure_applied(request_id).await {
            tracing::warn!(
                request_id = %request_id,
                error = %e,
                "Post-approval reconciliation check failed"
            );
        }

        Ok(ApprovalOutcome::Approved {
            org_name: org.name,
            new_expires_at,
            verification_warning,
        })
    }

    /// Approve a batch of requests. A failure on one request is captured
    /// in the summary and must not abort the remaining items.
    pub async fn approve_many(
        &self,
        request_ids: &[Uuid],
        actor_id: Option<Uuid>,
    ) -> ApprovalSummary {
        let mut summary = ApprovalSummary::default();

        for &request_id in request_ids {
            let result = self.approve(request_id, actor_id).await;
            summary.absorb(request_id, result);
        }

        tracing::info!(
            requested = request_ids.len(),
            approved = summary.approved,
            errors = summary.errors.len(),
            "Bulk approval finished"
        );

        summary
    }

    /// Decline every targeted request not already declined. Idempotent;
    /// no lifecycle side effects.
    pub async fn decline_many(
        &self,
        request_ids: &[Uuid],
        actor_id: Option<Uuid>,
    ) -> BillingResult<DeclineOutcome> {
        let declined: Vec<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            UPDATE payment_requests
            SET status = 'declined', updated_at = NOW()
            WHERE id = ANY($1) AND status <> 'declined'
            RETURNING id, org_id
            "#,
        )
        .bind(request_ids)
        .fetch_all(&self.pool)
        .await?;

        for (request_id, org_id) in &declined {
            self.event_logger
                .log_best_effort(
                    BillingEventBuilder::new(*org_id, BillingEventType::RequestDeclined)
                        .data(serde_json::json!({ "request_id": request_id }))
                        .actor_opt(actor_id, ActorType::Admin),
                )
                .await;
        }

        tracing::info!(declined = declined.len(), "Declined payment request(s)");

        Ok(DeclineOutcome {
            declined: declined.len() as u64,
        })
    }

    /// Re-read the organization after commit and confirm the extension
    /// took effect.
    async fn verify_extension(
        &self,
        org_id: Uuid,
        org_name: &str,
    ) -> BillingResult<Option<String>> {
        let row: Option<(String, Option<OffsetDateTime>)> = sqlx::query_as(
            "SELECT subscription_status, subscription_expires_at FROM organizations WHERE id = $1",
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        let warning = match row {
            Some((status, expires)) if status == "SUBSCRIBED" && expires.is_some() => None,
            Some((status, expires)) => {
                tracing::warn!(
                    org_id = %org_id,
                    status = %status,
                    expires = ?expires,
                    "Save verification failed after approval"
                );
                Some(format!("{}: save verification failed", org_name))
            }
            None => Some(format!("{}: organization vanished after approval", org_name)),
        };

        Ok(warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn approved(org: &str, expires: Option<OffsetDateTime>) -> BillingResult<ApprovalOutcome> {
        Ok(ApprovalOutcome::Approved {
            org_name: org.to_string(),
            new_expires_at: expires,
            verification_warning: None,
        })
    }

    #[test]
    fn test_summary_partial_failure() {
        // Three requests where the second fails: 1 and 3 approve, 2 is
        // recorded as an error, processing does not stop.
        let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let mut summary = ApprovalSummary::default();

        summary.absorb(ids[0], approved("Alpha", Some(datetime!(2025-08-01 0:00 UTC))));
        summary.absorb(
            ids[1],
            Err(BillingError::NotFound("Organization missing".to_string())),
        );
        summary.absorb(ids[2], approved("Gamma", Some(datetime!(2025-09-01 0:00 UTC))));

        assert_eq!(summary.approved, 2);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].request_id, ids[1]);
        assert_eq!(summary.updated_orgs.len(), 2);
        assert!(summary.message().contains("Approved 2 payment request(s)"));
        assert!(summary.message().contains("Errors:"));
    }

    #[test]
    fn test_summary_reports_already_processed() {
        let id = Uuid::new_v4();
        let mut summary = ApprovalSummary::default();
        summary.absorb(
            id,
            Ok(ApprovalOutcome::AlreadyProcessed {
                current_status: RequestStatus::Approved,
            }),
        );

        assert_eq!(summary.approved, 0);
        assert_eq!(summary.already_processed, vec![id]);
        assert!(summary.message().contains("already processed"));
    }

    #[test]
    fn test_summary_carries_verification_warning() {
        let mut summary = ApprovalSummary::default();
        summary.absorb(
            Uuid::new_v4(),
            Ok(ApprovalOutcome::Approved {
                org_name: "Beta".to_string(),
                new_expires_at: None,
                verification_warning: Some("Beta: save verification failed".to_string()),
            }),
        );

        assert_eq!(summary.approved, 1);
        assert_eq!(summary.warnings, vec!["Beta: save verification failed"]);
        // No expiry means no "updated" line
        assert!(summary.updated_orgs.is_empty());
    }

    #[test]
    fn test_expiry_stamp_format() {
        let mut summary = ApprovalSummary::default();
        summary.absorb(
            Uuid::new_v4(),
            approved("Delta", Some(datetime!(2025-07-04 09:30 UTC))),
        );
        assert_eq!(summary.updated_orgs, vec!["Delta (expires: 2025-07-04 09:30)"]);
    }
}
