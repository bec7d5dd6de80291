//! Expiry sweeper
//!
//! Opportunistic downgrade of lapsed coverage. Not timer-driven: the
//! tenant middleware runs this inline on every tenant-scoped request, so
//! staleness is bounded only by traffic. An inactive tenant's status can
//! stay stale indefinitely until someone visits a tenant route.

use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::BillingResult;
use crate::events::{BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::lifecycle::{CoverageSnapshot, SweepTransition};
use crate::org::Organization;

pub struct ExpirySweeper {
    pool: PgPool,
    event_logger: BillingEventLogger,
}

impl ExpirySweeper {
    pub fn new(pool: PgPool) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self { pool, event_logger }
    }

    /// Run the periodic expiry check against an already-loaded
    /// organization and return the fresh coverage snapshot the access
    /// gate should evaluate.
    pub async fn sweep(&self, org: &Organization) -> BillingResult<CoverageSnapshot> {
        let now = OffsetDateTime::now_utc();
        let snapshot = org.coverage();

        let Some((next, transition)) = snapshot.sweep(now) else {
            return Ok(snapshot);
        };

        // Guarded write: only downgrade from the status we observed, so a
        // concurrent approval that just re-subscribed the tenant wins.
        let rows_affected = sqlx::query(
            r#"
            UPDATE organizations
            SET subscription_status = $1, updated_at = NOW()
            WHERE id = $2 AND subscription_status = $3
            "#,
        )
        .bind(next.status.as_str())
        .bind(org.id)
        .bind(snapshot.status.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            // Lost the race; re-read and report what is actually there.
            let fresh: Option<Organization> =
                sqlx::query_as("SELECT * FROM organizations WHERE id = $1")
                    .bind(org.id)
                    .fetch_optional(&self.pool)
                    .await?;
            return Ok(fresh.map(|o| o.coverage()).unwrap_or(snapshot));
        }

        let event_type = match transition {
            SweepTransition::TrialLapsed => BillingEventType::TrialLapsed,
            SweepTransition::SubscriptionLapsed => BillingEventType::SubscriptionLapsed,
        };

        tracing::info!(
            org_id = %org.id,
            from = snapshot.status.as_str(),
            to = next.status.as_str(),
            "Expiry sweep downgraded organization"
        );

        self.event_logger
            .log_best_effort(BillingEventBuilder::new(org.id, event_type).data(
                serde_json::json!({
                    "trial_started_at": snapshot.trial_started_at.map(|t| t.to_string()),
                    "subscription_expires_at":
                        snapshot.subscription_expires_at.map(|t| t.to_string()),
                }),
            ))
            .await;

        Ok(next)
    }
}
