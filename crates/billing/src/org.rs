//! Organization records and management
//!
//! The organization row is the sole mutation target of the lifecycle
//! state machine. Everything here either reads rows or routes mutations
//! through the machine; nothing writes the subscription fields directly.

use pledgetrack_shared::{OrgCategory, SubscriptionStatus};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::lifecycle::CoverageSnapshot;

/// An organization (tenant) row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub category: String,
    pub is_active: bool,
    pub subscription_status: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Organization {
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_db(&self.subscription_status)
    }

    pub fn category(&self) -> OrgCategory {
        OrgCategory::from_db(&self.category)
    }

    pub fn coverage(&self) -> CoverageSnapshot {
        CoverageSnapshot {
            status: self.status(),
            trial_started_at: self.trial_started_at,
            subscription_expires_at: self.subscription_expires_at,
        }
    }
}

/// Per-status organization counts for the admin dashboard.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OrgStatusCounts {
    pub total: i64,
    pub active: i64,
    pub free_trial: i64,
    pub subscribed: i64,
    pub not_subscribed: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub category: OrgCategory,
}

/// Organization management service.
pub struct OrganizationService {
    pool: PgPool,
    event_logger: BillingEventLogger,
}

impl OrganizationService {
    pub fn new(pool: PgPool) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self { pool, event_logger }
    }

    /// Create an organization at signup.
    ///
    /// The trial activation event runs exactly once here: the row is born
    /// FREE_TRIAL with `trial_started_at = now`.
    pub async fn create(&self, new: NewOrganization) -> BillingResult<Organization> {
        let slug = new.slug.trim().to_lowercase();
        if slug.is_empty()
            || !slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(BillingError::InvalidInput(format!(
                "slug '{}' must be lowercase letters, digits, and dashes",
                slug
            )));
        }
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(BillingError::InvalidInput("name must not be empty".to_string()));
        }

        let org: Organization = sqlx::query_as(
            r#"
            INSERT INTO organizations
                (name, slug, description, category, subscription_status, trial_started_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING *
            "#,
        )
        .bind(&name)
        .bind(&slug)
        .bind(&new.description)
        .bind(new.category.as_str())
        .bind(SubscriptionStatus::FreeTrial.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                BillingError::InvalidInput("an organization with that name or slug already exists".to_string())
            }
            _ => BillingError::Database(e.to_string()),
        })?;

        tracing::info!(
            org_id = %org.id,
            slug = %org.slug,
            "Organization created with free trial"
        );

        self.event_logger
            .log_best_effort(
                BillingEventBuilder::new(org.id, BillingEventType::TrialActivated).data(
                    serde_json::json!({
                        "trial_started_at": org.trial_started_at.map(|t| t.to_string()),
                        "source": "signup",
                    }),
                ),
            )
            .await;

        Ok(org)
    }

    pub async fn get_by_id(&self, org_id: Uuid) -> BillingResult<Organization> {
        sqlx::query_as("SELECT * FROM organizations WHERE id = $1")
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("Organization {} not found", org_id)))
    }

    /// Resolve a tenant by URL slug. Inactive organizations resolve to
    /// nothing, matching the tenant middleware's 404 behavior.
    pub async fn get_active_by_slug(&self, slug: &str) -> BillingResult<Option<Organization>> {
        let org = sqlx::query_as("SELECT * FROM organizations WHERE slug = $1 AND is_active")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(org)
    }

    /// List organizations for the admin portal, newest first.
    pub async fn list(
        &self,
        status: Option<SubscriptionStatus>,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> BillingResult<Vec<Organization>> {
        let pattern = search.map(|s| format!("%{}%", s));
        let orgs = sqlx::query_as(
            r#"
            SELECT * FROM organizations
            WHERE ($1::TEXT IS NULL OR subscription_status = $1)
              AND ($2::TEXT IS NULL OR name ILIKE $2 OR slug ILIKE $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(orgs)
    }

    /// Suspend or reactivate an organization (soft-disable only; rows are
    /// never deleted).
    pub async fn set_active(&self, org_id: Uuid, is_active: bool) -> BillingResult<Organization> {
        let org: Option<Organization> = sqlx::query_as(
            "UPDATE organizations SET is_active = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(is_active)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        let org = org
            .ok_or_else(|| BillingError::NotFound(format!("Organization {} not found", org_id)))?;

        tracing::info!(
            org_id = %org.id,
            is_active = is_active,
            "Organization active flag changed"
        );

        Ok(org)
    }

    pub async fn counts_by_status(&self) -> BillingResult<OrgStatusCounts> {
        let row: (i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE is_active),
                COUNT(*) FILTER (WHERE subscription_status = 'FREE_TRIAL'),
                COUNT(*) FILTER (WHERE subscription_status = 'SUBSCRIBED'),
                COUNT(*) FILTER (WHERE subscription_status = 'NOT_SUBSCRIBED')
            FROM organizations
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(OrgStatusCounts {
            total: row.0,
            active: row.1,
            free_trial: row.2,
            subscribed: row.3,
            not_subscribed: row.4,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn org_with(status: &str) -> Organization {
        Organization {
            id: Uuid::new_v4(),
            name: "St. Peter Choir".to_string(),
            slug: "st-peter-choir".to_string(),
            description: None,
            category: "church".to_string(),
            is_active: true,
            subscription_status: status.to_string(),
            trial_started_at: None,
            subscription_expires_at: None,
            created_at: datetime!(2025-01-01 0:00 UTC),
            updated_at: datetime!(2025-01-01 0:00 UTC),
        }
    }

    #[test]
    fn test_coverage_snapshot_mirrors_row() {
        let mut org = org_with("FREE_TRIAL");
        org.trial_started_at = Some(datetime!(2025-06-01 0:00 UTC));

        let snapshot = org.coverage();
        assert_eq!(snapshot.status, SubscriptionStatus::FreeTrial);
        assert_eq!(snapshot.trial_started_at, org.trial_started_at);
        assert_eq!(snapshot.subscription_expires_at, None);
    }

    #[test]
    fn test_unknown_status_reads_as_not_subscribed() {
        let org = org_with("LEGACY_VALUE");
        assert_eq!(org.status(), SubscriptionStatus::NotSubscribed);
    }
}
