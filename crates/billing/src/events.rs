//! Billing event audit log
//!
//! Append-only record of every lifecycle transition. Logging is best
//! effort: a failed insert is warned about and swallowed so the audit
//! trail can never abort a billing mutation.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

/// Kinds of billing events recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BillingEventType {
    TrialActivated,
    SubscriptionExtended,
    RequestApproved,
    RequestDeclined,
    TrialLapsed,
    SubscriptionLapsed,
    StateReconciled,
}

impl BillingEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventType::TrialActivated => "TRIAL_ACTIVATED",
            BillingEventType::SubscriptionExtended => "SUBSCRIPTION_EXTENDED",
            BillingEventType::RequestApproved => "REQUEST_APPROVED",
            BillingEventType::RequestDeclined => "REQUEST_DECLINED",
            BillingEventType::TrialLapsed => "TRIAL_LAPSED",
            BillingEventType::SubscriptionLapsed => "SUBSCRIPTION_LAPSED",
            BillingEventType::StateReconciled => "STATE_RECONCILED",
        }
    }
}

/// Who caused an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActorType {
    Admin,
    User,
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Admin => "admin",
            ActorType::User => "user",
            ActorType::System => "system",
        }
    }
}

/// Builder for a single billing event.
#[derive(Debug, Clone)]
pub struct BillingEventBuilder {
    org_id: Uuid,
    event_type: BillingEventType,
    actor_id: Option<Uuid>,
    actor_type: ActorType,
    data: serde_json::Value,
}

impl BillingEventBuilder {
    pub fn new(org_id: Uuid, event_type: BillingEventType) -> Self {
        Self {
            org_id,
            event_type,
            actor_id: None,
            actor_type: ActorType::System,
            data: serde_json::json!({}),
        }
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn actor(mut self, actor_id: Uuid, actor_type: ActorType) -> Self {
        self.actor_id = Some(actor_id);
        self.actor_type = actor_type;
        self
    }

    pub fn actor_opt(mut self, actor_id: Option<Uuid>, actor_type: ActorType) -> Self {
        self.actor_id = actor_id;
        self.actor_type = actor_type;
        self
    }
}

/// Writes billing events to the `billing_events` table.
#[derive(Clone)]
pub struct BillingEventLogger {
    pool: PgPool,
}

impl BillingEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn log_event(&self, event: BillingEventBuilder) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO billing_events (org_id, event_type, actor_id, actor_type, event_data)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.org_id)
        .bind(event.event_type.as_str())
        .bind(event.actor_id)
        .bind(event.actor_type.as_str())
        .bind(&event.data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Log an event, downgrading failures to a warning.
    pub async fn log_best_effort(&self, event: BillingEventBuilder) {
        let event_type = event.event_type;
        if let Err(e) = self.log_event(event).await {
            tracing::warn!(
                event_type = event_type.as_str(),
                error = %e,
                "Failed to log billing event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        assert_eq!(BillingEventType::TrialActivated.as_str(), "TRIAL_ACTIVATED");
        assert_eq!(
            BillingEventType::SubscriptionExtended.as_str(),
            "SUBSCRIPTION_EXTENDED"
        );
        assert_eq!(BillingEventType::StateReconciled.as_str(), "STATE_RECONCILED");
    }

    #[test]
    fn test_builder_defaults_to_system_actor() {
        let event = BillingEventBuilder::new(Uuid::new_v4(), BillingEventType::TrialLapsed);
        assert_eq!(event.actor_type.as_str(), "system");
        assert!(event.actor_id.is_none());
    }
}
