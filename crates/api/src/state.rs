//! Application state

use std::sync::Arc;

use pledgetrack_billing::BillingService;
use sqlx::PgPool;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub billing: Arc<BillingService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let billing = Arc::new(BillingService::from_env(pool.clone()));
        tracing::info!(
            base_price_tzs_cents = billing.settings().base_price_tzs_cents,
            default_discount_percent = billing.settings().default_discount_percent,
            "Billing service initialized"
        );

        Self {
            pool,
            config,
            billing,
        }
    }
}
