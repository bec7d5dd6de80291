// Billing crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! PledgeTrack Billing Module
//!
//! The subscription/trial lifecycle core: the state machine that computes
//! coverage transitions, the payment-request ledger that records billing
//! intents, the administrative approval workflow that resolves them, and
//! the opportunistic expiry sweeper behind the access gate.
//!
//! ## Features
//!
//! - **Lifecycle State Machine**: trial activation, paid extension, expiry sweep
//! - **Payment Request Ledger**: trial and paid billing intents with pricing snapshots
//! - **Approval Workflow**: single and bulk approve/decline with per-item failures
//! - **Reconciliation**: idempotent safety net for approved-but-unapplied requests
//! - **Billing Events**: append-only audit log of every transition
//! - **Invariants**: runnable read-only consistency checks

pub mod approval;
pub mod error;
pub mod events;
pub mod invariants;
pub mod lifecycle;
pub mod org;
pub mod reconcile;
pub mod requests;
pub mod settings;
pub mod sweeper;

#[cfg(test)]
mod edge_case_tests;

// Approval
pub use approval::{
    ApprovalFailure, ApprovalOutcome, ApprovalService, ApprovalSummary, DeclineOutcome,
};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Lifecycle
pub use lifecycle::{CoverageSnapshot, SweepTransition, DAYS_PER_PAID_MONTH, TRIAL_DAYS};

// Organizations
pub use org::{NewOrganization, OrgStatusCounts, Organization, OrganizationService};

// Reconcile
pub use reconcile::{ReconcileOutcome, ReconcileService};

// Requests
pub use requests::{LedgerService, PaidSubmission, PaymentRequest, RequestStatusCounts};

// Settings
pub use settings::{BillingSettings, Quote};

// Sweeper
pub use sweeper::ExpirySweeper;

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub organizations: OrganizationService,
    pub ledger: LedgerService,
    pub approvals: ApprovalService,
    pub reconcile: ReconcileService,
    pub sweeper: ExpirySweeper,
    pub invariants: InvariantChecker,
    settings: BillingSettings,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> Self {
        Self::new(BillingSettings::from_env(), pool)
    }

    /// Create a new billing service with explicit settings
    pub fn new(settings: BillingSettings, pool: PgPool) -> Self {
        Self {
            organizations: OrganizationService::new(pool.clone()),
            ledger: LedgerService::new(pool.clone(), settings.clone()),
            approvals: ApprovalService::new(pool.clone()),
            reconcile: ReconcileService::new(pool.clone()),
            sweeper: ExpirySweeper::new(pool.clone()),
            invariants: InvariantChecker::new(pool),
            settings,
        }
    }

    pub fn settings(&self) -> &BillingSettings {
        &self.settings
    }
}
