// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Billing Core
//!
//! Tests critical boundary conditions in:
//! - Lifecycle arithmetic (trial window, extension stacking, folding)
//! - Pricing (first-month discount, clamping)
//! - Approval summaries (partial failure, message assembly)

#[cfg(test)]
mod lifecycle_boundary_tests {
    use crate::lifecycle::*;
    use pledgetrack_shared::SubscriptionStatus;
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};

    fn now() -> OffsetDateTime {
        datetime!(2025-03-10 08:00 UTC)
    }

    // =========================================================================
    // Trial active at 6d23h59m, inactive at exactly 7d
    // =========================================================================
    #[test]
    fn test_trial_window_boundary() {
        let snapshot = CoverageSnapshot {
            status: SubscriptionStatus::FreeTrial,
            trial_started_at: Some(now() - Duration::days(7) + Duration::minutes(1)),
            subscription_expires_at: None,
        };
        assert!(snapshot.trial_active(now()), "one minute left is active");

        let lapsed = CoverageSnapshot {
            trial_started_at: Some(now() - Duration::days(7)),
            ..snapshot
        };
        assert!(!lapsed.trial_active(now()), "exactly 7 days is lapsed");
    }

    // =========================================================================
    // Two sequential 1-month extensions equal one 2-month extension
    // =========================================================================
    #[test]
    fn test_sequential_extensions_stack() {
        let start = CoverageSnapshot {
            status: SubscriptionStatus::NotSubscribed,
            trial_started_at: None,
            subscription_expires_at: None,
        };

        let once = start.extend_paid(1, now()).extend_paid(1, now());
        let twice = start.extend_paid(2, now());
        assert_eq!(once.subscription_expires_at, twice.subscription_expires_at);
        assert_eq!(
            once.subscription_expires_at,
            Some(now() + Duration::days(60))
        );
    }

    // =========================================================================
    // Folding with less than a whole day of trial left adds nothing
    // =========================================================================
    #[test]
    fn test_folding_sub_day_remainder() {
        let snapshot = CoverageSnapshot {
            status: SubscriptionStatus::FreeTrial,
            trial_started_at: Some(now() - Duration::days(7) + Duration::hours(5)),
            subscription_expires_at: None,
        };
        assert_eq!(snapshot.remaining_trial_days(now()), 0);

        let next = snapshot.extend_paid(1, now());
        assert_eq!(
            next.subscription_expires_at,
            Some(now() + Duration::days(30))
        );
    }

    // =========================================================================
    // Full remaining trial folds: approval at activation instant
    // =========================================================================
    #[test]
    fn test_folding_full_window() {
        let snapshot = CoverageSnapshot {
            status: SubscriptionStatus::FreeTrial,
            trial_started_at: Some(now()),
            subscription_expires_at: None,
        };

        let next = snapshot.extend_paid(1, now());
        assert_eq!(
            next.subscription_expires_at,
            Some(now() + Duration::days(TRIAL_DAYS + DAYS_PER_PAID_MONTH))
        );
    }

    // =========================================================================
    // 12 months is 360 days, not a calendar year
    // =========================================================================
    #[test]
    fn test_twelve_months_is_360_days() {
        let start = CoverageSnapshot {
            status: SubscriptionStatus::NotSubscribed,
            trial_started_at: None,
            subscription_expires_at: None,
        };

        let next = start.extend_paid(12, now());
        assert_eq!(
            next.subscription_expires_at,
            Some(now() + Duration::days(360))
        );
    }

    // =========================================================================
    // Extension during a lapsed-but-unswept SUBSCRIBED state starts from now
    // =========================================================================
    #[test]
    fn test_extension_ignores_stale_expiry() {
        let snapshot = CoverageSnapshot {
            status: SubscriptionStatus::Subscribed,
            trial_started_at: None,
            subscription_expires_at: Some(now() - Duration::seconds(1)),
        };

        let next = snapshot.extend_paid(1, now());
        assert_eq!(
            next.subscription_expires_at,
            Some(now() + Duration::days(30))
        );
    }

    // =========================================================================
    // Sweep then re-trial: history does not block a new window
    // =========================================================================
    #[test]
    fn test_lapse_then_retrial() {
        let snapshot = CoverageSnapshot {
            status: SubscriptionStatus::FreeTrial,
            trial_started_at: Some(now() - Duration::days(10)),
            subscription_expires_at: None,
        };

        let (swept, _) = snapshot.sweep(now()).unwrap();
        assert_eq!(swept.status, SubscriptionStatus::NotSubscribed);

        let reactivated = swept.activate_trial(now()).unwrap();
        assert_eq!(reactivated.trial_started_at, Some(now()));
        assert!(reactivated.has_coverage(now()));
    }

    // =========================================================================
    // Sweeping twice is a no-op the second time
    // =========================================================================
    #[test]
    fn test_sweep_is_idempotent() {
        let snapshot = CoverageSnapshot {
            status: SubscriptionStatus::Subscribed,
            trial_started_at: None,
            subscription_expires_at: Some(now() - Duration::days(1)),
        };

        let (swept, _) = snapshot.sweep(now()).unwrap();
        assert_eq!(swept.sweep(now()), None);
    }
}

#[cfg(test)]
mod pricing_tests {
    use crate::settings::BillingSettings;
    use pledgetrack_shared::OrgCategory;

    // =========================================================================
    // 35% default: 19,800.00 -> 12,870.00 first month
    // =========================================================================
    #[test]
    fn test_default_discount_math() {
        let settings = BillingSettings::default();
        let quote = settings.quote(OrgCategory::Church, 1);
        assert_eq!(quote.discount_percent, 35);
        assert_eq!(quote.first_month_tzs_cents, 1_287_000);
        assert_eq!(quote.total_tzs_cents, 1_287_000);
    }

    // =========================================================================
    // 6 months: one discounted month plus five full months
    // =========================================================================
    #[test]
    fn test_six_month_total() {
        let settings = BillingSettings::default();
        let quote = settings.quote(OrgCategory::Ngo, 6);
        assert_eq!(quote.total_tzs_cents, 1_287_000 + 5 * 1_980_000);
    }

    // =========================================================================
    // Zero discount bills every month at full price
    // =========================================================================
    #[test]
    fn test_zero_discount() {
        let mut settings = BillingSettings::default();
        settings.default_discount_percent = 0;
        let quote = settings.quote(OrgCategory::Other, 3);
        assert_eq!(quote.total_tzs_cents, 3 * 1_980_000);
    }

    // =========================================================================
    // Negative discount entries clamp to zero
    // =========================================================================
    #[test]
    fn test_negative_discount_clamps() {
        let mut settings = BillingSettings::default();
        settings.category_discounts.insert("school".to_string(), -20);
        assert_eq!(settings.discount_for(OrgCategory::School), 0);
    }

    // =========================================================================
    // Quote totals stay exact for odd discount percents
    // =========================================================================
    #[test]
    fn test_integer_division_truncates() {
        let mut settings = BillingSettings::default();
        settings.base_price_tzs_cents = 999;
        settings.default_discount_percent = 33;
        let quote = settings.quote(OrgCategory::Other, 1);
        // 999 * 67 / 100 = 669.33 truncated
        assert_eq!(quote.first_month_tzs_cents, 669);
    }
}

#[cfg(test)]
mod approval_summary_tests {
    use crate::approval::{ApprovalOutcome, ApprovalSummary};
    use crate::error::BillingError;
    use pledgetrack_shared::RequestStatus;
    use uuid::Uuid;

    // =========================================================================
    // Every error keeps its request id in the report
    // =========================================================================
    #[test]
    fn test_multiple_errors_keep_ids() {
        let mut summary = ApprovalSummary::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        summary.absorb(a, Err(BillingError::NotFound("gone".to_string())));
        summary.absorb(
            b,
            Err(BillingError::Database("connection reset".to_string())),
        );

        assert_eq!(summary.errors.len(), 2);
        let msg = summary.message();
        assert!(msg.contains(&a.to_string()));
        assert!(msg.contains(&b.to_string()));
    }

    // =========================================================================
    // Empty batch produces a clean zero-count message
    // =========================================================================
    #[test]
    fn test_empty_summary_message() {
        let summary = ApprovalSummary::default();
        assert_eq!(summary.message(), "Approved 0 payment request(s).");
    }

    // =========================================================================
    // Mixed batch: counts do not bleed into each other
    // =========================================================================
    #[test]
    fn test_mixed_batch_counts() {
        let mut summary = ApprovalSummary::default();

        summary.absorb(
            Uuid::new_v4(),
            Ok(ApprovalOutcome::Approved {
                org_name: "Alpha".to_string(),
                new_expires_at: None,
                verification_warning: None,
            }),
        );
        summary.absorb(
            Uuid::new_v4(),
            Ok(ApprovalOutcome::AlreadyProcessed {
                current_status: RequestStatus::Declined,
            }),
        );
        summary.absorb(Uuid::new_v4(), Err(BillingError::OrganizationInactive));

        assert_eq!(summary.approved, 1);
        assert_eq!(summary.already_processed.len(), 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.warnings.is_empty());
    }
}
