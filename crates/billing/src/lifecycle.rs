//! Subscription lifecycle state machine
//!
//! Pure transition logic over a [`CoverageSnapshot`] of an organization's
//! persisted subscription fields. Every rule here is total and
//! side-effect free; the services in `approval`, `sweeper`, and
//! `reconcile` load a snapshot, apply a transition, and persist the
//! result. Keeping the arithmetic out of the query layer is what lets the
//! date rules be tested exhaustively without a database.

use pledgetrack_shared::SubscriptionStatus;
use time::{Duration, OffsetDateTime};

/// Length of the free-trial window.
pub const TRIAL_DAYS: i64 = 7;

/// A purchased month of coverage.
pub const DAYS_PER_PAID_MONTH: i64 = 30;

/// An organization's subscription fields, detached from the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageSnapshot {
    pub status: SubscriptionStatus,
    pub trial_started_at: Option<OffsetDateTime>,
    pub subscription_expires_at: Option<OffsetDateTime>,
}

/// Which sweep rule fired, for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTransition {
    TrialLapsed,
    SubscriptionLapsed,
}

impl CoverageSnapshot {
    /// End of the trial window, if a trial was ever started.
    pub fn trial_ends_at(&self) -> Option<OffsetDateTime> {
        self.trial_started_at
            .map(|started| started + Duration::days(TRIAL_DAYS))
    }

    /// A trial was started and its window has not yet elapsed.
    pub fn trial_active(&self, now: OffsetDateTime) -> bool {
        self.trial_ends_at().is_some_and(|end| end > now)
    }

    /// A paid expiry date is set and lies in the future.
    pub fn subscription_active(&self, now: OffsetDateTime) -> bool {
        self.subscription_expires_at.is_some_and(|end| end > now)
    }

    /// Either form of coverage is currently active. This is the predicate
    /// the access gate evaluates, fresh, after an expiry sweep.
    pub fn has_coverage(&self, now: OffsetDateTime) -> bool {
        self.subscription_active(now) || self.trial_active(now)
    }

    /// Whole days left in the trial window; 0 once it has elapsed.
    pub fn remaining_trial_days(&self, now: OffsetDateTime) -> i64 {
        match self.trial_ends_at() {
            Some(end) if end > now => (end - now).whole_days(),
            _ => 0,
        }
    }

    /// Trial activation event.
    ///
    /// Starts a fresh trial only if none was ever started or the previous
    /// window has fully elapsed. Returns `None` while a trial is still
    /// open so a repeat request cannot reset the clock.
    #[must_use]
    pub fn activate_trial(&self, now: OffsetDateTime) -> Option<CoverageSnapshot> {
        if self.trial_active(now) {
            return None;
        }

        Some(CoverageSnapshot {
            status: SubscriptionStatus::FreeTrial,
            trial_started_at: Some(now),
            subscription_expires_at: self.subscription_expires_at,
        })
    }

    /// Paid-extension event for an approved request of `months` months.
    ///
    /// The new expiry is computed by priority:
    /// 1. an unexpired paid period stacks the purchased days onto it;
    /// 2. otherwise an active trial folds its remaining whole days into
    ///    the paid period, starting from now;
    /// 3. otherwise the paid period starts from now. This branch also
    ///    absorbs the corrupt case of a SUBSCRIBED status with a missing
    ///    or stale expiry date.
    ///
    /// The status becomes SUBSCRIBED unconditionally; this is how a trial
    /// converts to paid. `trial_started_at` is kept as history.
    #[must_use]
    pub fn extend_paid(&self, months: i32, now: OffsetDateTime) -> CoverageSnapshot {
        let purchased = Duration::days(DAYS_PER_PAID_MONTH * i64::from(months));

        let new_expires_at = if self.subscription_active(now) {
            // Invariant: rules 1 and 2 are mutually exclusive under normal
            // flow; paid time wins if both somehow hold.
            self.subscription_expires_at.unwrap_or(now) + purchased
        } else if self.trial_active(now) {
            now + Duration::days(self.remaining_trial_days(now)) + purchased
        } else {
            now + purchased
        };

        CoverageSnapshot {
            status: SubscriptionStatus::Subscribed,
            trial_started_at: self.trial_started_at,
            subscription_expires_at: Some(new_expires_at),
        }
    }

    /// Periodic expiry check.
    ///
    /// Both downgrade rules are evaluated on every invocation; neither
    /// short-circuits the other. Returns the downgraded snapshot and the
    /// rule that fired, or `None` when nothing changed. History fields
    /// are never cleared.
    #[must_use]
    pub fn sweep(&self, now: OffsetDateTime) -> Option<(CoverageSnapshot, SweepTransition)> {
        let mut next = *self;
        let mut transition = None;

        if next.status == SubscriptionStatus::FreeTrial
            && next.trial_started_at.is_some()
            && !next.trial_active(now)
        {
            next.status = SubscriptionStatus::NotSubscribed;
            transition = Some(SweepTransition::TrialLapsed);
        }

        if next.status == SubscriptionStatus::Subscribed
            && next.subscription_expires_at.is_some()
            && !next.subscription_active(now)
        {
            next.status = SubscriptionStatus::NotSubscribed;
            transition = Some(SweepTransition::SubscriptionLapsed);
        }

        transition.map(|t| (next, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn now() -> OffsetDateTime {
        datetime!(2025-06-15 12:00 UTC)
    }

    fn fresh_trial(started: OffsetDateTime) -> CoverageSnapshot {
        CoverageSnapshot {
            status: SubscriptionStatus::FreeTrial,
            trial_started_at: Some(started),
            subscription_expires_at: None,
        }
    }

    #[test]
    fn test_trial_activation_sets_clock() {
        let blank = CoverageSnapshot {
            status: SubscriptionStatus::NotSubscribed,
            trial_started_at: None,
            subscription_expires_at: None,
        };

        let activated = blank.activate_trial(now()).unwrap();
        assert_eq!(activated.status, SubscriptionStatus::FreeTrial);
        assert_eq!(activated.trial_started_at, Some(now()));
        assert!(activated.trial_active(now()));
    }

    #[test]
    fn test_trial_activation_is_idempotent_while_active() {
        let first = fresh_trial(now());

        // Second request two days in must not reset the clock
        let later = now() + Duration::days(2);
        assert_eq!(first.activate_trial(later), None);
        assert_eq!(first.trial_started_at, Some(now()));
    }

    #[test]
    fn test_lapsed_trial_can_be_restarted() {
        let old = fresh_trial(now() - Duration::days(30));
        let restarted = old.activate_trial(now()).unwrap();
        assert_eq!(restarted.trial_started_at, Some(now()));
        assert_eq!(restarted.status, SubscriptionStatus::FreeTrial);
    }

    #[test]
    fn test_paid_extension_stacks_on_active_subscription() {
        let expires = now() + Duration::days(10);
        let snapshot = CoverageSnapshot {
            status: SubscriptionStatus::Subscribed,
            trial_started_at: None,
            subscription_expires_at: Some(expires),
        };

        let next = snapshot.extend_paid(2, now());
        assert_eq!(next.subscription_expires_at, Some(expires + Duration::days(60)));
        assert_eq!(next.status, SubscriptionStatus::Subscribed);
    }

    #[test]
    fn test_paid_extension_folds_remaining_trial_days() {
        // Trial started 3 days ago: 4 whole days remain of the 7-day window
        let snapshot = fresh_trial(now() - Duration::days(3));

        let next = snapshot.extend_paid(1, now());
        assert_eq!(
            next.subscription_expires_at,
            Some(now() + Duration::days(4 + 30))
        );
        assert_eq!(next.status, SubscriptionStatus::Subscribed);
        // Trial start is history, not coverage
        assert_eq!(next.trial_started_at, snapshot.trial_started_at);
    }

    #[test]
    fn test_paid_extension_from_nothing_starts_now() {
        let snapshot = CoverageSnapshot {
            status: SubscriptionStatus::NotSubscribed,
            trial_started_at: Some(now() - Duration::days(90)),
            subscription_expires_at: Some(now() - Duration::days(60)),
        };

        let next = snapshot.extend_paid(3, now());
        assert_eq!(next.subscription_expires_at, Some(now() + Duration::days(90)));
    }

    #[test]
    fn test_paid_extension_repairs_missing_expiry() {
        // Status claims SUBSCRIBED but the date is gone: rule 3 applies
        let snapshot = CoverageSnapshot {
            status: SubscriptionStatus::Subscribed,
            trial_started_at: None,
            subscription_expires_at: None,
        };

        let next = snapshot.extend_paid(1, now());
        assert_eq!(next.subscription_expires_at, Some(now() + Duration::days(30)));
    }

    #[test]
    fn test_paid_time_outranks_trial_time() {
        // Abnormal state with both windows open: rule 1 wins
        let expires = now() + Duration::days(5);
        let snapshot = CoverageSnapshot {
            status: SubscriptionStatus::Subscribed,
            trial_started_at: Some(now() - Duration::days(1)),
            subscription_expires_at: Some(expires),
        };

        let next = snapshot.extend_paid(1, now());
        assert_eq!(next.subscription_expires_at, Some(expires + Duration::days(30)));
    }

    #[test]
    fn test_sweep_lapses_expired_trial_keeps_history() {
        let started = now() - Duration::days(8);
        let snapshot = fresh_trial(started);

        let (next, transition) = snapshot.sweep(now()).unwrap();
        assert_eq!(next.status, SubscriptionStatus::NotSubscribed);
        assert_eq!(next.trial_started_at, Some(started));
        assert_eq!(transition, SweepTransition::TrialLapsed);
    }

    #[test]
    fn test_sweep_lapses_expired_subscription() {
        let snapshot = CoverageSnapshot {
            status: SubscriptionStatus::Subscribed,
            trial_started_at: None,
            subscription_expires_at: Some(now() - Duration::hours(1)),
        };

        let (next, transition) = snapshot.sweep(now()).unwrap();
        assert_eq!(next.status, SubscriptionStatus::NotSubscribed);
        assert_eq!(transition, SweepTransition::SubscriptionLapsed);
        // Expiry date is preserved as history
        assert_eq!(next.subscription_expires_at, snapshot.subscription_expires_at);
    }

    #[test]
    fn test_sweep_is_a_noop_under_active_coverage() {
        assert_eq!(fresh_trial(now()).sweep(now() + Duration::days(6)), None);

        let subscribed = CoverageSnapshot {
            status: SubscriptionStatus::Subscribed,
            trial_started_at: None,
            subscription_expires_at: Some(now() + Duration::days(1)),
        };
        assert_eq!(subscribed.sweep(now()), None);
    }

    #[test]
    fn test_sweep_ignores_not_subscribed() {
        let snapshot = CoverageSnapshot {
            status: SubscriptionStatus::NotSubscribed,
            trial_started_at: Some(now() - Duration::days(100)),
            subscription_expires_at: Some(now() - Duration::days(70)),
        };
        assert_eq!(snapshot.sweep(now()), None);
    }

    #[test]
    fn test_access_gate_round_trip() {
        // SUBSCRIBED but expired an hour ago: one sweep downgrades it and
        // no coverage predicate holds afterwards
        let snapshot = CoverageSnapshot {
            status: SubscriptionStatus::Subscribed,
            trial_started_at: None,
            subscription_expires_at: Some(now() - Duration::hours(1)),
        };

        let (next, _) = snapshot.sweep(now()).unwrap();
        assert_eq!(next.status, SubscriptionStatus::NotSubscribed);
        assert!(!next.subscription_active(now()));
        assert!(!next.trial_active(now()));
        assert!(!next.has_coverage(now()));
    }

    #[test]
    fn test_trial_boundary_is_exclusive() {
        // Exactly at the end of the window the trial is no longer active
        let snapshot = fresh_trial(now() - Duration::days(TRIAL_DAYS));
        assert!(!snapshot.trial_active(now()));
        assert_eq!(snapshot.remaining_trial_days(now()), 0);
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let snapshot = CoverageSnapshot {
            status: SubscriptionStatus::Subscribed,
            trial_started_at: None,
            subscription_expires_at: Some(now()),
        };
        assert!(!snapshot.subscription_active(now()));
    }

    #[test]
    fn test_partial_trial_day_is_truncated() {
        // 3.5 days in: 3 whole days remain and fold into the paid period
        let snapshot = fresh_trial(now() - Duration::hours(84));
        assert_eq!(snapshot.remaining_trial_days(now()), 3);

        let next = snapshot.extend_paid(1, now());
        assert_eq!(next.subscription_expires_at, Some(now() + Duration::days(33)));
    }
}
