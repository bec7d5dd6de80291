//! Billing configuration
//!
//! Pricing and payment-channel defaults, loaded once at startup and
//! injected into the services that need them. The original system kept
//! these in a lazily-materialized database singleton; here they are plain
//! configuration.

use std::collections::HashMap;

use pledgetrack_shared::OrgCategory;
use serde::Serialize;

/// Base monthly price: 19,800.00 TZS.
const DEFAULT_BASE_PRICE_TZS_CENTS: i64 = 1_980_000;

/// First-month discount applied when a category has no explicit entry.
const DEFAULT_DISCOUNT_PERCENT: i32 = 35;

#[derive(Debug, Clone)]
pub struct BillingSettings {
    /// Monthly price in TZS minor units.
    pub base_price_tzs_cents: i64,
    /// Fallback first-month discount percent.
    pub default_discount_percent: i32,
    /// Per-category first-month discount percent overrides.
    pub category_discounts: HashMap<String, i32>,
    /// Mobile-money number tenants send payments to.
    pub mpesa_number: String,
    pub mpesa_account_name: String,
    pub support_email: String,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            base_price_tzs_cents: DEFAULT_BASE_PRICE_TZS_CENTS,
            default_discount_percent: DEFAULT_DISCOUNT_PERCENT,
            category_discounts: HashMap::new(),
            mpesa_number: "68256127".to_string(),
            mpesa_account_name: "MIPT SOFTWARES".to_string(),
            support_email: "support@pledgetrack.app".to_string(),
        }
    }
}

impl BillingSettings {
    /// Load settings from environment variables, falling back to defaults.
    ///
    /// `CATEGORY_DISCOUNTS` is a JSON object mapping category name to
    /// percent, e.g. `{"church": 35, "school": 50}`. A malformed value is
    /// logged and ignored rather than failing startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_price_tzs_cents = std::env::var("BASE_PRICE_TZS_CENTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.base_price_tzs_cents);

        let default_discount_percent = std::env::var("DEFAULT_DISCOUNT_PERCENT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.default_discount_percent);

        let category_discounts = match std::env::var("CATEGORY_DISCOUNTS") {
            Ok(raw) => match serde_json::from_str::<HashMap<String, i32>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed CATEGORY_DISCOUNTS, using defaults");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            base_price_tzs_cents,
            default_discount_percent,
            category_discounts,
            mpesa_number: std::env::var("MPESA_NUMBER").unwrap_or(defaults.mpesa_number),
            mpesa_account_name: std::env::var("MPESA_ACCOUNT_NAME")
                .unwrap_or(defaults.mpesa_account_name),
            support_email: std::env::var("SUPPORT_EMAIL").unwrap_or(defaults.support_email),
        }
    }

    /// First-month discount percent for a category, clamped to 0..=100.
    pub fn discount_for(&self, category: OrgCategory) -> i32 {
        self.category_discounts
            .get(category.as_str())
            .copied()
            .unwrap_or(self.default_discount_percent)
            .clamp(0, 100)
    }

    /// Price a paid request: the discount applies to the first month only,
    /// remaining months are billed at the full base price.
    pub fn quote(&self, category: OrgCategory, months: i32) -> Quote {
        let discount_percent = self.discount_for(category);
        let first_month_tzs_cents =
            self.base_price_tzs_cents * i64::from(100 - discount_percent) / 100;
        let remaining = i64::from(months.max(1) - 1) * self.base_price_tzs_cents;

        Quote {
            months: months.max(1),
            discount_percent,
            first_month_tzs_cents,
            total_tzs_cents: first_month_tzs_cents + remaining,
        }
    }
}

/// Priced paid-extension offer for a given number of months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub months: i32,
    pub discount_percent: i32,
    pub first_month_tzs_cents: i64,
    pub total_tzs_cents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_applies_to_first_month_only() {
        let settings = BillingSettings::default();
        let quote = settings.quote(OrgCategory::Other, 3);

        // 19,800.00 * 0.65 = 12,870.00 for the first month
        assert_eq!(quote.first_month_tzs_cents, 1_287_000);
        // plus two full months
        assert_eq!(quote.total_tzs_cents, 1_287_000 + 2 * 1_980_000);
    }

    #[test]
    fn test_single_month_quote() {
        let settings = BillingSettings::default();
        let quote = settings.quote(OrgCategory::Other, 1);
        assert_eq!(quote.total_tzs_cents, quote.first_month_tzs_cents);
    }

    #[test]
    fn test_category_override_beats_default() {
        let mut settings = BillingSettings::default();
        settings.category_discounts.insert("school".to_string(), 50);

        assert_eq!(settings.discount_for(OrgCategory::School), 50);
        assert_eq!(settings.discount_for(OrgCategory::Church), 35);

        let quote = settings.quote(OrgCategory::School, 1);
        assert_eq!(quote.total_tzs_cents, 990_000);
    }

    #[test]
    fn test_discount_clamped() {
        let mut settings = BillingSettings::default();
        settings.category_discounts.insert("event".to_string(), 140);
        assert_eq!(settings.discount_for(OrgCategory::Event), 100);

        let quote = settings.quote(OrgCategory::Event, 2);
        assert_eq!(quote.first_month_tzs_cents, 0);
        assert_eq!(quote.total_tzs_cents, settings.base_price_tzs_cents);
    }

    #[test]
    fn test_zero_months_treated_as_one() {
        let settings = BillingSettings::default();
        let quote = settings.quote(OrgCategory::Other, 0);
        assert_eq!(quote.months, 1);
    }
}
