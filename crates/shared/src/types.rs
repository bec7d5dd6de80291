//! Core enums shared across crates
//!
//! All three enums are persisted as TEXT columns. Parsing is lenient on
//! read (unknown values map to a safe default) because rows predating a
//! code change must never make a query unreadable.

use serde::{Deserialize, Serialize};

/// Subscription lifecycle status of an organization.
///
/// None of the states is absorbing: any state can move to any other via a
/// trial activation, a paid-extension approval, or an expiry sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    FreeTrial,
    NotSubscribed,
    Subscribed,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::FreeTrial => "FREE_TRIAL",
            SubscriptionStatus::NotSubscribed => "NOT_SUBSCRIBED",
            SubscriptionStatus::Subscribed => "SUBSCRIBED",
        }
    }

    /// Lenient parse for database reads. Unknown values are treated as
    /// NOT_SUBSCRIBED so a corrupted row fails closed (no coverage).
    pub fn from_db(s: &str) -> Self {
        match s {
            "FREE_TRIAL" => SubscriptionStatus::FreeTrial,
            "SUBSCRIBED" => SubscriptionStatus::Subscribed,
            _ => SubscriptionStatus::NotSubscribed,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a payment request.
///
/// Transitions pending -> {approved, declined} exactly once; there is no
/// path back to pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Declined,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Declined => "declined",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "approved" => RequestStatus::Approved,
            "declined" => RequestStatus::Declined,
            _ => RequestStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RequestStatus::Pending)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Organization category, used to look up the first-month discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgCategory {
    Church,
    School,
    Ngo,
    SavingsGroup,
    Event,
    Other,
}

impl OrgCategory {
    pub const ALL: [OrgCategory; 6] = [
        OrgCategory::Church,
        OrgCategory::School,
        OrgCategory::Ngo,
        OrgCategory::SavingsGroup,
        OrgCategory::Event,
        OrgCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrgCategory::Church => "church",
            OrgCategory::School => "school",
            OrgCategory::Ngo => "ngo",
            OrgCategory::SavingsGroup => "savings_group",
            OrgCategory::Event => "event",
            OrgCategory::Other => "other",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "church" => OrgCategory::Church,
            "school" => OrgCategory::School,
            "ngo" => OrgCategory::Ngo,
            "savings_group" => OrgCategory::SavingsGroup,
            "event" => OrgCategory::Event,
            _ => OrgCategory::Other,
        }
    }
}

impl std::fmt::Display for OrgCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            SubscriptionStatus::FreeTrial,
            SubscriptionStatus::NotSubscribed,
            SubscriptionStatus::Subscribed,
        ] {
            assert_eq!(SubscriptionStatus::from_db(status.as_str()), status);
        }
    }

    #[test]
    fn test_unknown_status_fails_closed() {
        assert_eq!(
            SubscriptionStatus::from_db("GARBAGE"),
            SubscriptionStatus::NotSubscribed
        );
    }

    #[test]
    fn test_request_status_round_trip() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Declined,
        ] {
            assert_eq!(RequestStatus::from_db(status.as_str()), status);
        }
    }

    #[test]
    fn test_unknown_category_is_other() {
        assert_eq!(OrgCategory::from_db("circus"), OrgCategory::Other);
    }
}
