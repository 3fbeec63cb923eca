//! Subscription tiers, limits and feature gates.
//!
//! The scanner itself never enforces limits; callers (the dashboard)
//! consult a `SubscriptionPolicy` before running a scan on a user's
//! behalf.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Share of a limit at which an upgrade is suggested.
pub const UPGRADE_USAGE_RATIO: f64 = 0.8;

#[derive(Debug, Error, PartialEq)]
pub enum SubscriptionError {
    #[error("unknown subscription tier: {0}")]
    UnknownTier(String),

    #[error("unknown feature: {0}")]
    UnknownFeature(String),
}

// ---------------------------------------------------------------------------
// Tiers and features
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Basic,
    Premium,
    Ultimate,
}

impl Tier {
    /// All tiers, cheapest first.
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Basic, Tier::Premium, Tier::Ultimate];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Basic => "basic",
            Tier::Premium => "premium",
            Tier::Ultimate => "ultimate",
        }
    }

    /// The next tier up, if any.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Free => Some(Tier::Basic),
            Tier::Basic => Some(Tier::Premium),
            Tier::Premium => Some(Tier::Ultimate),
            Tier::Ultimate => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "basic" => Ok(Tier::Basic),
            "premium" => Ok(Tier::Premium),
            "ultimate" => Ok(Tier::Ultimate),
            _ => Err(SubscriptionError::UnknownTier(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    RealTimeData,
    AdvancedIndicators,
    AiPredictions,
    WhaleDetection,
    AutomatedTrading,
    ApiAccess,
}

impl Feature {
    pub fn as_str(self) -> &'static str {
        match self {
            Feature::RealTimeData => "real_time_data",
            Feature::AdvancedIndicators => "advanced_indicators",
            Feature::AiPredictions => "ai_predictions",
            Feature::WhaleDetection => "whale_detection",
            Feature::AutomatedTrading => "automated_trading",
            Feature::ApiAccess => "api_access",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = SubscriptionError;

    /// Unknown names are an error. They never count as an enabled
    /// feature.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "real_time_data" => Ok(Feature::RealTimeData),
            // The optimizer ships with the advanced indicator pack.
            "advanced_indicators" | "portfolio_optimizer" => Ok(Feature::AdvancedIndicators),
            "ai_predictions" => Ok(Feature::AiPredictions),
            "whale_detection" => Ok(Feature::WhaleDetection),
            "automated_trading" => Ok(Feature::AutomatedTrading),
            "api_access" => Ok(Feature::ApiAccess),
            _ => Err(SubscriptionError::UnknownFeature(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierLimits {
    pub tier: Tier,
    pub daily_scans: u32,
    pub max_alerts: u32,
    pub api_calls_per_day: u32,
    pub max_portfolios: u32,
    /// Minutes between data refreshes.
    pub refresh_interval_mins: u32,
    pub price_monthly: f64,
    pub price_yearly: f64,
    pub trial_days: u32,
    pub features: &'static [Feature],
}

const BASIC_FEATURES: &[Feature] = &[
    Feature::RealTimeData,
    Feature::AdvancedIndicators,
    Feature::AiPredictions,
];

const PREMIUM_FEATURES: &[Feature] = &[
    Feature::RealTimeData,
    Feature::AdvancedIndicators,
    Feature::AiPredictions,
    Feature::WhaleDetection,
    Feature::ApiAccess,
];

const ULTIMATE_FEATURES: &[Feature] = &[
    Feature::RealTimeData,
    Feature::AdvancedIndicators,
    Feature::AiPredictions,
    Feature::WhaleDetection,
    Feature::AutomatedTrading,
    Feature::ApiAccess,
];

const PLANS: [TierLimits; 4] = [
    TierLimits {
        tier: Tier::Free,
        daily_scans: 3,
        max_alerts: 5,
        api_calls_per_day: 100,
        max_portfolios: 1,
        refresh_interval_mins: 15,
        price_monthly: 0.0,
        price_yearly: 0.0,
        trial_days: 0,
        features: &[],
    },
    TierLimits {
        tier: Tier::Basic,
        daily_scans: 10,
        max_alerts: 20,
        api_calls_per_day: 500,
        max_portfolios: 3,
        refresh_interval_mins: 1,
        price_monthly: 29.99,
        price_yearly: 299.99,
        trial_days: 7,
        features: BASIC_FEATURES,
    },
    TierLimits {
        tier: Tier::Premium,
        daily_scans: 50,
        max_alerts: 100,
        api_calls_per_day: 2000,
        max_portfolios: 10,
        refresh_interval_mins: 1,
        price_monthly: 99.99,
        price_yearly: 999.99,
        trial_days: 14,
        features: PREMIUM_FEATURES,
    },
    TierLimits {
        tier: Tier::Ultimate,
        daily_scans: 1000,
        max_alerts: 500,
        api_calls_per_day: 10000,
        max_portfolios: 50,
        refresh_interval_mins: 1,
        price_monthly: 199.99,
        price_yearly: 1999.99,
        trial_days: 30,
        features: ULTIMATE_FEATURES,
    },
];

/// Counters checked against a tier's limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub alerts_used: u32,
    pub scans_used: u32,
    pub api_calls_used: u32,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Limits and feature gates per tier.
#[cfg_attr(test, mockall::automock)]
pub trait SubscriptionPolicy: Send + Sync {
    fn limits(&self, tier: Tier) -> TierLimits;

    fn max_daily_scans(&self, tier: Tier) -> u32 {
        self.limits(tier).daily_scans
    }

    fn feature_enabled(&self, tier: Tier, feature: Feature) -> bool {
        self.limits(tier).features.contains(&feature)
    }

    /// Next tier up when any of alerts, scans or API calls has reached
    /// 80% of the current tier's limit. `None` at the top tier.
    fn upgrade_recommendation(&self, tier: Tier, usage: &UsageStats) -> Option<Tier> {
        let limits = self.limits(tier);
        let near = |used: u32, limit: u32| f64::from(used) >= f64::from(limit) * UPGRADE_USAGE_RATIO;

        if near(usage.alerts_used, limits.max_alerts)
            || near(usage.scans_used, limits.daily_scans)
            || near(usage.api_calls_used, limits.api_calls_per_day)
        {
            tier.next()
        } else {
            None
        }
    }
}

/// The built-in plan table.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanTable;

impl PlanTable {
    /// Every tier's limits, cheapest first.
    pub fn all(&self) -> Vec<TierLimits> {
        PLANS.to_vec()
    }
}

impl SubscriptionPolicy for PlanTable {
    fn limits(&self, tier: Tier) -> TierLimits {
        PLANS[tier as usize]
    }
}

/// Free never lapses. Paid tiers are active strictly before `expiry`;
/// a paid tier with no recorded expiry is treated as lapsed.
pub fn is_subscription_active(tier: Tier, expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match tier {
        Tier::Free => true,
        _ => expiry.is_some_and(|e| now < e),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
