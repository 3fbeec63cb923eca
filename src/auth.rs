//! Who is asking.
//!
//! Authentication itself happens elsewhere; this crate only needs the
//! current user's id and tier to pick limits and a watchlist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::subscription::{is_subscription_active, Tier};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub tier: Tier,
    /// End of the paid period. Paid tiers without one count as lapsed.
    #[serde(default)]
    pub subscription_end: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(user_id: &str, username: &str, tier: Tier) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: username.to_string(),
            tier,
            subscription_end: None,
        }
    }

    pub fn with_subscription_end(mut self, end: DateTime<Utc>) -> Self {
        self.subscription_end = Some(end);
        self
    }

    /// Tier whose limits apply at `now`: the subscribed tier while it is
    /// active, otherwise free.
    pub fn active_tier(&self, now: DateTime<Utc>) -> Tier {
        if is_subscription_active(self.tier, self.subscription_end, now) {
            self.tier
        } else {
            debug!(user_id = %self.user_id, tier = %self.tier, "Subscription lapsed, applying free tier");
            Tier::Free
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait AuthProvider: Send + Sync {
    /// The signed-in user, or `None` for an anonymous session.
    fn current_user(&self) -> Option<User>;
}

/// Always reports the same session. Used by the binary, which serves a
/// single operator, and by tests.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    user: Option<User>,
}

impl StaticAuth {
    pub fn signed_in(user: User) -> Self {
        Self { user: Some(user) }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

impl AuthProvider for StaticAuth {
    fn current_user(&self) -> Option<User> {
        self.user.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_static_auth() {
        assert!(StaticAuth::anonymous().current_user().is_none());

        let auth = StaticAuth::signed_in(User::new("u1", "ana", Tier::Premium));
        let user = auth.current_user().unwrap();
        assert_eq!(user.user_id, "u1");
        assert_eq!(user.tier, Tier::Premium);
    }

    #[test]
    fn test_user_tier_defaults_to_free() {
        let user: User = serde_json::from_str(r#"{"user_id":"u2","username":"bo"}"#).unwrap();
        assert_eq!(user.tier, Tier::Free);
    }

    #[test]
    fn test_active_tier_follows_subscription_end() {
        let now = Utc::now();
        let paid = User::new("u3", "cy", Tier::Premium);
        assert_eq!(paid.active_tier(now), Tier::Free);

        let current = paid.clone().with_subscription_end(now + Duration::days(30));
        assert_eq!(current.active_tier(now), Tier::Premium);

        let expired = paid.with_subscription_end(now - Duration::days(1));
        assert_eq!(expired.active_tier(now), Tier::Free);

        assert_eq!(User::new("u4", "di", Tier::Free).active_tier(now), Tier::Free);
    }

    #[test]
    fn test_subscription_end_deserialises() {
        let user: User = serde_json::from_str(
            r#"{"user_id":"u5","username":"ed","tier":"basic","subscription_end":"2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(user.tier, Tier::Basic);
        assert!(user.subscription_end.is_some());
    }
}
