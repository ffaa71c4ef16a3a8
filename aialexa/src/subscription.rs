//! Subscription plan resolution.
//!
//! A user is on a paid plan while their Stripe price id matches a configured plan and the
//! current billing period (plus the grace period) has not ended. Everyone else is on the free
//! plan.

use crate::config::{PlanConfig, SubscriptionsConfig};
use crate::db::models::users::SubscriptionRecord;
use chrono::{DateTime, Utc};

/// The limits that apply to a user right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionPlan {
    pub id: String,
    pub name: String,
    pub max_files: i64,
    /// Whether this plan comes from an active paid subscription
    pub is_paid: bool,
}

impl SubscriptionPlan {
    fn from_config(plan: &PlanConfig, is_paid: bool) -> Self {
        Self {
            id: plan.id.clone(),
            name: plan.name.clone(),
            max_files: plan.max_files,
            is_paid,
        }
    }
}

/// Pick the plan for a user's billing record at `now`
pub fn resolve_plan(config: &SubscriptionsConfig, record: Option<&SubscriptionRecord>, now: DateTime<Utc>) -> SubscriptionPlan {
    let free = || SubscriptionPlan::from_config(&config.free, false);

    let Some(record) = record else {
        return free();
    };
    let (Some(price_id), Some(period_end)) = (record.stripe_price_id.as_deref(), record.stripe_current_period_end) else {
        return free();
    };

    let grace = chrono::Duration::from_std(config.grace_period).unwrap_or_else(|_| chrono::Duration::days(1));
    if period_end + grace <= now {
        return free();
    }

    config
        .plans
        .iter()
        .find(|plan| plan.stripe_price_id.as_deref() == Some(price_id))
        .map(|plan| SubscriptionPlan::from_config(plan, true))
        .unwrap_or_else(free)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn config() -> SubscriptionsConfig {
        SubscriptionsConfig {
            plans: vec![PlanConfig {
                id: "pro".to_string(),
                name: "Pro".to_string(),
                stripe_price_id: Some("price_pro".to_string()),
                max_files: 50,
                max_chatbots: 10,
            }],
            ..Default::default()
        }
    }

    fn record(price: Option<&str>, period_end: Option<DateTime<Utc>>) -> SubscriptionRecord {
        SubscriptionRecord {
            stripe_price_id: price.map(str::to_string),
            stripe_current_period_end: period_end,
        }
    }

    #[test]
    fn test_no_record_is_free() {
        let plan = resolve_plan(&config(), None, Utc::now());
        assert_eq!(plan.id, "free");
        assert_eq!(plan.max_files, 1);
        assert!(!plan.is_paid);
    }

    #[test]
    fn test_active_subscription_gets_matching_plan() {
        let now = Utc::now();
        let record = record(Some("price_pro"), Some(now + Duration::days(3)));
        let plan = resolve_plan(&config(), Some(&record), now);
        assert_eq!(plan.id, "pro");
        assert_eq!(plan.max_files, 50);
        assert!(plan.is_paid);
    }

    #[test]
    fn test_grace_period_after_period_end() {
        let now = Utc::now();
        let within_grace = record(Some("price_pro"), Some(now - Duration::hours(12)));
        assert_eq!(resolve_plan(&config(), Some(&within_grace), now).id, "pro");

        let lapsed = record(Some("price_pro"), Some(now - Duration::hours(25)));
        assert_eq!(resolve_plan(&config(), Some(&lapsed), now).id, "free");
    }

    #[test]
    fn test_unknown_price_or_missing_period_is_free() {
        let now = Utc::now();
        let unknown = record(Some("price_legacy"), Some(now + Duration::days(3)));
        assert_eq!(resolve_plan(&config(), Some(&unknown), now).id, "free");

        let no_period = record(Some("price_pro"), None);
        assert_eq!(resolve_plan(&config(), Some(&no_period), now).id, "free");
    }
}
