use crate::error::GrowthError;
use crate::models::subscription::{QuotaAction, Subscription, Tier};
use crate::store::SubscriptionStore;
use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_SUBSCRIPTION_TOLERANCE_SECONDS: i64 = 300;

const MS_PER_DAY: i64 = 86_400_000;

/// Half-open accounting period `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl QuotaWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DenyReason {
    LimitExceeded {
        action: QuotaAction,
        used: u32,
        limit: u32,
        window_end: DateTime<Utc>,
    },
    SubscriptionExpired(DateTime<Utc>),
    SubscriptionMismatch(String),
    TierInconsistent(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuotaDecision {
    Allowed {
        window: QuotaWindow,
        used: u32,
        limit: u32,
    },
    Denied(DenyReason),
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed { .. })
    }

    pub fn into_result(self) -> Result<QuotaWindow, GrowthError> {
        match self {
            QuotaDecision::Allowed { window, .. } => Ok(window),
            QuotaDecision::Denied(reason) => Err(reason.into()),
        }
    }
}

impl From<DenyReason> for GrowthError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::LimitExceeded {
                action,
                used,
                limit,
                window_end,
            } => GrowthError::QuotaExceeded {
                action,
                used,
                limit,
                window_end,
            },
            DenyReason::SubscriptionExpired(at) => GrowthError::SubscriptionExpired(at),
            DenyReason::SubscriptionMismatch(msg) => GrowthError::SubscriptionMismatch(msg),
            DenyReason::TierInconsistent(msg) => GrowthError::TierInconsistent(msg),
        }
    }
}

/// Window of `length_days` containing `now`, stepped from `anchor` in whole lengths.
/// `now` before the anchor falls in the first window. `None` for a zero length.
pub fn derive_window(
    anchor: DateTime<Utc>,
    length_days: u32,
    now: DateTime<Utc>,
) -> Option<QuotaWindow> {
    if length_days == 0 {
        return None;
    }
    let length_ms = i64::from(length_days) * MS_PER_DAY;
    let elapsed_ms = (now - anchor).num_milliseconds();
    let k = elapsed_ms.div_euclid(length_ms).max(0);
    let start = anchor + Duration::milliseconds(k * length_ms);
    Some(QuotaWindow {
        start,
        end: start + Duration::milliseconds(length_ms),
    })
}

/// Tier 0 carries no plan and no dates. Paid tiers must end exactly one plan
/// duration after they start, within `tolerance`.
pub fn check_subscription_consistency<S>(
    store: &S,
    subscription: &Subscription,
    tolerance: Duration,
) -> Result<(), DenyReason>
where
    S: SubscriptionStore + ?Sized,
{
    if subscription.tier_level == 0 {
        if subscription.current_plan_id.is_some()
            || subscription.start_date.is_some()
            || subscription.end_date.is_some()
        {
            return Err(DenyReason::TierInconsistent(format!(
                "tier-0 subscription for user {} carries a plan or dates",
                subscription.user_id
            )));
        }
        return Ok(());
    }

    let (Some(start), Some(end)) = (subscription.start_date, subscription.end_date) else {
        return Err(DenyReason::SubscriptionMismatch(format!(
            "tier-{} subscription for user {} has no start or end date",
            subscription.tier_level, subscription.user_id
        )));
    };
    let Some(plan_id) = subscription.current_plan_id.as_deref() else {
        return Err(DenyReason::SubscriptionMismatch(format!(
            "tier-{} subscription for user {} has no plan",
            subscription.tier_level, subscription.user_id
        )));
    };
    let plan = store
        .plan(plan_id)
        .map_err(|e| DenyReason::SubscriptionMismatch(format!("plan {plan_id} unreadable: {e}")))?
        .ok_or_else(|| DenyReason::SubscriptionMismatch(format!("plan {plan_id} does not exist")))?;

    if plan.tier_level != subscription.tier_level {
        return Err(DenyReason::SubscriptionMismatch(format!(
            "plan {plan_id} is tier {} but subscription is tier {}",
            plan.tier_level, subscription.tier_level
        )));
    }

    let expected_end = start + Duration::days(i64::from(plan.duration_days));
    let drift_ms = (end - expected_end).num_milliseconds().abs();
    if drift_ms > tolerance.num_milliseconds() {
        return Err(DenyReason::SubscriptionMismatch(format!(
            "end date {end} differs from {expected_end} by {}s",
            drift_ms / 1000
        )));
    }
    Ok(())
}

/// Decide whether `user_id` may perform one more `action` right now.
///
/// Does not record the action.
pub fn admit<S>(
    store: &S,
    user_id: &str,
    action: QuotaAction,
    tier: &Tier,
    subscription: &Subscription,
    now: DateTime<Utc>,
    tolerance: Duration,
) -> Result<QuotaDecision, GrowthError>
where
    S: SubscriptionStore + ?Sized,
{
    if let Err(reason) = check_subscription_consistency(store, subscription, tolerance) {
        log::warn!("quota denied for {user_id}: {reason:?}");
        return Ok(QuotaDecision::Denied(reason));
    }

    if let Some(end) = subscription.end_date {
        if now >= end {
            return Ok(QuotaDecision::Denied(DenyReason::SubscriptionExpired(end)));
        }
    }

    let limit = tier.limit_for(action);
    let window = derive_window(subscription.anchor(), limit.time_days, now).ok_or_else(|| {
        GrowthError::TierInconsistent(format!(
            "tier {} has a zero-day {action} window",
            tier.tier_level
        ))
    })?;

    let used = store.count_actions(user_id, action, window.start, window.end)?;
    log::debug!(
        "{user_id} used {used}/{} {action} actions in [{}, {})",
        limit.value,
        window.start,
        window.end
    );

    if used >= limit.value {
        return Ok(QuotaDecision::Denied(DenyReason::LimitExceeded {
            action,
            used,
            limit: limit.value,
            window_end: window.end,
        }));
    }

    Ok(QuotaDecision::Allowed {
        window,
        used,
        limit: limit.value,
    })
}

/// Registering one more child must stay within the tier's children limit.
pub fn admit_new_child(tier: &Tier, existing: u32) -> Result<(), GrowthError> {
    if existing >= tier.children_limit {
        return Err(GrowthError::Forbidden(format!(
            "tier {} allows {} children",
            tier.tier_level, tier.children_limit
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::subscription::{ActionLimit, Plan};
    use crate::store::memory::InMemoryStore;
    use chrono::TimeZone;

    fn tier(level: u8) -> Tier {
        Tier {
            tier_level: level,
            children_limit: 2,
            update_limit: ActionLimit {
                value: 3,
                time_days: 30,
                description: "3 updates per 30 days".to_string(),
            },
            view_limit: ActionLimit {
                value: 10,
                time_days: 7,
                description: "10 views per week".to_string(),
            },
        }
    }

    fn day0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn paid_store() -> (InMemoryStore, Subscription) {
        let store = InMemoryStore::new();
        store
            .put_plan(Plan {
                id: "plan-90".to_string(),
                tier_level: 1,
                duration_days: 90,
            })
            .expect("seed plan");
        let subscription = Subscription {
            user_id: "u-1".to_string(),
            tier_level: 1,
            start_date: Some(day0()),
            end_date: Some(day0() + Duration::days(90)),
            current_plan_id: Some("plan-90".to_string()),
            created_at: day0() - Duration::days(100),
        };
        (store, subscription)
    }

    fn tolerance() -> Duration {
        Duration::seconds(DEFAULT_SUBSCRIPTION_TOLERANCE_SECONDS)
    }

    #[test]
    fn window_steps_from_anchor() {
        let w = derive_window(day0(), 30, day0() + Duration::days(31)).expect("window");
        assert_eq!(w.start, day0() + Duration::days(30));
        assert_eq!(w.end, day0() + Duration::days(60));
        assert!(w.contains(day0() + Duration::days(31)));
        assert!(!w.contains(w.end));

        let boundary = derive_window(day0(), 30, day0() + Duration::days(30)).expect("window");
        assert_eq!(boundary.start, day0() + Duration::days(30));

        let before = derive_window(day0(), 30, day0() - Duration::days(5)).expect("window");
        assert_eq!(before.start, day0());
        assert!(derive_window(day0(), 0, day0()).is_none());
    }

    #[test]
    fn fourth_update_in_window_is_denied_and_next_window_allows() {
        let (store, subscription) = paid_store();
        for hour in [1, 2, 3] {
            store
                .record_action("u-1", QuotaAction::Update, day0() + Duration::hours(hour))
                .expect("record");
        }

        let fourth = admit(
            &store,
            "u-1",
            QuotaAction::Update,
            &tier(1),
            &subscription,
            day0() + Duration::days(10),
            tolerance(),
        )
        .expect("decision");
        assert!(matches!(
            fourth,
            QuotaDecision::Denied(DenyReason::LimitExceeded { used: 3, limit: 3, .. })
        ));

        let later = admit(
            &store,
            "u-1",
            QuotaAction::Update,
            &tier(1),
            &subscription,
            day0() + Duration::days(31),
            tolerance(),
        )
        .expect("decision");
        assert!(later.is_allowed());
    }

    #[test]
    fn tier_zero_with_plan_is_inconsistent() {
        let store = InMemoryStore::new();
        let mut subscription = Subscription::free("u-1", day0());
        subscription.current_plan_id = Some("plan-90".to_string());

        let result = check_subscription_consistency(&store, &subscription, tolerance());
        assert!(matches!(result, Err(DenyReason::TierInconsistent(_))));

        let err = admit(
            &store,
            "u-1",
            QuotaAction::View,
            &tier(0),
            &subscription,
            day0(),
            tolerance(),
        )
        .expect("decision")
        .into_result()
        .expect_err("denied");
        assert!(matches!(err, GrowthError::TierInconsistent(_)));
    }

    #[test]
    fn free_tier_anchors_on_created_at() {
        let store = InMemoryStore::new();
        let subscription = Subscription::free("u-1", day0());
        let decision = admit(
            &store,
            "u-1",
            QuotaAction::View,
            &tier(0),
            &subscription,
            day0() + Duration::days(8),
            tolerance(),
        )
        .expect("decision");
        match decision {
            QuotaDecision::Allowed { window, .. } => {
                assert_eq!(window.start, day0() + Duration::days(7));
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn end_date_drift_beyond_tolerance_is_mismatch() {
        let (store, mut subscription) = paid_store();
        subscription.end_date = Some(day0() + Duration::days(90) + Duration::seconds(200));
        assert!(check_subscription_consistency(&store, &subscription, tolerance()).is_ok());

        subscription.end_date = Some(day0() + Duration::days(90) + Duration::minutes(6));
        assert!(matches!(
            check_subscription_consistency(&store, &subscription, tolerance()),
            Err(DenyReason::SubscriptionMismatch(_))
        ));

        subscription.current_plan_id = Some("missing".to_string());
        assert!(matches!(
            check_subscription_consistency(&store, &subscription, tolerance()),
            Err(DenyReason::SubscriptionMismatch(_))
        ));
    }

    #[test]
    fn expired_subscription_is_denied() {
        let (store, subscription) = paid_store();
        let decision = admit(
            &store,
            "u-1",
            QuotaAction::View,
            &tier(1),
            &subscription,
            day0() + Duration::days(91),
            tolerance(),
        )
        .expect("decision");
        assert!(matches!(
            decision,
            QuotaDecision::Denied(DenyReason::SubscriptionExpired(_))
        ));
    }

    #[test]
    fn children_limit() {
        assert!(admit_new_child(&tier(0), 1).is_ok());
        let err = admit_new_child(&tier(0), 2).expect_err("limit reached");
        assert!(matches!(err, GrowthError::Forbidden(_)));
    }
}
