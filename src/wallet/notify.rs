//! Send gate consulted before each campaign push to a wallet object.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{Pool, Sqlite};

use crate::db::queries;

/// Width of the rolling quota window.
pub const QUOTA_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy)]
pub struct NotificationPolicy {
    pub quota_per_day: u32,
    pub dedupe_window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateDecision {
    Allowed,
    Duplicate,
    QuotaExceeded,
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Pure decision over what has already been sent. Duplicates win over the
/// quota so callers can tell a retried push apart from a noisy campaign.
pub fn decide(
    policy: &NotificationPolicy,
    sent_in_window: i64,
    last_for_key: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> GateDecision {
    if let Some(last) = last_for_key {
        if now - last < policy.dedupe_window {
            return GateDecision::Duplicate;
        }
    }
    if sent_in_window >= i64::from(policy.quota_per_day) {
        return GateDecision::QuotaExceeded;
    }
    GateDecision::Allowed
}

/// Read the counters for `object_id`, decide, and record the send when it is
/// allowed. Counters are per object; two concurrent checks for the same
/// object may both pass.
pub async fn check_and_record(
    pool: &Pool<Sqlite>,
    policy: &NotificationPolicy,
    object_id: &str,
    dedupe_key: &str,
    now: DateTime<Utc>,
) -> Result<GateDecision> {
    let since_ms = (now - Duration::hours(QUOTA_WINDOW_HOURS)).timestamp_millis();
    let sent = queries::count_notifications_since(pool, object_id, since_ms).await?;
    let last = queries::last_notification_for_key(pool, object_id, dedupe_key)
        .await?
        .and_then(DateTime::from_timestamp_millis);

    let decision = decide(policy, sent, last, now);
    if decision.is_allowed() {
        queries::insert_notification(pool, object_id, dedupe_key, now.timestamp_millis()).await?;
    } else {
        tracing::debug!(object_id, dedupe_key, ?decision, "Notification suppressed");
    }
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn policy() -> NotificationPolicy {
        NotificationPolicy {
            quota_per_day: 3,
            dedupe_window: Duration::hours(6),
        }
    }

    #[test]
    fn duplicate_is_reported_before_quota() {
        let now = Utc::now();
        let recent = Some(now - Duration::hours(1));
        assert_eq!(decide(&policy(), 5, recent, now), GateDecision::Duplicate);
        assert_eq!(decide(&policy(), 5, None, now), GateDecision::QuotaExceeded);
        assert_eq!(
            decide(&policy(), 2, Some(now - Duration::hours(7)), now),
            GateDecision::Allowed
        );
    }

    #[tokio::test]
    async fn same_key_inside_window_is_suppressed() {
        let pool = test_pool().await;
        let now = Utc::now();

        let first = check_and_record(&pool, &policy(), "obj-1", "spring-promo", now).await.unwrap();
        let second = check_and_record(&pool, &policy(), "obj-1", "spring-promo", now + Duration::minutes(5))
            .await
            .unwrap();
        let later = check_and_record(&pool, &policy(), "obj-1", "spring-promo", now + Duration::hours(7))
            .await
            .unwrap();

        assert_eq!(first, GateDecision::Allowed);
        assert_eq!(second, GateDecision::Duplicate);
        assert_eq!(later, GateDecision::Allowed);
    }

    #[tokio::test]
    async fn quota_rolls_over_after_a_day_and_is_per_object() {
        let pool = test_pool().await;
        let now = Utc::now();

        for (i, key) in ["a", "b", "c"].iter().enumerate() {
            let at = now + Duration::minutes(i as i64);
            assert!(check_and_record(&pool, &policy(), "obj-1", key, at).await.unwrap().is_allowed());
        }
        let fourth = check_and_record(&pool, &policy(), "obj-1", "d", now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(fourth, GateDecision::QuotaExceeded);

        let other = check_and_record(&pool, &policy(), "obj-2", "d", now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(other, GateDecision::Allowed);

        let next_day = check_and_record(&pool, &policy(), "obj-1", "d", now + Duration::hours(25))
            .await
            .unwrap();
        assert_eq!(next_day, GateDecision::Allowed);
    }
}
