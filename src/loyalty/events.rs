use async_trait::async_trait;
use serde::Serialize;

use crate::loyalty::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    StampAdded,
    CouponIssued,
    RewardRedeemed,
    CouponRedeemed,
    RedeemFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StampAdded => "STAMP_ADDED",
            Self::CouponIssued => "COUPON_ISSUED",
            Self::RewardRedeemed => "REWARD_REDEEMED",
            Self::CouponRedeemed => "COUPON_REDEEMED",
            Self::RedeemFailed => "REDEEM_FAILED",
        }
    }
}

/// Append-only audit record. Dashboards aggregate over these; nothing in
/// this service reads them back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub merchant_id: i64,
    pub card_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub delta_stamps: i64,
    pub delta_rewards: i64,
    pub actor: String,
    pub payload: serde_json::Value,
}

/// Sink for events that are not written as part of a card commit
/// (failed attempts, mostly).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn append(&self, event: &DomainEvent) -> Result<(), StoreError>;
}
