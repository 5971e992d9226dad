use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    app_state::AppState,
    db::queries,
    error::AppError,
    handlers::actor_or_default,
    loyalty::{
        Card, Meta,
        card::resolve_stamps_per_reward,
        ledger::RotateStrategy,
        service::CouponRequest,
        store::NewCard,
    },
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    pub customer_id: String,
}

#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub status: String,
    pub created: bool,
    pub card: Card,
}

/// POST /api/merchants/{merchant_id}/cards
/// Enrolls a customer; repeated calls return the existing card
pub async fn enroll_card(
    Path(merchant_id): Path<i64>,
    State(state): State<AppState>,
    Json(req): Json<EnrollRequest>,
) -> Result<Json<EnrollResponse>, AppError> {
    let merchant = queries::get_merchant(&state.pool, merchant_id)
        .await?
        .ok_or_else(|| AppError::not_found("merchant"))?;

    let new_card = NewCard {
        merchant_id,
        customer_id: req.customer_id.trim().to_string(),
        stamps_per_reward: resolve_stamps_per_reward(
            merchant.stamps_per_reward,
            state.config.default_stamps_per_reward,
        ),
    };
    let (card, created) = state.loyalty.enroll(new_card).await?;

    Ok(Json(EnrollResponse {
        status: "OK".to_string(),
        created,
        card,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StampRequest {
    pub delta: Option<u32>,
    pub actor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StampResponse {
    pub status: String,
    pub stamps_before: u32,
    pub rewards_issued: u32,
    pub issued_codes: Vec<String>,
    pub card: Card,
}

/// POST /api/cards/{card_id}/stamps
/// Adds stamps (one unless `delta` says otherwise)
pub async fn add_stamps(
    Path(card_id): Path<i64>,
    State(state): State<AppState>,
    Json(req): Json<StampRequest>,
) -> Result<Json<StampResponse>, AppError> {
    let actor = actor_or_default(&req.actor);
    let (card, outcome) = state
        .loyalty
        .stamp(card_id, req.delta.unwrap_or(1), actor, Utc::now())
        .await?;

    Ok(Json(StampResponse {
        status: "OK".to_string(),
        stamps_before: outcome.stamps_before,
        rewards_issued: outcome.rewards_issued,
        issued_codes: outcome.issued_codes,
        card,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCouponRequest {
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub strategy: RotateStrategy,
    pub actor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IssueCouponResponse {
    pub status: String,
    pub code: String,
    pub card: Card,
}

/// POST /api/cards/{card_id}/coupons
/// Issues a coupon code, rotating out the previous one per `strategy`
pub async fn issue_coupon(
    Path(card_id): Path<i64>,
    State(state): State<AppState>,
    Json(req): Json<IssueCouponRequest>,
) -> Result<Json<IssueCouponResponse>, AppError> {
    let now = Utc::now();
    if req.valid_to.is_some_and(|valid_to| valid_to <= now) {
        return Err(AppError::Validation("validTo must be in the future".to_string()));
    }

    let actor = actor_or_default(&req.actor);
    let request = CouponRequest {
        valid_to: req.valid_to,
        meta: req.meta,
        strategy: req.strategy,
    };
    let (card, code) = state.loyalty.issue_coupon(card_id, request, actor, now).await?;

    Ok(Json(IssueCouponResponse {
        status: "OK".to_string(),
        code,
        card,
    }))
}
