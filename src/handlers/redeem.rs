use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    app_state::AppState,
    error::AppError,
    handlers::actor_or_default,
    loyalty::{Card, Meta, Purpose},
};

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    #[serde(default)]
    pub code: String,
    pub actor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    pub status: String,
    pub code: String,
    pub purpose: Purpose,
    pub meta: Meta,
    pub delta_rewards: i64,
    pub card: Card,
}

/// POST /api/merchants/{merchant_id}/redeem
/// Redeems a code scanned at the counter
pub async fn redeem_code(
    Path(merchant_id): Path<i64>,
    State(state): State<AppState>,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>, AppError> {
    let actor = actor_or_default(&req.actor);
    let (card, redemption) = state
        .loyalty
        .redeem_scanned_code(merchant_id, &req.code, actor, Utc::now())
        .await?;

    Ok(Json(RedeemResponse {
        status: "OK".to_string(),
        code: redemption.code,
        purpose: redemption.purpose,
        meta: redemption.meta,
        delta_rewards: redemption.delta_rewards,
        card,
    }))
}
