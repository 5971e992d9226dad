use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    app_state::AppState,
    db::queries,
    error::AppError,
    wallet::{
        BatchReport, SyncOutcome,
        notify::{self, GateDecision},
    },
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCardResponse {
    pub status: String,
    pub object_id: String,
    pub outcome: SyncOutcome,
}

/// POST /api/cards/{card_id}/wallet
/// Ensures the merchant's wallet class and this card's wallet object
pub async fn sync_card(
    Path(card_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<SyncCardResponse>, AppError> {
    let card = state.loyalty.card(card_id).await?;
    let merchant = queries::get_merchant(&state.pool, card.merchant_id)
        .await?
        .ok_or_else(|| AppError::not_found("merchant"))?;

    let (object_id, outcome) = state.wallet.sync_card(&merchant, &card, Utc::now()).await?;
    if card.wallet_object_id.as_deref() != Some(object_id.as_str()) {
        queries::set_wallet_object_id(&state.pool, card.card_id, &object_id).await?;
    }

    Ok(Json(SyncCardResponse {
        status: "OK".to_string(),
        object_id,
        outcome,
    }))
}

#[derive(Debug, Serialize)]
pub struct SyncMerchantResponse {
    pub status: String,
    pub total: u32,
    #[serde(flatten)]
    pub report: BatchReport,
}

/// POST /api/merchants/{merchant_id}/wallet/sync
/// Syncs every card of a merchant; one failing card does not stop the rest
pub async fn sync_merchant(
    Path(merchant_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<SyncMerchantResponse>, AppError> {
    let merchant = queries::get_merchant(&state.pool, merchant_id)
        .await?
        .ok_or_else(|| AppError::not_found("merchant"))?;

    let mut report = BatchReport::default();
    let mut cards = Vec::new();
    for card_id in queries::list_card_ids(&state.pool, merchant_id).await? {
        match state.loyalty.card(card_id).await {
            Ok(card) => cards.push(card),
            Err(e) => {
                tracing::error!(card_id, error = %e, "Failed to load card for wallet sync");
                report.record_failure(card_id, e.to_string());
            }
        }
    }

    report.merge(state.wallet.sync_cards(&merchant, &cards, Utc::now()).await);

    for card in cards.iter().filter(|c| !report.has_failed(c.card_id)) {
        let object_id = state.wallet.ids().object_id(card.card_id);
        if card.wallet_object_id.as_deref() == Some(object_id.as_str()) {
            continue;
        }
        if let Err(e) = queries::set_wallet_object_id(&state.pool, card.card_id, &object_id).await {
            tracing::error!(card_id = card.card_id, error = %e, "Failed to store wallet object id");
        }
    }

    tracing::info!(
        merchant_id,
        succeeded = report.succeeded,
        failed = report.failed,
        "Wallet batch sync finished"
    );

    Ok(Json(SyncMerchantResponse {
        status: "OK".to_string(),
        total: report.total(),
        report,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCheckRequest {
    #[serde(default)]
    pub dedupe_key: String,
}

#[derive(Debug, Serialize)]
pub struct NotificationCheckResponse {
    pub status: String,
    pub allowed: bool,
    pub decision: GateDecision,
}

/// POST /api/wallet/objects/{object_id}/notifications/check
/// Decides whether a campaign push may go out, recording it when allowed
pub async fn check_notification(
    Path(object_id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<NotificationCheckRequest>,
) -> Result<Json<NotificationCheckResponse>, AppError> {
    let dedupe_key = req.dedupe_key.trim();
    if dedupe_key.is_empty() {
        return Err(AppError::Validation("dedupeKey is required".to_string()));
    }

    let decision = notify::check_and_record(
        &state.pool,
        &state.notifications,
        &object_id,
        dedupe_key,
        Utc::now(),
    )
    .await?;

    Ok(Json(NotificationCheckResponse {
        status: "OK".to_string(),
        allowed: decision.is_allowed(),
        decision,
    }))
}
