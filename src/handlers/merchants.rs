use axum::{extract::State, Json};
use serde::Serialize;

use crate::{
    app_state::AppState,
    db::{models::{CreateMerchantRequest, Merchant}, queries},
    error::AppError,
};

#[derive(Debug, Serialize)]
pub struct CreateMerchantResponse {
    pub status: String,
    pub merchant: Merchant,
}

/// POST /api/merchants
/// Creates a merchant together with its card template
pub async fn create_merchant(
    State(state): State<AppState>,
    Json(req): Json<CreateMerchantRequest>,
) -> Result<Json<CreateMerchantResponse>, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("merchant name must not be empty".to_string()));
    }
    if req.stamps_per_reward.is_some_and(|n| n <= 0 || n > i64::from(u32::MAX)) {
        return Err(AppError::Validation("stamps per reward must be a positive integer".to_string()));
    }

    let merchant_id = queries::insert_merchant(&state.pool, &req).await?;
    let merchant = queries::get_merchant(&state.pool, merchant_id)
        .await?
        .ok_or(AppError::Internal)?;

    tracing::info!(merchant_id, name = %merchant.name, "Merchant created");

    Ok(Json(CreateMerchantResponse {
        status: "OK".to_string(),
        merchant,
    }))
}
