use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use chrono::Utc;

use crate::{
    app_state::AppState,
    db::queries,
    error::AppError,
    pass::descriptor::serial_number,
};

pub const PKPASS_CONTENT_TYPE: &str = "application/vnd.apple.pkpass";

/// GET /api/cards/{card_id}/pass
/// Returns the signed pass archive, or an error; never a partial archive
pub async fn download_pass(
    Path(card_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let card = state.loyalty.card(card_id).await?;
    let merchant = queries::get_merchant(&state.pool, card.merchant_id)
        .await?
        .ok_or_else(|| AppError::not_found("merchant"))?;

    let archive = state.passes.build(&card, &merchant, Utc::now()).await?;

    let disposition = format!("attachment; filename=\"{}.pkpass\"", serial_number(&card));
    Ok((
        [
            (header::CONTENT_TYPE, PKPASS_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive,
    ))
}
