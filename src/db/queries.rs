use sqlx::{Pool, Sqlite};
use anyhow::Result;
use crate::db::models::{CreateMerchantRequest, Merchant};

pub async fn insert_merchant(pool: &Pool<Sqlite>, req: &CreateMerchantRequest) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO merchants (name, stamps_per_reward, logo_text, reward_description,
         foreground_color, background_color, label_color)
         VALUES (?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(&req.name)
    .bind(req.stamps_per_reward)
    .bind(&req.logo_text)
    .bind(&req.reward_description)
    .bind(&req.foreground_color)
    .bind(&req.background_color)
    .bind(&req.label_color)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_merchant(pool: &Pool<Sqlite>, merchant_id: i64) -> Result<Option<Merchant>> {
    let merchant = sqlx::query_as::<_, Merchant>(
        "SELECT merchant_id, name, stamps_per_reward, logo_text, reward_description,
         foreground_color, background_color, label_color
         FROM merchants WHERE merchant_id = ?"
    )
    .bind(merchant_id)
    .fetch_optional(pool)
    .await?;

    Ok(merchant)
}

pub async fn list_card_ids(pool: &Pool<Sqlite>, merchant_id: i64) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT card_id FROM cards WHERE merchant_id = ? ORDER BY card_id"
    )
    .bind(merchant_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(card_id,)| card_id).collect())
}

/// Wallet object ids are derived deterministically, so overwriting with the
/// same value is harmless.
pub async fn set_wallet_object_id(pool: &Pool<Sqlite>, card_id: i64, object_id: &str) -> Result<()> {
    sqlx::query("UPDATE cards SET wallet_object_id = ? WHERE card_id = ?")
        .bind(object_id)
        .bind(card_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn count_notifications_since(
    pool: &Pool<Sqlite>,
    object_id: &str,
    since_ms: i64,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM wallet_notifications WHERE object_id = ? AND sent_at_ms > ?"
    )
    .bind(object_id)
    .bind(since_ms)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

pub async fn last_notification_for_key(
    pool: &Pool<Sqlite>,
    object_id: &str,
    dedupe_key: &str,
) -> Result<Option<i64>> {
    let row: (Option<i64>,) = sqlx::query_as(
        "SELECT MAX(sent_at_ms) FROM wallet_notifications WHERE object_id = ? AND dedupe_key = ?"
    )
    .bind(object_id)
    .bind(dedupe_key)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

pub async fn insert_notification(
    pool: &Pool<Sqlite>,
    object_id: &str,
    dedupe_key: &str,
    sent_at_ms: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO wallet_notifications (object_id, dedupe_key, sent_at_ms) VALUES (?, ?, ?)"
    )
    .bind(object_id)
    .bind(dedupe_key)
    .bind(sent_at_ms)
    .execute(pool)
    .await?;

    Ok(())
}
