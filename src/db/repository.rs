use sqlx::{Pool, Sqlite, error::{DatabaseError, ErrorKind}};
use crate::{
    db::models::{CardRow, RedeemCodeRow},
    loyalty::{
        Card,
        events::{DomainEvent, EventSink},
        store::{CardStore, NewCard, StoreError},
    },
};

const CARD_COLUMNS: &str = "c.card_id, c.merchant_id, c.customer_id, c.stamps, c.rewards,
    c.stamps_per_reward, c.last_event_at_ms, c.wallet_object_id, c.version";

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::UniqueViolation) => Self::DuplicateCode,
            _ => Self::Sql(error),
        }
    }
}

fn corrupt(error: anyhow::Error) -> StoreError {
    StoreError::Corrupt(format!("{error:#}"))
}

/// Database implementation of CardStore and EventSink
#[derive(Clone)]
pub struct SqliteCardStore {
    pool: Pool<Sqlite>,
}

impl SqliteCardStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    async fn load_codes(&self, card_id: i64) -> Result<Vec<RedeemCodeRow>, StoreError> {
        let rows = sqlx::query_as::<_, RedeemCodeRow>(
            "SELECT * FROM redeem_codes WHERE card_id = ? ORDER BY position"
        )
        .bind(card_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn hydrate(&self, row: Option<CardRow>) -> Result<Option<Card>, StoreError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let codes = self.load_codes(row.card_id).await?;
        row.into_card(codes).map(Some).map_err(corrupt)
    }
}

async fn insert_event<'e, E>(executor: E, event: &DomainEvent) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO card_events (merchant_id, card_id, event_type, delta_stamps, delta_rewards, actor, payload)
         VALUES (?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(event.merchant_id)
    .bind(event.card_id)
    .bind(event.kind.as_str())
    .bind(event.delta_stamps)
    .bind(event.delta_rewards)
    .bind(&event.actor)
    .bind(event.payload.to_string())
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl CardStore for SqliteCardStore {
    async fn find_by_id(&self, card_id: i64) -> Result<Option<Card>, StoreError> {
        let row = sqlx::query_as::<_, CardRow>(&format!(
            "SELECT {CARD_COLUMNS} FROM cards c WHERE c.card_id = ?"
        ))
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate(row).await
    }

    async fn find_by_code(&self, merchant_id: i64, code: &str) -> Result<Option<Card>, StoreError> {
        let row = sqlx::query_as::<_, CardRow>(&format!(
            "SELECT {CARD_COLUMNS} FROM cards c
             JOIN redeem_codes r ON r.card_id = c.card_id
             WHERE r.merchant_id = ? AND c.merchant_id = ? AND r.code = ?"
        ))
        .bind(merchant_id)
        .bind(merchant_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate(row).await
    }

    async fn commit(&self, card: &Card, event: Option<&DomainEvent>) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE cards SET stamps = ?, rewards = ?, stamps_per_reward = ?, last_event_at_ms = ?,
             version = version + 1
             WHERE card_id = ? AND version = ?"
        )
        .bind(i64::from(card.stamps))
        .bind(i64::from(card.rewards))
        .bind(i64::from(card.stamps_per_reward))
        .bind(card.last_event_at.map(|t| t.timestamp_millis()))
        .bind(card.card_id)
        .bind(card.version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls it back.
            return Ok(false);
        }

        for (position, code) in card.redeem_codes.iter().enumerate() {
            let row = RedeemCodeRow::from_code(card, position, code).map_err(corrupt)?;
            // The conflict target is merchant-wide; the WHERE clause keeps a
            // value owned by another card from being taken over.
            let written = sqlx::query(
                "INSERT INTO redeem_codes (merchant_id, code, card_id, position, purpose, status,
                 valid_to_ms, meta, created_at_ms, redeemed_at_ms, expired_at_ms)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(merchant_id, code) DO UPDATE SET
                    position = excluded.position,
                    status = excluded.status,
                    valid_to_ms = excluded.valid_to_ms,
                    meta = excluded.meta,
                    redeemed_at_ms = excluded.redeemed_at_ms,
                    expired_at_ms = excluded.expired_at_ms
                 WHERE redeem_codes.card_id = excluded.card_id"
            )
            .bind(row.merchant_id)
            .bind(&row.code)
            .bind(row.card_id)
            .bind(row.position)
            .bind(&row.purpose)
            .bind(&row.status)
            .bind(row.valid_to_ms)
            .bind(&row.meta)
            .bind(row.created_at_ms)
            .bind(row.redeemed_at_ms)
            .bind(row.expired_at_ms)
            .execute(&mut *tx)
            .await?;

            if written.rows_affected() == 0 {
                return Err(StoreError::DuplicateCode);
            }
        }

        if let Some(event) = event {
            insert_event(&mut *tx, event).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn insert_or_get(&self, new_card: &NewCard) -> Result<(Card, bool), StoreError> {
        let inserted = sqlx::query(
            "INSERT INTO cards (merchant_id, customer_id, stamps_per_reward) VALUES (?, ?, ?)
             ON CONFLICT(merchant_id, customer_id) DO NOTHING"
        )
        .bind(new_card.merchant_id)
        .bind(&new_card.customer_id)
        .bind(i64::from(new_card.stamps_per_reward))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, CardRow>(&format!(
            "SELECT {CARD_COLUMNS} FROM cards c WHERE c.merchant_id = ? AND c.customer_id = ?"
        ))
        .bind(new_card.merchant_id)
        .bind(&new_card.customer_id)
        .fetch_optional(&self.pool)
        .await?;

        let card = self
            .hydrate(row)
            .await?
            .ok_or_else(|| StoreError::Corrupt("card vanished after insert".to_string()))?;
        Ok((card, inserted.rows_affected() > 0))
    }
}

#[async_trait::async_trait]
impl EventSink for SqliteCardStore {
    async fn append(&self, event: &DomainEvent) -> Result<(), StoreError> {
        insert_event(&self.pool, event).await
    }
}
