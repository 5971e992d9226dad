use async_trait::async_trait;
use thiserror::Error;

use crate::loyalty::card::Card;
use crate::loyalty::events::DomainEvent;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A code value on the card is already used by another card of the same
    /// merchant. Callers regenerate and retry.
    #[error("redeem code already in use")]
    DuplicateCode,

    #[error("stored data is invalid: {0}")]
    Corrupt(String),

    #[error("storage error")]
    Sql(#[source] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct NewCard {
    pub merchant_id: i64,
    pub customer_id: String,
    pub stamps_per_reward: u32,
}

/// Persistence operations the loyalty services need.
#[async_trait]
pub trait CardStore: Send + Sync {
    async fn find_by_id(&self, card_id: i64) -> Result<Option<Card>, StoreError>;

    /// Card of `merchant_id` that holds `code` (already normalized), in any
    /// status.
    async fn find_by_code(&self, merchant_id: i64, code: &str) -> Result<Option<Card>, StoreError>;

    /// Write `card` (counters, codes, `last_event_at`) and `event` in one
    /// transaction, provided the stored version still equals `card.version`.
    /// Returns `Ok(false)` when another writer got there first.
    async fn commit(&self, card: &Card, event: Option<&DomainEvent>) -> Result<bool, StoreError>;

    /// Create the card for (merchant, customer) unless it already exists.
    /// The flag is `true` when this call created it.
    async fn insert_or_get(&self, new_card: &NewCard) -> Result<(Card, bool), StoreError>;
}
