//! Read-modify-write orchestration for stamping, coupon issue and scan
//! redemption.
//!
//! Each operation loads the card, applies the pure domain logic to a copy
//! and commits it with a version check. A lost race is retried from a fresh
//! read, so cooldown and threshold math always see a serialised history of
//! the card.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::loyalty::card::{Card, Meta, Purpose, normalize_code};
use crate::loyalty::codes::CodeGenerator;
use crate::loyalty::events::{DomainEvent, EventKind, EventSink};
use crate::loyalty::ledger::{self, LedgerError, RotateStrategy};
use crate::loyalty::redemption::{self, Redemption};
use crate::loyalty::stamps::{self, StampOutcome};
use crate::loyalty::store::{CardStore, NewCard, StoreError};

const MAX_COMMIT_ATTEMPTS: usize = 5;
pub const MAX_STAMP_DELTA: u32 = 1_000;

#[derive(Debug, Error)]
pub enum LoyaltyError {
    #[error("card not found")]
    CardNotFound,
    #[error("redeem code not found")]
    CodeNotFound,
    #[error("redeem code is invalid, expired or already redeemed")]
    CodeUnusable,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("card was modified concurrently, giving up after {MAX_COMMIT_ATTEMPTS} attempts")]
    Contended,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct CouponRequest {
    pub valid_to: Option<DateTime<Utc>>,
    pub meta: Meta,
    pub strategy: RotateStrategy,
}

#[derive(Clone)]
pub struct LoyaltyService {
    store: Arc<dyn CardStore>,
    events: Arc<dyn EventSink>,
    codes: Arc<dyn CodeGenerator>,
    cooldown: Duration,
}

impl LoyaltyService {
    pub fn new(
        store: Arc<dyn CardStore>,
        events: Arc<dyn EventSink>,
        codes: Arc<dyn CodeGenerator>,
        cooldown: Duration,
    ) -> Self {
        Self {
            store,
            events,
            codes,
            cooldown,
        }
    }

    pub async fn card(&self, card_id: i64) -> Result<Card, LoyaltyError> {
        self.store
            .find_by_id(card_id)
            .await?
            .ok_or(LoyaltyError::CardNotFound)
    }

    /// Enroll a customer; repeated calls return the existing card.
    pub async fn enroll(&self, new_card: NewCard) -> Result<(Card, bool), LoyaltyError> {
        if new_card.customer_id.trim().is_empty() {
            return Err(LedgerError::Invalid("customer id must not be empty".to_string()).into());
        }
        let (card, created) = self.store.insert_or_get(&new_card).await?;
        if created {
            tracing::info!(card_id = card.card_id, merchant_id = card.merchant_id, "Card enrolled");
        }
        Ok((card, created))
    }

    pub async fn stamp(
        &self,
        card_id: i64,
        delta: u32,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(Card, StampOutcome), LoyaltyError> {
        if delta > MAX_STAMP_DELTA {
            return Err(LedgerError::Invalid(format!(
                "stamp delta must not exceed {MAX_STAMP_DELTA}"
            ))
            .into());
        }

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let mut card = self.card(card_id).await?;
            let outcome = match stamps::apply_stamp(&mut card, delta, now, self.cooldown, self.codes.as_ref()) {
                Ok(outcome) => outcome,
                Err(LedgerError::Throttled { retry_after_ms }) => {
                    tracing::debug!(card_id, retry_after_ms, "Stamp throttled");
                    return Err(LedgerError::Throttled { retry_after_ms }.into());
                }
                Err(e) => return Err(e.into()),
            };
            if delta == 0 {
                return Ok((card, outcome));
            }

            let event = DomainEvent {
                merchant_id: card.merchant_id,
                card_id: Some(card.card_id),
                kind: EventKind::StampAdded,
                delta_stamps: i64::from(delta),
                delta_rewards: i64::from(outcome.rewards_issued),
                actor: actor.to_string(),
                payload: json!({
                    "stampsBefore": outcome.stamps_before,
                    "stamps": outcome.stamps,
                    "rewards": outcome.rewards,
                    "issuedCodes": outcome.issued_codes,
                }),
            };

            match self.store.commit(&card, Some(&event)).await {
                Ok(true) => {
                    tracing::info!(
                        card_id,
                        stamps = outcome.stamps,
                        rewards = outcome.rewards,
                        rewards_issued = outcome.rewards_issued,
                        "Stamp applied"
                    );
                    card.version += 1;
                    return Ok((card, outcome));
                }
                Ok(false) => tracing::debug!(card_id, attempt, "Stamp lost a write race, retrying"),
                Err(StoreError::DuplicateCode) => {
                    tracing::debug!(card_id, attempt, "Reward code collided, regenerating")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LoyaltyError::Contended)
    }

    pub async fn issue_coupon(
        &self,
        card_id: i64,
        request: CouponRequest,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(Card, String), LoyaltyError> {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let mut card = self.card(card_id).await?;
            let code = ledger::issue_generated(
                &mut card,
                self.codes.as_ref(),
                Purpose::Coupon,
                request.valid_to,
                request.meta.clone(),
                request.strategy,
                now,
            )?;

            let event = DomainEvent {
                merchant_id: card.merchant_id,
                card_id: Some(card.card_id),
                kind: EventKind::CouponIssued,
                delta_stamps: 0,
                delta_rewards: 0,
                actor: actor.to_string(),
                payload: json!({ "code": code, "validTo": request.valid_to }),
            };

            match self.store.commit(&card, Some(&event)).await {
                Ok(true) => {
                    tracing::info!(card_id, "Coupon issued");
                    card.version += 1;
                    return Ok((card, code));
                }
                Ok(false) | Err(StoreError::DuplicateCode) => {
                    tracing::debug!(card_id, attempt, "Coupon commit retried")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LoyaltyError::Contended)
    }

    /// Redeem a code presented at the counter. Lookup never leaves
    /// `merchant_id`. Exactly one event is recorded per call, success or
    /// failure.
    pub async fn redeem_scanned_code(
        &self,
        merchant_id: i64,
        code: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(Card, Redemption), LoyaltyError> {
        let normalized = normalize_code(code);
        let result = self.try_redeem(merchant_id, &normalized, actor, now).await;

        if let Err(e) = &result {
            let card_id = match e {
                LoyaltyError::CodeNotFound => None,
                _ => self.store.find_by_code(merchant_id, &normalized).await.ok().flatten().map(|c| c.card_id),
            };
            self.record_failure(merchant_id, card_id, &normalized, actor, e).await;
        }
        result
    }

    async fn try_redeem(
        &self,
        merchant_id: i64,
        normalized: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(Card, Redemption), LoyaltyError> {
        if normalized.is_empty() {
            return Err(LedgerError::Invalid("code is required".to_string()).into());
        }

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let mut card = self
                .store
                .find_by_code(merchant_id, normalized)
                .await?
                .ok_or(LoyaltyError::CodeNotFound)?;

            let redemption = match redemption::redeem_on_card(&mut card, normalized, now) {
                Ok(redemption) => redemption,
                Err(LedgerError::CodeNotFound) => return Err(LoyaltyError::CodeUnusable),
                Err(e) => return Err(e.into()),
            };

            let event = DomainEvent {
                merchant_id,
                card_id: Some(card.card_id),
                kind: redemption.event_kind(),
                delta_stamps: 0,
                delta_rewards: redemption.delta_rewards,
                actor: actor.to_string(),
                payload: json!({
                    "code": redemption.code,
                    "purpose": redemption.purpose,
                    "meta": redemption.meta,
                }),
            };

            match self.store.commit(&card, Some(&event)).await {
                Ok(true) => {
                    tracing::info!(
                        card_id = card.card_id,
                        purpose = %redemption.purpose,
                        "Code redeemed"
                    );
                    card.version += 1;
                    return Ok((card, redemption));
                }
                Ok(false) => tracing::debug!(card_id = card.card_id, attempt, "Redeem lost a write race, retrying"),
                Err(e) => return Err(e.into()),
            }
        }
        Err(LoyaltyError::Contended)
    }

    async fn record_failure(
        &self,
        merchant_id: i64,
        card_id: Option<i64>,
        code: &str,
        actor: &str,
        error: &LoyaltyError,
    ) {
        let event = DomainEvent {
            merchant_id,
            card_id,
            kind: EventKind::RedeemFailed,
            delta_stamps: 0,
            delta_rewards: 0,
            actor: actor.to_string(),
            payload: json!({ "code": code, "reason": error.to_string() }),
        };
        if let Err(e) = self.events.append(&event).await {
            tracing::error!(merchant_id, error = %e, "Failed to record redeem failure event");
        }
    }
}
