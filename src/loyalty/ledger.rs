//! Redeem code ledger.
//!
//! Keeps the list of codes attached to a card and enforces that at most one
//! code per purpose is `active` at any time. All functions operate on an
//! in-memory [`Card`]; persisting the result is the caller's job.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::loyalty::card::{Card, CodeStatus, Meta, Purpose, RedeemCode, normalize_code};
use crate::loyalty::codes::CodeGenerator;

/// How many fresh values to draw before giving up on a collision streak.
const MAX_GENERATION_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("an active {0} code already exists")]
    ActiveCodeExists(Purpose),
    #[error("redeem code not found")]
    CodeNotFound,
    #[error("redeem code already present on card")]
    DuplicateCode,
    #[error("no rewards available")]
    NoRewardsAvailable,
    #[error("unsupported redeem code purpose: {0}")]
    UnsupportedPurpose(String),
    #[error("card is cooling down, retry in {retry_after_ms} ms")]
    Throttled { retry_after_ms: u64 },
    #[error("{0}")]
    Invalid(String),
}

/// What to do when a code of the same purpose is already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotateStrategy {
    Reject,
    #[default]
    ExpireAndIssue,
}

#[derive(Debug, Clone)]
pub struct NewCode {
    pub code: String,
    pub purpose: Purpose,
    pub valid_to: Option<DateTime<Utc>>,
    pub meta: Meta,
}

/// Result of a successful [`consume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumed {
    pub code: String,
    pub purpose: Purpose,
    pub meta: Meta,
}

/// Append a new active code to the card, rotating out the current active code
/// of the same purpose according to `strategy`.
pub fn issue(
    card: &mut Card,
    new_code: NewCode,
    strategy: RotateStrategy,
    now: DateTime<Utc>,
) -> Result<&RedeemCode, LedgerError> {
    if let Purpose::Other(other) = &new_code.purpose {
        return Err(LedgerError::Invalid(format!(
            "cannot issue code with purpose `{other}`"
        )));
    }

    let code = normalize_code(&new_code.code);
    if code.is_empty() {
        return Err(LedgerError::Invalid("redeem code must not be empty".to_string()));
    }
    if card.redeem_codes.iter().any(|existing| existing.matches(&code)) {
        return Err(LedgerError::DuplicateCode);
    }

    // An active code that already ran past its expiry is dead weight and is
    // rotated out even under `Reject`.
    let blocking = card
        .redeem_codes
        .iter()
        .any(|existing| existing.purpose == new_code.purpose && existing.is_usable(now));
    if blocking && strategy == RotateStrategy::Reject {
        return Err(LedgerError::ActiveCodeExists(new_code.purpose));
    }

    for existing in card
        .redeem_codes
        .iter_mut()
        .filter(|existing| existing.purpose == new_code.purpose)
    {
        if existing.status == CodeStatus::Active {
            existing.status = CodeStatus::Expired;
            existing.expired_at = Some(now);
        }
    }

    card.redeem_codes.push(RedeemCode {
        code,
        purpose: new_code.purpose,
        status: CodeStatus::Active,
        valid_to: new_code.valid_to,
        meta: new_code.meta,
        created_at: now,
        redeemed_at: None,
        expired_at: None,
    });

    Ok(&card.redeem_codes[card.redeem_codes.len() - 1])
}

/// Issue a code whose value is drawn from `generator`, redrawing when the
/// value is already present on the card.
pub fn issue_generated(
    card: &mut Card,
    generator: &dyn CodeGenerator,
    purpose: Purpose,
    valid_to: Option<DateTime<Utc>>,
    meta: Meta,
    strategy: RotateStrategy,
    now: DateTime<Utc>,
) -> Result<String, LedgerError> {
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let new_code = NewCode {
            code: generator.generate(),
            purpose: purpose.clone(),
            valid_to,
            meta: meta.clone(),
        };
        match issue(card, new_code, strategy, now) {
            Ok(issued) => return Ok(issued.code.clone()),
            Err(LedgerError::DuplicateCode) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(LedgerError::Invalid(
        "could not generate a unique redeem code".to_string(),
    ))
}

/// Usable code with this value, if any. Lookup tolerates case and separator
/// differences in `code`.
pub fn find_active_by_code<'a>(
    card: &'a Card,
    code: &str,
    now: DateTime<Utc>,
) -> Option<&'a RedeemCode> {
    let normalized = normalize_code(code);
    card.redeem_codes
        .iter()
        .rev()
        .find(|candidate| candidate.matches(&normalized) && candidate.is_usable(now))
}

/// Most recently issued usable code of `purpose`.
pub fn find_active_by_purpose<'a>(
    card: &'a Card,
    purpose: &Purpose,
    now: DateTime<Utc>,
) -> Option<&'a RedeemCode> {
    card.redeem_codes
        .iter()
        .rev()
        .find(|candidate| candidate.purpose == *purpose && candidate.is_usable(now))
}

/// Code a scannable barcode should encode: rewards win over coupons.
pub fn pick_for_display(card: &Card, now: DateTime<Utc>) -> Option<&RedeemCode> {
    [Purpose::Reward, Purpose::Coupon]
        .iter()
        .find_map(|purpose| find_active_by_purpose(card, purpose, now))
}

/// Mark the usable code matching `code` as redeemed and hand back what the
/// caller needs to apply the purpose-specific effect.
pub fn consume(card: &mut Card, code: &str, now: DateTime<Utc>) -> Result<Consumed, LedgerError> {
    let normalized = normalize_code(code);
    let target = card
        .redeem_codes
        .iter_mut()
        .rev()
        .find(|candidate| candidate.matches(&normalized) && candidate.is_usable(now))
        .ok_or(LedgerError::CodeNotFound)?;

    target.status = CodeStatus::Redeemed;
    target.redeemed_at = Some(now);

    Ok(Consumed {
        code: target.code.clone(),
        purpose: target.purpose.clone(),
        meta: target.meta.clone(),
    })
}

/// Expire an active code. Returns `false` when the code is unknown or no
/// longer active; redeemed codes are never overwritten.
pub fn expire(card: &mut Card, code: &str, now: DateTime<Utc>) -> bool {
    let normalized = normalize_code(code);
    match card
        .redeem_codes
        .iter_mut()
        .find(|candidate| candidate.matches(&normalized) && candidate.status == CodeStatus::Active)
    {
        Some(target) => {
            target.status = CodeStatus::Expired;
            target.expired_at = Some(now);
            true
        }
        None => false,
    }
}
