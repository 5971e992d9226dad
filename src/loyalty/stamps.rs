//! Stamp accumulation and threshold-based reward issuance.
//!
//! Crossing semantics: every full threshold crossed is converted into one
//! reward and its stamps are taken off the running count, so the card shows
//! progress towards the *next* reward. A card at 9/10 that receives one stamp
//! ends at 0 stamps and 1 reward; the cumulative lifetime total is not kept on
//! the card.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::loyalty::card::{Card, Meta, Purpose};
use crate::loyalty::codes::CodeGenerator;
use crate::loyalty::ledger::{self, LedgerError, RotateStrategy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampOutcome {
    pub stamps_before: u32,
    pub stamps: u32,
    pub rewards: u32,
    pub rewards_issued: u32,
    pub issued_codes: Vec<String>,
}

/// Number of reward thresholds crossed when going from `stamps` to
/// `stamps + delta`.
pub fn reward_crossings(stamps: u32, delta: u32, threshold: u32) -> u32 {
    let threshold = u64::from(threshold.max(1));
    let before = u64::from(stamps) / threshold;
    let after = (u64::from(stamps) + u64::from(delta)) / threshold;
    // `after - before` never exceeds `delta`, which fits in u32.
    u32::try_from(after - before).unwrap_or(u32::MAX)
}

/// Milliseconds left before the card accepts another stamp, if any.
pub fn remaining_cooldown(
    last_event_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> Option<u64> {
    let last = last_event_at?;
    let cooldown_ms = u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX);
    // A clock that went backwards counts as zero elapsed time.
    let elapsed_ms = u64::try_from((now - last).num_milliseconds()).unwrap_or(0);
    (elapsed_ms < cooldown_ms).then(|| cooldown_ms - elapsed_ms)
}

/// Apply `delta` stamps to `card`.
///
/// The card is only modified when the whole operation succeeds; a throttled
/// or failed call leaves it exactly as it was, `last_event_at` included.
/// A zero delta is still subject to the cooldown but changes nothing.
pub fn apply_stamp(
    card: &mut Card,
    delta: u32,
    now: DateTime<Utc>,
    cooldown: Duration,
    generator: &dyn CodeGenerator,
) -> Result<StampOutcome, LedgerError> {
    if let Some(retry_after_ms) = remaining_cooldown(card.last_event_at, now, cooldown) {
        return Err(LedgerError::Throttled { retry_after_ms });
    }
    if delta == 0 {
        return Ok(StampOutcome {
            stamps_before: card.stamps,
            stamps: card.stamps,
            rewards: card.rewards,
            rewards_issued: 0,
            issued_codes: Vec::new(),
        });
    }

    let threshold = card.threshold();
    let crossings = reward_crossings(card.stamps, delta, threshold);

    let mut next = card.clone();
    let total = u64::from(card.stamps) + u64::from(delta);
    let remaining = total - u64::from(crossings) * u64::from(threshold);
    next.stamps = u32::try_from(remaining)
        .map_err(|_| LedgerError::Invalid("stamp count overflow".to_string()))?;
    next.rewards = card
        .rewards
        .checked_add(crossings)
        .ok_or_else(|| LedgerError::Invalid("reward count overflow".to_string()))?;

    let mut issued_codes = Vec::with_capacity(crossings as usize);
    for _ in 0..crossings {
        // Each crossing supersedes whatever reward code was active before.
        let code = ledger::issue_generated(
            &mut next,
            generator,
            Purpose::Reward,
            None,
            Meta::default(),
            RotateStrategy::ExpireAndIssue,
            now,
        )?;
        issued_codes.push(code);
    }
    next.last_event_at = Some(now);

    let outcome = StampOutcome {
        stamps_before: card.stamps,
        stamps: next.stamps,
        rewards: next.rewards,
        rewards_issued: crossings,
        issued_codes,
    };
    *card = next;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loyalty::card::CodeStatus;
    use crate::loyalty::codes::testing::SequenceCodes;
    use crate::loyalty::ledger::tests::blank_card;
    use crate::loyalty::ledger::{NewCode, issue};

    const COOLDOWN: Duration = Duration::from_millis(60_000);

    fn active_rewards(card: &Card) -> Vec<&str> {
        card.redeem_codes
            .iter()
            .filter(|c| c.purpose == Purpose::Reward && c.status == CodeStatus::Active)
            .map(|c| c.code.as_str())
            .collect()
    }

    #[test]
    fn crossing_count_matches_floor_difference() {
        for threshold in 1..=12u32 {
            for stamps in 0..30u32 {
                for delta in 0..30u32 {
                    let expected = (stamps + delta) / threshold - stamps / threshold;
                    assert_eq!(reward_crossings(stamps, delta, threshold), expected);
                }
            }
        }
    }

    #[test]
    fn ninth_to_tenth_stamp_issues_reward_and_resets_progress() {
        let now = Utc::now();
        let mut card = blank_card();
        card.stamps = 9;
        issue(
            &mut card,
            NewCode {
                code: "OLDREWARD".to_string(),
                purpose: Purpose::Reward,
                valid_to: None,
                meta: Meta::default(),
            },
            RotateStrategy::default(),
            now,
        )
        .unwrap();

        let outcome = apply_stamp(&mut card, 1, now, COOLDOWN, &SequenceCodes::new("RW")).unwrap();

        assert_eq!(outcome.rewards_issued, 1);
        assert_eq!(card.stamps, 0);
        assert_eq!(card.rewards, 1);
        assert_eq!(active_rewards(&card), vec!["RW1"]);
        assert_eq!(card.redeem_codes[0].status, CodeStatus::Expired);
        assert_eq!(card.last_event_at, Some(now));
    }

    #[test]
    fn progress_keeps_remainder_not_lifetime_total() {
        let now = Utc::now();
        let mut card = blank_card();
        card.stamps = 8;

        apply_stamp(&mut card, 5, now, COOLDOWN, &SequenceCodes::new("RW")).unwrap();

        // Remainder semantics give 3; a cumulative counter would show 13.
        assert_eq!(card.stamps, 3);
        assert_ne!(card.stamps, 13);
        assert_eq!(card.rewards, 1);
    }

    #[test]
    fn large_delta_issues_one_code_per_crossing_and_keeps_one_active() {
        let now = Utc::now();
        let mut card = blank_card();
        card.stamps = 4;
        card.stamps_per_reward = 5;

        let outcome = apply_stamp(&mut card, 12, now, COOLDOWN, &SequenceCodes::new("RW")).unwrap();

        // 4 + 12 = 16 -> floor(16/5) - floor(4/5) = 3
        assert_eq!(outcome.rewards_issued, 3);
        assert_eq!(outcome.issued_codes, vec!["RW1", "RW2", "RW3"]);
        assert_eq!(card.stamps, 1);
        assert_eq!(card.rewards, 3);
        assert_eq!(active_rewards(&card), vec!["RW3"]);
        assert_eq!(card.redeem_codes.len(), 3);
    }

    #[test]
    fn second_stamp_inside_cooldown_is_throttled() {
        let t0 = Utc::now();
        let mut card = blank_card();
        let codes = SequenceCodes::new("RW");

        apply_stamp(&mut card, 1, t0, COOLDOWN, &codes).unwrap();

        let before = card.clone();
        let err = apply_stamp(&mut card, 1, t0 + chrono::Duration::seconds(30), COOLDOWN, &codes).unwrap_err();
        assert_eq!(err, LedgerError::Throttled { retry_after_ms: 30_000 });
        assert_eq!(card, before);

        apply_stamp(&mut card, 1, t0 + chrono::Duration::seconds(61), COOLDOWN, &codes).unwrap();
        assert_eq!(card.stamps, 2);
        assert_eq!(card.last_event_at, Some(t0 + chrono::Duration::seconds(61)));
    }

    #[test]
    fn zero_delta_changes_nothing() {
        let now = Utc::now();
        let mut card = blank_card();
        card.stamps = 5;
        card.rewards = 1;
        issue(
            &mut card,
            NewCode {
                code: "RWD1".to_string(),
                purpose: Purpose::Reward,
                valid_to: None,
                meta: Meta::default(),
            },
            RotateStrategy::default(),
            now,
        )
        .unwrap();
        let before = card.clone();

        let outcome = apply_stamp(&mut card, 0, now, COOLDOWN, &SequenceCodes::new("RW")).unwrap();

        assert_eq!(outcome.rewards_issued, 0);
        assert_eq!((outcome.stamps_before, outcome.stamps, outcome.rewards), (5, 5, 1));
        assert!(outcome.issued_codes.is_empty());
        assert_eq!(card, before);
    }

    #[test]
    fn zero_delta_still_respects_cooldown() {
        let t0 = Utc::now();
        let mut card = blank_card();
        card.last_event_at = Some(t0);

        let err = apply_stamp(&mut card, 0, t0 + chrono::Duration::seconds(10), COOLDOWN, &SequenceCodes::new("RW"))
            .unwrap_err();
        assert_eq!(err, LedgerError::Throttled { retry_after_ms: 50_000 });
        assert_eq!(card.last_event_at, Some(t0));
    }

    #[test]
    fn zero_threshold_falls_back_to_default() {
        let now = Utc::now();
        let mut card = blank_card();
        card.stamps_per_reward = 0;
        card.stamps = 9;
        let outcome = apply_stamp(&mut card, 1, now, COOLDOWN, &SequenceCodes::new("RW")).unwrap();
        assert_eq!(outcome.rewards_issued, 1);
    }
}
