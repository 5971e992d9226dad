use chrono::{DateTime, Utc};

use crate::loyalty::card::{Card, Meta, Purpose};
use crate::loyalty::events::EventKind;
use crate::loyalty::ledger::{self, LedgerError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub code: String,
    pub purpose: Purpose,
    pub meta: Meta,
    pub delta_rewards: i64,
}

impl Redemption {
    pub fn event_kind(&self) -> EventKind {
        match self.purpose {
            Purpose::Reward => EventKind::RewardRedeemed,
            _ => EventKind::CouponRedeemed,
        }
    }
}

/// Consume a scanned code on `card` and apply its purpose-specific effect.
///
/// Every precondition is checked before anything is touched, so a failure
/// leaves both the code and the reward counter unchanged.
pub fn redeem_on_card(card: &mut Card, code: &str, now: DateTime<Utc>) -> Result<Redemption, LedgerError> {
    let found = ledger::find_active_by_code(card, code, now).ok_or(LedgerError::CodeNotFound)?;
    let delta_rewards = match &found.purpose {
        Purpose::Reward if card.rewards < 1 => return Err(LedgerError::NoRewardsAvailable),
        Purpose::Reward => -1,
        Purpose::Coupon => 0,
        Purpose::Other(other) => return Err(LedgerError::UnsupportedPurpose(other.clone())),
    };

    let consumed = ledger::consume(card, code, now)?;
    if consumed.purpose == Purpose::Reward {
        card.rewards -= 1;
    }

    Ok(Redemption {
        code: consumed.code,
        purpose: consumed.purpose,
        meta: consumed.meta,
        delta_rewards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loyalty::card::{CodeStatus, RedeemCode};
    use crate::loyalty::ledger::tests::blank_card;
    use crate::loyalty::ledger::{NewCode, RotateStrategy, issue};

    fn with_code(code: &str, purpose: Purpose, rewards: u32) -> Card {
        let mut card = blank_card();
        card.rewards = rewards;
        issue(
            &mut card,
            NewCode {
                code: code.to_string(),
                purpose,
                valid_to: None,
                meta: Meta::default(),
            },
            RotateStrategy::default(),
            Utc::now(),
        )
        .unwrap();
        card
    }

    #[test]
    fn reward_redemption_decrements_rewards() {
        let mut card = with_code("RWD1", Purpose::Reward, 2);
        let redemption = redeem_on_card(&mut card, "rwd1", Utc::now()).unwrap();

        assert_eq!(redemption.event_kind(), EventKind::RewardRedeemed);
        assert_eq!(redemption.delta_rewards, -1);
        assert_eq!(card.rewards, 1);
        assert_eq!(card.redeem_codes[0].status, CodeStatus::Redeemed);
    }

    #[test]
    fn coupon_redemption_leaves_counters_alone() {
        let mut card = with_code("CPN1", Purpose::Coupon, 0);
        card.stamps = 4;
        let redemption = redeem_on_card(&mut card, "CPN1", Utc::now()).unwrap();

        assert_eq!(redemption.event_kind(), EventKind::CouponRedeemed);
        assert_eq!((card.stamps, card.rewards), (4, 0));
    }

    #[test]
    fn reward_without_credit_fails_without_partial_mutation() {
        let mut card = with_code("RWD1", Purpose::Reward, 0);
        let before = card.clone();

        let err = redeem_on_card(&mut card, "RWD1", Utc::now()).unwrap_err();
        assert_eq!(err, LedgerError::NoRewardsAvailable);
        assert_eq!(card, before);
        assert_eq!(card.redeem_codes[0].status, CodeStatus::Active);
    }

    #[test]
    fn unknown_purpose_is_rejected() {
        let now = Utc::now();
        let mut card = blank_card();
        card.redeem_codes.push(RedeemCode {
            code: "GIFT1".to_string(),
            purpose: Purpose::Other("giftcard".to_string()),
            status: CodeStatus::Active,
            valid_to: None,
            meta: Meta::default(),
            created_at: now,
            redeemed_at: None,
            expired_at: None,
        });

        let err = redeem_on_card(&mut card, "GIFT1", now).unwrap_err();
        assert_eq!(err, LedgerError::UnsupportedPurpose("giftcard".to_string()));
        assert_eq!(card.redeem_codes[0].status, CodeStatus::Active);
    }

    #[test]
    fn card_without_codes_reports_not_found() {
        let mut card = blank_card();
        let err = redeem_on_card(&mut card, "ANY", Utc::now()).unwrap_err();
        assert_eq!(err, LedgerError::CodeNotFound);
    }
}
