use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::loyalty::card::Card;
use crate::loyalty::ledger;

/// Where a barcode message can come from, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeSource {
    /// Current reward or coupon code, reward first.
    ActiveRedeemCode,
    /// The merchant's own customer reference, when it is non-blank.
    CustomerReference,
    /// Stable per-card reference, always available.
    CardReference,
}

pub const BARCODE_SOURCES: [BarcodeSource; 3] = [
    BarcodeSource::ActiveRedeemCode,
    BarcodeSource::CustomerReference,
    BarcodeSource::CardReference,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeValue {
    pub source: BarcodeSource,
    pub message: String,
}

impl BarcodeSource {
    pub fn resolve(self, card: &Card, now: DateTime<Utc>) -> Option<String> {
        match self {
            Self::ActiveRedeemCode => ledger::pick_for_display(card, now).map(|code| code.code.clone()),
            Self::CustomerReference => {
                let reference = card.customer_id.trim();
                (!reference.is_empty()).then(|| reference.to_string())
            }
            Self::CardReference => Some(format!("CARD-{}", card.card_id)),
        }
    }
}

/// First value produced by [`BARCODE_SOURCES`].
pub fn resolve_barcode(card: &Card, now: DateTime<Utc>) -> BarcodeValue {
    BARCODE_SOURCES
        .iter()
        .find_map(|source| {
            source.resolve(card, now).map(|message| BarcodeValue {
                source: *source,
                message,
            })
        })
        .unwrap_or_else(|| BarcodeValue {
            source: BarcodeSource::CardReference,
            message: format!("CARD-{}", card.card_id),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loyalty::card::{Meta, Purpose};
    use crate::loyalty::ledger::tests::blank_card;
    use crate::loyalty::ledger::{NewCode, RotateStrategy, issue};

    #[test]
    fn redeem_code_beats_customer_reference() {
        let now = Utc::now();
        let mut card = blank_card();
        assert_eq!(
            resolve_barcode(&card, now),
            BarcodeValue {
                source: BarcodeSource::CustomerReference,
                message: "cust-1".to_string()
            }
        );

        issue(
            &mut card,
            NewCode {
                code: "CPN9".to_string(),
                purpose: Purpose::Coupon,
                valid_to: None,
                meta: Meta::default(),
            },
            RotateStrategy::default(),
            now,
        )
        .unwrap();
        let value = resolve_barcode(&card, now);
        assert_eq!(value.source, BarcodeSource::ActiveRedeemCode);
        assert_eq!(value.message, "CPN9");
    }

    #[test]
    fn blank_customer_falls_through_to_card_reference() {
        let mut card = blank_card();
        card.customer_id = "   ".to_string();
        let value = resolve_barcode(&card, Utc::now());
        assert_eq!(value.source, BarcodeSource::CardReference);
        assert_eq!(value.message, "CARD-1");
    }
}
