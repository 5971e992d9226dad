use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::models::Merchant;
use crate::loyalty::{Card, barcode, ledger};
use crate::pass::PassIdentity;

pub const BARCODE_FORMAT: &str = "PKBarcodeFormatQR";
pub const BARCODE_ENCODING: &str = "iso-8859-1";

const DEFAULT_FOREGROUND: (u8, u8, u8) = (255, 255, 255);
const DEFAULT_BACKGROUND: (u8, u8, u8) = (60, 65, 76);

/// `pass.json` as the wallet format defines it (store card style).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassDescriptor {
    pub format_version: u8,
    pub pass_type_identifier: String,
    pub serial_number: String,
    pub team_identifier: String,
    pub organization_name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_text: Option<String>,
    pub foreground_color: String,
    pub background_color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_color: Option<String>,
    pub barcodes: Vec<Barcode>,
    pub store_card: StoreCard,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Barcode {
    pub message: String,
    pub format: &'static str,
    pub message_encoding: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCard {
    pub primary_fields: Vec<Field>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secondary_fields: Vec<Field>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub back_fields: Vec<Field>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Field {
    pub key: &'static str,
    pub label: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(u32),
}

/// Parse `#rrggbb`, `rrggbb` or `rgb(r, g, b)`.
pub fn parse_color(input: &str) -> Option<(u8, u8, u8)> {
    let input = input.trim();
    if let Some(inner) = input
        .strip_prefix("rgb(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let parts: Vec<u8> = inner
            .split(',')
            .map(|part| part.trim().parse::<u8>())
            .collect::<Result<_, _>>()
            .ok()?;
        return match parts.as_slice() {
            [r, g, b] => Some((*r, *g, *b)),
            _ => None,
        };
    }

    let hex = input.strip_prefix('#').unwrap_or(input);
    let bytes = hex::decode(hex).ok()?;
    match bytes.as_slice() {
        [r, g, b] => Some((*r, *g, *b)),
        _ => None,
    }
}

fn rgb(color: Option<&str>, default: (u8, u8, u8)) -> String {
    let (r, g, b) = color.and_then(parse_color).unwrap_or(default);
    format!("rgb({r}, {g}, {b})")
}

/// Same palette as hex, for backends that want `#rrggbb`.
pub fn hex_color(color: Option<&str>) -> String {
    let (r, g, b) = color.and_then(parse_color).unwrap_or(DEFAULT_BACKGROUND);
    format!("#{}", hex::encode([r, g, b]))
}

pub fn serial_number(card: &Card) -> String {
    format!("card-{}", card.card_id)
}

pub fn build_descriptor(
    card: &Card,
    merchant: &Merchant,
    identity: &PassIdentity,
    now: DateTime<Utc>,
) -> PassDescriptor {
    let barcode = barcode::resolve_barcode(card, now);
    let display_code = ledger::pick_for_display(card, now);

    let mut secondary_fields = vec![Field {
        key: "rewards",
        label: "Rewards".to_string(),
        value: FieldValue::Number(card.rewards),
    }];
    if let Some(description) = &merchant.reward_description {
        secondary_fields.push(Field {
            key: "reward",
            label: "Reward".to_string(),
            value: FieldValue::Text(description.clone()),
        });
    }

    let mut back_fields = Vec::new();
    if let Some(code) = display_code {
        back_fields.push(Field {
            key: "code",
            label: format!("Your {} code", code.purpose),
            value: FieldValue::Text(code.code.clone()),
        });
        if let Some(valid_to) = code.valid_to {
            back_fields.push(Field {
                key: "validTo",
                label: "Valid until".to_string(),
                value: FieldValue::Text(valid_to.format("%Y-%m-%d %H:%M UTC").to_string()),
            });
        }
    }

    PassDescriptor {
        format_version: 1,
        pass_type_identifier: identity.pass_type_identifier.clone(),
        serial_number: serial_number(card),
        team_identifier: identity.team_identifier.clone(),
        organization_name: identity.organization_name.clone(),
        description: format!("{} loyalty card", merchant.name),
        logo_text: merchant.logo_text.clone().or_else(|| Some(merchant.name.clone())),
        foreground_color: rgb(merchant.foreground_color.as_deref(), DEFAULT_FOREGROUND),
        background_color: rgb(merchant.background_color.as_deref(), DEFAULT_BACKGROUND),
        label_color: merchant
            .label_color
            .as_deref()
            .and_then(parse_color)
            .map(|(r, g, b)| format!("rgb({r}, {g}, {b})")),
        barcodes: vec![Barcode {
            alt_text: Some(barcode.message.clone()),
            message: barcode.message,
            format: BARCODE_FORMAT,
            message_encoding: BARCODE_ENCODING,
        }],
        store_card: StoreCard {
            primary_fields: vec![Field {
                key: "stamps",
                label: "Stamps".to_string(),
                value: FieldValue::Text(format!("{}/{}", card.stamps, card.threshold())),
            }],
            secondary_fields,
            back_fields,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loyalty::card::{Meta, Purpose};
    use crate::loyalty::ledger::tests::blank_card;
    use crate::loyalty::ledger::{NewCode, RotateStrategy, issue};

    fn merchant() -> Merchant {
        Merchant {
            merchant_id: 7,
            name: "Corner Cafe".to_string(),
            stamps_per_reward: Some(10),
            logo_text: None,
            reward_description: None,
            foreground_color: Some("rgb(1, 2, 3)".to_string()),
            background_color: Some("not-a-color".to_string()),
            label_color: None,
        }
    }

    fn identity() -> PassIdentity {
        PassIdentity {
            pass_type_identifier: "pass.com.example.loyalty".to_string(),
            team_identifier: "TEAM123".to_string(),
            organization_name: "Example".to_string(),
        }
    }

    #[test]
    fn colors_accept_hex_and_rgb() {
        assert_eq!(parse_color("#0a0B0c"), Some((10, 11, 12)));
        assert_eq!(parse_color("ff0000"), Some((255, 0, 0)));
        assert_eq!(parse_color("rgb(1, 2, 3)"), Some((1, 2, 3)));
        assert_eq!(parse_color("rgb(1, 2)"), None);
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(hex_color(Some("rgb(255, 0, 16)")), "#ff0010");
    }

    #[test]
    fn descriptor_encodes_single_barcode_with_active_code() {
        let now = Utc::now();
        let mut card = blank_card();
        card.stamps = 4;
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

        let descriptor = build_descriptor(&card, &merchant(), &identity(), now);
        let json = serde_json::to_value(&descriptor).unwrap();

        assert_eq!(json["formatVersion"], 1);
        assert_eq!(json["serialNumber"], "card-1");
        assert_eq!(json["foregroundColor"], "rgb(1, 2, 3)");
        assert_eq!(json["backgroundColor"], "rgb(60, 65, 76)");
        assert_eq!(json["barcodes"].as_array().unwrap().len(), 1);
        assert_eq!(json["barcodes"][0]["message"], "RWD1");
        assert_eq!(json["barcodes"][0]["messageEncoding"], "iso-8859-1");
        assert_eq!(json["storeCard"]["primaryFields"][0]["value"], "4/10");
        assert_eq!(json["storeCard"]["secondaryFields"][0]["value"], 1);
        assert_eq!(json["storeCard"]["backFields"][0]["value"], "RWD1");
        assert!(json.get("labelColor").is_none());
    }

    #[test]
    fn descriptor_without_codes_omits_back_fields() {
        let descriptor = build_descriptor(&blank_card(), &merchant(), &identity(), Utc::now());
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["barcodes"][0]["message"], "cust-1");
        assert!(json["storeCard"].get("backFields").is_none());
    }
}
