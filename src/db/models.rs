use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::loyalty::card::{Card, Meta, Purpose, RedeemCode};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Merchant {
    pub merchant_id: i64,
    pub name: String,
    pub stamps_per_reward: Option<i64>,
    pub logo_text: Option<String>,
    pub reward_description: Option<String>,
    pub foreground_color: Option<String>,
    pub background_color: Option<String>,
    pub label_color: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CardRow {
    pub card_id: i64,
    pub merchant_id: i64,
    pub customer_id: String,
    pub stamps: i64,
    pub rewards: i64,
    pub stamps_per_reward: i64,
    pub last_event_at_ms: Option<i64>,
    pub wallet_object_id: Option<String>,
    pub version: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RedeemCodeRow {
    pub merchant_id: i64,
    pub code: String,
    pub card_id: i64,
    pub position: i64,
    pub purpose: String,
    pub status: String,
    pub valid_to_ms: Option<i64>,
    pub meta: String,
    pub created_at_ms: i64,
    pub redeemed_at_ms: Option<i64>,
    pub expired_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMerchantRequest {
    pub name: String,
    pub stamps_per_reward: Option<i64>,
    pub logo_text: Option<String>,
    pub reward_description: Option<String>,
    pub foreground_color: Option<String>,
    pub background_color: Option<String>,
    pub label_color: Option<String>,
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("Timestamp out of range: {}", ms))
}

fn from_millis_opt(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("Column {} holds invalid value {}", column, value))
}

impl RedeemCodeRow {
    pub fn from_code(card: &Card, position: usize, code: &RedeemCode) -> Result<Self> {
        Ok(Self {
            merchant_id: card.merchant_id,
            code: code.code.clone(),
            card_id: card.card_id,
            position: i64::try_from(position)?,
            purpose: code.purpose.as_str().to_string(),
            status: code.status.as_str().to_string(),
            valid_to_ms: code.valid_to.map(|t| t.timestamp_millis()),
            meta: serde_json::to_string(&code.meta)?,
            created_at_ms: code.created_at.timestamp_millis(),
            redeemed_at_ms: code.redeemed_at.map(|t| t.timestamp_millis()),
            expired_at_ms: code.expired_at.map(|t| t.timestamp_millis()),
        })
    }

    pub fn into_code(self) -> Result<RedeemCode> {
        let meta: Meta = serde_json::from_str(&self.meta)
            .with_context(|| format!("Column meta of redeem code {} is invalid", self.code))?;
        Ok(RedeemCode {
            code: self.code,
            purpose: Purpose::parse(&self.purpose),
            status: self.status.parse()?,
            valid_to: from_millis_opt(self.valid_to_ms)?,
            meta,
            created_at: from_millis(self.created_at_ms)?,
            redeemed_at: from_millis_opt(self.redeemed_at_ms)?,
            expired_at: from_millis_opt(self.expired_at_ms)?,
        })
    }
}

impl CardRow {
    pub fn into_card(self, codes: Vec<RedeemCodeRow>) -> Result<Card> {
        let redeem_codes = codes
            .into_iter()
            .map(RedeemCodeRow::into_code)
            .collect::<Result<Vec<_>>>()?;
        Ok(Card {
            card_id: self.card_id,
            merchant_id: self.merchant_id,
            customer_id: self.customer_id,
            stamps: to_u32(self.stamps, "stamps")?,
            rewards: to_u32(self.rewards, "rewards")?,
            stamps_per_reward: to_u32(self.stamps_per_reward, "stamps_per_reward")?,
            last_event_at: from_millis_opt(self.last_event_at_ms)?,
            redeem_codes,
            wallet_object_id: self.wallet_object_id,
            version: self.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loyalty::card::CodeStatus;
    use std::collections::BTreeMap;

    fn row(meta: &str) -> RedeemCodeRow {
        RedeemCodeRow {
            merchant_id: 7,
            code: "RWD1".to_string(),
            card_id: 1,
            position: 0,
            purpose: "reward".to_string(),
            status: "active".to_string(),
            valid_to_ms: None,
            meta: meta.to_string(),
            created_at_ms: 1_700_000_000_000,
            redeemed_at_ms: None,
            expired_at_ms: None,
        }
    }

    #[test]
    fn code_row_keeps_meta() {
        let code = row(r#"{"campaign":"spring"}"#).into_code().unwrap();
        assert_eq!(code.status, CodeStatus::Active);
        assert_eq!(code.meta.get("campaign"), Some("spring"));
    }

    #[test]
    fn unreadable_meta_is_an_error_not_an_empty_bag() {
        let err = row("not json").into_code().unwrap_err();
        assert!(err.to_string().contains("RWD1"));

        let oversized: BTreeMap<String, String> =
            (0..40).map(|i| (format!("k{i}"), "v".to_string())).collect();
        let err = row(&serde_json::to_string(&oversized).unwrap()).into_code().unwrap_err();
        assert!(err.to_string().contains("meta"));
    }
}
