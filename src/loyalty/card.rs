use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Threshold used when neither the merchant template nor configuration
/// provides a usable positive value.
pub const DEFAULT_STAMPS_PER_REWARD: u32 = 10;

/// What a redeem code is good for.
///
/// Unknown values read back from storage are preserved as `Other` so that
/// redemption can reject them explicitly instead of failing to load the card.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Purpose {
    Reward,
    Coupon,
    Other(String),
}

impl Purpose {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "reward" => Self::Reward,
            "coupon" => Self::Coupon,
            _ => Self::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Reward => "reward",
            Self::Coupon => "coupon",
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Purpose {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Purpose {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeStatus {
    Active,
    Redeemed,
    Expired,
}

impl CodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Redeemed => "redeemed",
            Self::Expired => "expired",
        }
    }
}

impl FromStr for CodeStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "redeemed" => Ok(Self::Redeemed),
            "expired" => Ok(Self::Expired),
            other => Err(anyhow!("Unknown redeem code status: {}", other)),
        }
    }
}

pub const META_MAX_ENTRIES: usize = 16;
pub const META_MAX_KEY_LEN: usize = 64;
pub const META_MAX_VALUE_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetaError {
    #[error("metadata may hold at most {META_MAX_ENTRIES} entries")]
    TooManyEntries,
    #[error("metadata key longer than {META_MAX_KEY_LEN} bytes")]
    KeyTooLong,
    #[error("metadata value for `{0}` longer than {META_MAX_VALUE_LEN} bytes")]
    ValueTooLong(String),
}

/// Opaque key/value bag attached to a redeem code.
///
/// Bounded to [`META_MAX_ENTRIES`] entries of short strings. The contents are
/// carried through untouched and never interpreted by the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct Meta(BTreeMap<String, String>);

impl Meta {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<BTreeMap<String, String>> for Meta {
    type Error = MetaError;

    fn try_from(entries: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        if entries.len() > META_MAX_ENTRIES {
            return Err(MetaError::TooManyEntries);
        }
        for (key, value) in &entries {
            if key.len() > META_MAX_KEY_LEN {
                return Err(MetaError::KeyTooLong);
            }
            if value.len() > META_MAX_VALUE_LEN {
                return Err(MetaError::ValueTooLong(key.clone()));
            }
        }
        Ok(Self(entries))
    }
}

impl From<Meta> for BTreeMap<String, String> {
    fn from(meta: Meta) -> Self {
        meta.0
    }
}

/// Canonical form of a code: uppercase with whitespace and dashes removed,
/// so that values keyed in by hand or read by a scanner compare equal.
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemCode {
    pub code: String,
    pub purpose: Purpose,
    pub status: CodeStatus,
    pub valid_to: Option<DateTime<Utc>>,
    pub meta: Meta,
    pub created_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl RedeemCode {
    pub fn is_past_valid_to(&self, now: DateTime<Utc>) -> bool {
        self.valid_to.is_some_and(|valid_to| now > valid_to)
    }

    /// Active and not past its expiry instant.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == CodeStatus::Active && !self.is_past_valid_to(now)
    }

    pub fn matches(&self, normalized: &str) -> bool {
        self.code == normalized
    }
}

/// A single customer's loyalty record at one merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub card_id: i64,
    pub merchant_id: i64,
    pub customer_id: String,
    pub stamps: u32,
    pub rewards: u32,
    pub stamps_per_reward: u32,
    pub last_event_at: Option<DateTime<Utc>>,
    pub redeem_codes: Vec<RedeemCode>,
    pub wallet_object_id: Option<String>,
    /// Optimistic concurrency token, bumped by every committed update.
    pub version: i64,
}

impl Card {
    /// Threshold actually applied, never zero even if storage holds garbage.
    pub fn threshold(&self) -> u32 {
        if self.stamps_per_reward == 0 {
            DEFAULT_STAMPS_PER_REWARD
        } else {
            self.stamps_per_reward
        }
    }
}

/// Pick the stamps-per-reward threshold for a new card: the merchant template
/// value when it is a positive integer, else the configured default, else 10.
pub fn resolve_stamps_per_reward(template: Option<i64>, fallback: u32) -> u32 {
    template
        .and_then(|value| u32::try_from(value).ok())
        .filter(|value| *value > 0)
        .or(Some(fallback).filter(|value| *value > 0))
        .unwrap_or(DEFAULT_STAMPS_PER_REWARD)
}
