//! Create-or-patch synchronisation of wallet classes and objects.
//!
//! Both resources follow the same protocol: read by deterministic id, create
//! from local state when the backend says it is absent, otherwise patch the
//! named fields. Any error other than "absent" is returned untouched. Calls
//! are safe to repeat; concurrent syncs of one object converge but are not
//! serialised.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::db::models::Merchant;
use crate::loyalty::{Card, barcode};
use crate::pass::descriptor::hex_color;
use crate::wallet::client::{ResourceKind, WalletBackend, WalletError};
use crate::wallet::ids::WalletIds;

pub const CLASS_PATCH_FIELDS: &[&str] = &["issuerName", "programName", "hexBackgroundColor"];
pub const OBJECT_PATCH_FIELDS: &[&str] = &["state", "loyaltyPoints", "secondaryLoyaltyPoints", "barcode"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Created,
    Patched,
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    pub card_id: i64,
    pub reason: String,
}

/// Aggregate of a multi-card sync. One card failing never stops the rest.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub succeeded: u32,
    pub failed: u32,
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, card_id: i64, reason: String) {
        self.failed += 1;
        self.failures.push(ItemFailure { card_id, reason });
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.failures.extend(other.failures);
    }

    pub fn total(&self) -> u32 {
        self.succeeded + self.failed
    }

    pub fn has_failed(&self, card_id: i64) -> bool {
        self.failures.iter().any(|f| f.card_id == card_id)
    }
}

/// Copy only `fields` out of `full`, so a patch never clobbers remote fields
/// this service does not own.
pub fn patch_body(full: &Value, fields: &[&str]) -> Value {
    let mut partial = Map::new();
    for field in fields {
        if let Some(value) = full.get(*field) {
            partial.insert((*field).to_string(), value.clone());
        }
    }
    Value::Object(partial)
}

pub struct WalletObjectSynchronizer {
    backend: Arc<dyn WalletBackend>,
    ids: WalletIds,
    issuer_name: String,
    program_logo_url: Option<String>,
    force_patch_class: bool,
}

impl WalletObjectSynchronizer {
    pub fn new(
        backend: Arc<dyn WalletBackend>,
        ids: WalletIds,
        issuer_name: String,
        program_logo_url: Option<String>,
        force_patch_class: bool,
    ) -> Self {
        Self {
            backend,
            ids,
            issuer_name,
            program_logo_url,
            force_patch_class,
        }
    }

    pub fn ids(&self) -> &WalletIds {
        &self.ids
    }

    pub fn class_body(&self, merchant: &Merchant) -> Value {
        let mut body = json!({
            "id": self.ids.class_id(merchant.merchant_id),
            "issuerName": self.issuer_name,
            "programName": merchant.name,
            "hexBackgroundColor": hex_color(merchant.background_color.as_deref()),
            "reviewStatus": "UNDER_REVIEW",
        });
        if let Some(url) = &self.program_logo_url {
            body["programLogo"] = json!({ "sourceUri": { "uri": url } });
        }
        body
    }

    pub fn object_body(&self, card: &Card, now: DateTime<Utc>) -> Value {
        let barcode = barcode::resolve_barcode(card, now);
        json!({
            "id": self.ids.object_id(card.card_id),
            "classId": self.ids.class_id(card.merchant_id),
            "state": "ACTIVE",
            "accountId": card.customer_id,
            "accountName": card.customer_id,
            "loyaltyPoints": {
                "label": "Stamps",
                "balance": { "string": format!("{}/{}", card.stamps, card.threshold()) },
            },
            "secondaryLoyaltyPoints": {
                "label": "Rewards",
                "balance": { "int": card.rewards },
            },
            "barcode": {
                "type": "QR_CODE",
                "value": barcode.message,
                "alternateText": barcode.message,
            },
        })
    }

    pub async fn ensure_class(&self, merchant: &Merchant) -> Result<(String, SyncOutcome), WalletError> {
        let id = self.ids.class_id(merchant.merchant_id);
        let body = self.class_body(merchant);

        match self.backend.get(ResourceKind::Class, &id).await? {
            None => {
                self.backend.insert(ResourceKind::Class, &body).await?;
                tracing::info!(class_id = %id, "Wallet class created");
                Ok((id, SyncOutcome::Created))
            }
            Some(_) if self.force_patch_class => {
                self.backend
                    .patch(ResourceKind::Class, &id, &patch_body(&body, CLASS_PATCH_FIELDS))
                    .await?;
                Ok((id, SyncOutcome::Patched))
            }
            Some(_) => Ok((id, SyncOutcome::Unchanged)),
        }
    }

    pub async fn ensure_object(&self, card: &Card, now: DateTime<Utc>) -> Result<(String, SyncOutcome), WalletError> {
        let id = self.ids.object_id(card.card_id);
        let body = self.object_body(card, now);

        match self.backend.get(ResourceKind::Object, &id).await? {
            None => {
                self.backend.insert(ResourceKind::Object, &body).await?;
                tracing::info!(object_id = %id, card_id = card.card_id, "Wallet object created");
                Ok((id, SyncOutcome::Created))
            }
            Some(_) => {
                self.backend
                    .patch(ResourceKind::Object, &id, &patch_body(&body, OBJECT_PATCH_FIELDS))
                    .await?;
                tracing::debug!(object_id = %id, card_id = card.card_id, "Wallet object patched");
                Ok((id, SyncOutcome::Patched))
            }
        }
    }

    /// Class first, then the object, for a single card.
    pub async fn sync_card(
        &self,
        merchant: &Merchant,
        card: &Card,
        now: DateTime<Utc>,
    ) -> Result<(String, SyncOutcome), WalletError> {
        self.ensure_class(merchant).await?;
        self.ensure_object(card, now).await
    }

    /// Sync every card of one merchant. The class is ensured once; if that
    /// fails every card is reported as failed with the same reason.
    pub async fn sync_cards(&self, merchant: &Merchant, cards: &[Card], now: DateTime<Utc>) -> BatchReport {
        let mut report = BatchReport::default();
        if let Err(e) = self.ensure_class(merchant).await {
            tracing::error!(merchant_id = merchant.merchant_id, error = %e.diagnostics(), "Wallet class sync failed");
            for card in cards {
                report.record_failure(card.card_id, e.to_string());
            }
            return report;
        }

        for card in cards {
            match self.ensure_object(card, now).await {
                Ok(_) => report.record_success(),
                Err(e) => {
                    tracing::error!(card_id = card.card_id, error = %e.diagnostics(), "Wallet object sync failed");
                    report.record_failure(card.card_id, e.to_string());
                }
            }
        }
        report
    }
}
