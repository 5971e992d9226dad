/// Longest suffix the backend accepts after the issuer prefix.
pub const MAX_SUFFIX_LEN: usize = 64;

/// Reduce `raw` to `[a-z0-9_-]`, collapsing runs of anything else into a
/// single underscore and bounding the length.
pub fn slug(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed: String = out.trim_matches('_').chars().take(MAX_SUFFIX_LEN).collect();
    if trimmed.is_empty() {
        "x".to_string()
    } else {
        trimmed
    }
}

/// Deterministic remote ids. The same inputs always give the same id, so a
/// resource is never created twice for one merchant or card.
#[derive(Debug, Clone)]
pub struct WalletIds {
    issuer_id: String,
    class_prefix: String,
}

impl WalletIds {
    pub fn new(issuer_id: String, class_prefix: String) -> Self {
        Self {
            issuer_id,
            class_prefix,
        }
    }

    pub fn class_id(&self, merchant_id: i64) -> String {
        format!(
            "{}.{}",
            self.issuer_id,
            slug(&format!("{}_{}", self.class_prefix, merchant_id))
        )
    }

    pub fn object_id(&self, card_id: i64) -> String {
        format!("{}.{}", self.issuer_id, slug(&format!("card_{card_id}")))
    }
}
