//! HTTP client for the remote wallet backend.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Shared program template.
    Class,
    /// Per-card pass instance.
    Object,
}

impl ResourceKind {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Class => "loyaltyClass",
            Self::Object => "loyaltyObject",
        }
    }
}

#[derive(Debug, Error)]
pub enum WalletError {
    /// Transport or decoding failure.
    #[error("wallet backend request failed")]
    Http(#[from] reqwest::Error),

    /// Non-success status other than 404.
    #[error("wallet backend returned status {status}")]
    Remote { status: u16, body: String },
}

impl WalletError {
    /// Operator-facing detail including the remote error body.
    pub fn diagnostics(&self) -> String {
        match self {
            Self::Http(e) => format!("wallet backend request failed: {e}"),
            Self::Remote { status, body } => format!("wallet backend returned {status}: {body}"),
        }
    }
}

/// Remote wallet resources addressed by deterministic ids.
#[async_trait]
pub trait WalletBackend: Send + Sync {
    /// `Ok(None)` when the backend reports the resource as absent.
    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Value>, WalletError>;

    async fn insert(&self, kind: ResourceKind, body: &Value) -> Result<Value, WalletError>;

    /// Partial update: only the fields present in `body` are written.
    async fn patch(&self, kind: ResourceKind, id: &str, body: &Value) -> Result<Value, WalletError>;
}

#[derive(Debug, Clone)]
pub struct HttpWalletBackend {
    http: Client,
    base_url: String,
    access_token: String,
}

impl HttpWalletBackend {
    pub fn new(base_url: String, access_token: String) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    fn url(&self, kind: ResourceKind, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/{}/{}", self.base_url, kind.path(), id),
            None => format!("{}/{}", self.base_url, kind.path()),
        }
    }
}

async fn into_json(response: reqwest::Response) -> Result<Value, WalletError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(WalletError::Remote { status, body });
    }
    Ok(response.json().await?)
}

#[async_trait]
impl WalletBackend for HttpWalletBackend {
    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Value>, WalletError> {
        let response = self
            .http
            .get(self.url(kind, Some(id)))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        into_json(response).await.map(Some)
    }

    async fn insert(&self, kind: ResourceKind, body: &Value) -> Result<Value, WalletError> {
        let response = self
            .http
            .post(self.url(kind, None))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;

        into_json(response).await
    }

    async fn patch(&self, kind: ResourceKind, id: &str, body: &Value) -> Result<Value, WalletError> {
        let response = self
            .http
            .patch(self.url(kind, Some(id)))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;

        into_json(response).await
    }
}

#[cfg(test)]
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory backend with the remote's merge-on-patch behaviour.
    #[derive(Default)]
    pub struct MemoryWalletBackend {
        pub resources: Mutex<HashMap<(ResourceKind, String), Value>>,
        pub inserts: Mutex<u32>,
        pub patches: Mutex<Vec<Value>>,
        /// Served for every `get` when set.
        pub fail_gets_with: Mutex<Option<u16>>,
    }

    impl MemoryWalletBackend {
        pub fn resource(&self, kind: ResourceKind, id: &str) -> Option<Value> {
            self.resources.lock().unwrap().get(&(kind, id.to_string())).cloned()
        }
    }

    #[async_trait]
    impl WalletBackend for MemoryWalletBackend {
        async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Value>, WalletError> {
            if let Some(status) = *self.fail_gets_with.lock().unwrap() {
                return Err(WalletError::Remote {
                    status,
                    body: "{\"error\":\"backend unavailable\"}".to_string(),
                });
            }
            Ok(self.resource(kind, id))
        }

        async fn insert(&self, kind: ResourceKind, body: &Value) -> Result<Value, WalletError> {
            let id = body["id"].as_str().unwrap_or_default().to_string();
            let mut resources = self.resources.lock().unwrap();
            if resources.contains_key(&(kind, id.clone())) {
                return Err(WalletError::Remote {
                    status: 409,
                    body: "already exists".to_string(),
                });
            }
            *self.inserts.lock().unwrap() += 1;
            resources.insert((kind, id), body.clone());
            Ok(body.clone())
        }

        async fn patch(&self, kind: ResourceKind, id: &str, body: &Value) -> Result<Value, WalletError> {
            self.patches.lock().unwrap().push(body.clone());
            let mut resources = self.resources.lock().unwrap();
            let stored = resources
                .get_mut(&(kind, id.to_string()))
                .ok_or_else(|| WalletError::Remote {
                    status: 404,
                    body: "not found".to_string(),
                })?;
            if let (Some(stored), Some(fields)) = (stored.as_object_mut(), body.as_object()) {
                for (key, value) in fields {
                    stored.insert(key.clone(), value.clone());
                }
            }
            Ok(stored.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_from_resource_paths() {
        let backend = HttpWalletBackend::new(
            "https://wallet.example.com/v1/".to_string(),
            "token".to_string(),
        );
        assert_eq!(
            backend.url(ResourceKind::Object, Some("3388.card_1")),
            "https://wallet.example.com/v1/loyaltyObject/3388.card_1"
        );
        assert_eq!(
            backend.url(ResourceKind::Class, None),
            "https://wallet.example.com/v1/loyaltyClass"
        );
    }

    #[test]
    fn remote_errors_keep_the_body_for_operators() {
        let err = WalletError::Remote {
            status: 403,
            body: "permission denied for issuer".to_string(),
        };
        assert_eq!(err.to_string(), "wallet backend returned status 403");
        assert!(err.diagnostics().contains("permission denied"));
    }
}
