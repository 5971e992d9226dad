//! Signed wallet pass bundles.
//!
//! A bundle is rebuilt from scratch on every request: descriptor, asset
//! hashes, detached signature and archive. Nothing is cached between
//! requests and no partial archive is ever returned.

pub mod descriptor;
pub mod manifest;
pub mod packager;
pub mod signer;
pub mod tool;

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::db::models::Merchant;
use crate::loyalty::Card;
use manifest::{Assets, MANIFEST_FILE, PASS_FILE, SIGNATURE_FILE};
use packager::{PassBundle, Packager};
use signer::{PassSigner, SigningMaterial, SigningPaths};

/// The one asset every pass must carry.
pub const REQUIRED_ASSET: &str = "icon.png";

#[derive(Debug, Error)]
pub enum PassError {
    #[error("invalid asset name `{0}`")]
    InvalidAssetName(String),

    #[error("pass assets must include {0}")]
    MissingAsset(&'static str),

    #[error("failed to read signing material {path}")]
    SigningMaterial {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pass scratch space error")]
    Io(#[from] std::io::Error),

    #[error("failed to run {tool}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {timeout:?}")]
    Timeout { tool: &'static str, timeout: Duration },

    #[error("{tool} exited with status {status:?}")]
    ToolFailed {
        tool: &'static str,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("failed to serialize pass data")]
    Serialize(#[from] serde_json::Error),
}

impl PassError {
    /// Operator-facing detail, including captured tool output.
    pub fn diagnostics(&self) -> String {
        match self {
            Self::ToolFailed { tool, status, stdout, stderr } => format!(
                "{tool} exited with status {status:?}; stdout: {}; stderr: {}",
                stdout.trim(),
                stderr.trim()
            ),
            Self::Spawn { tool, source } => format!("failed to run {tool}: {source}"),
            Self::SigningMaterial { path, source } => format!("{}: {source}", path.display()),
            Self::Io(source) => format!("pass scratch space error: {source}"),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PassIdentity {
    pub pass_type_identifier: String,
    pub team_identifier: String,
    pub organization_name: String,
}

/// Names inside a pass archive are flat: no directories, no traversal, no
/// hidden files.
pub fn validate_file_name(name: &str) -> Result<(), PassError> {
    let flat = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some_and(|n| n == name);
    if flat {
        Ok(())
    } else {
        Err(PassError::InvalidAssetName(name.to_string()))
    }
}

/// Read every regular, non-hidden file at the top level of `dir`.
pub async fn load_assets(dir: &Path) -> Result<Assets, PassError> {
    let mut assets = Assets::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if [PASS_FILE, MANIFEST_FILE, SIGNATURE_FILE].contains(&name.as_str()) {
            return Err(PassError::InvalidAssetName(name));
        }
        validate_file_name(&name)?;
        assets.insert(name, tokio::fs::read(entry.path()).await?);
    }
    if !assets.contains_key(REQUIRED_ASSET) {
        return Err(PassError::MissingAsset(REQUIRED_ASSET));
    }
    Ok(assets)
}

/// Descriptor, manifest, signature and archive, in that order.
pub struct PassPipeline {
    identity: PassIdentity,
    signing_paths: SigningPaths,
    assets_dir: PathBuf,
    signer: Arc<dyn PassSigner>,
    packager: Arc<dyn Packager>,
}

impl PassPipeline {
    pub fn new(
        identity: PassIdentity,
        signing_paths: SigningPaths,
        assets_dir: PathBuf,
        signer: Arc<dyn PassSigner>,
        packager: Arc<dyn Packager>,
    ) -> Self {
        Self {
            identity,
            signing_paths,
            assets_dir,
            signer,
            packager,
        }
    }

    pub async fn build(
        &self,
        card: &Card,
        merchant: &Merchant,
        now: DateTime<Utc>,
    ) -> Result<Vec<u8>, PassError> {
        let descriptor = descriptor::build_descriptor(card, merchant, &self.identity, now);
        let descriptor = serde_json::to_vec_pretty(&descriptor)?;
        let assets = load_assets(&self.assets_dir).await?;

        let mut hashed = assets.clone();
        hashed.insert(PASS_FILE.to_string(), descriptor.clone());
        let manifest = manifest::manifest_bytes(&manifest::build_manifest(&hashed))?;

        // Key material lives only for the duration of this signature.
        let signature = {
            let material = SigningMaterial::load(&self.signing_paths).await?;
            self.signer.sign(&manifest, &material).await?
        };

        let archive = self
            .packager
            .package(&PassBundle {
                descriptor,
                assets,
                manifest,
                signature,
            })
            .await?;

        tracing::debug!(card_id = card.card_id, bytes = archive.len(), "Pass bundle built");
        Ok(archive)
    }
}
