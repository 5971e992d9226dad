use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::pass::PassError;
use crate::pass::manifest::{Assets, MANIFEST_FILE, PASS_FILE, SIGNATURE_FILE};
use crate::pass::tool::{run_tool, scratch_dir};
use crate::pass::validate_file_name;

/// Everything that goes into one archive.
#[derive(Debug, Clone)]
pub struct PassBundle {
    /// Serialized `pass.json`.
    pub descriptor: Vec<u8>,
    pub assets: Assets,
    pub manifest: Vec<u8>,
    pub signature: Vec<u8>,
}

impl PassBundle {
    /// Every file of the archive, in name order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        let mut files: Vec<(&str, &[u8])> = self
            .assets
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
            .collect();
        files.push((PASS_FILE, self.descriptor.as_slice()));
        files.push((MANIFEST_FILE, self.manifest.as_slice()));
        files.push((SIGNATURE_FILE, self.signature.as_slice()));
        files.sort_by(|a, b| a.0.cmp(b.0));
        files.into_iter()
    }

    pub fn validate(&self) -> Result<(), PassError> {
        for name in self.assets.keys() {
            if [PASS_FILE, MANIFEST_FILE, SIGNATURE_FILE].contains(&name.as_str()) {
                return Err(PassError::InvalidAssetName(name.clone()));
            }
            validate_file_name(name)?;
        }
        Ok(())
    }
}

/// Timestamp stamped on every archived file (2020-01-01T00:00:00Z), so equal
/// contents always give equal archive bytes.
const ARCHIVE_MTIME_SECS: u64 = 1_577_836_800;

async fn write_entry(path: &Path, bytes: &[u8]) -> Result<(), PassError> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    let file = file.into_std().await;
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(ARCHIVE_MTIME_SECS))?;
    Ok(())
}

/// Turns a bundle into the final archive bytes.
#[async_trait]
pub trait Packager: Send + Sync {
    async fn package(&self, bundle: &PassBundle) -> Result<Vec<u8>, PassError>;
}

/// Builds the archive with the `zip` command line tool. Files are stored
/// flat at the archive root, in name order, without extra attributes and
/// with a fixed modification time.
#[derive(Debug, Clone)]
pub struct ZipPackager {
    zip: PathBuf,
    timeout: Duration,
    scratch_root: Option<PathBuf>,
}

impl ZipPackager {
    pub fn new(zip: PathBuf, timeout: Duration, scratch_root: Option<PathBuf>) -> Self {
        Self {
            zip,
            timeout,
            scratch_root,
        }
    }
}

#[async_trait]
impl Packager for ZipPackager {
    async fn package(&self, bundle: &PassBundle) -> Result<Vec<u8>, PassError> {
        bundle.validate()?;

        let scratch = scratch_dir(self.scratch_root.as_deref(), "pass-pkg-")?;
        let content = scratch.path().join("bundle");
        let archive = scratch.path().join("pass.pkpass");
        tokio::fs::create_dir(&content).await?;

        let mut command = Command::new(&self.zip);
        command.arg("-q").arg("-X").arg("-j").arg(&archive);
        for (name, bytes) in bundle.files() {
            let path = content.join(name);
            write_entry(&path, bytes).await?;
            command.arg(path);
        }

        run_tool("zip", command, self.timeout).await?;
        let bytes = tokio::fs::read(&archive).await?;
        Ok(bytes)
    }
}
