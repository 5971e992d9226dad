use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::pass::PassError;

#[derive(Debug)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run an external tool to completion, bounded by `timeout`.
///
/// The child is killed if the timeout fires or the calling future is
/// dropped. Non-zero exit is an error carrying everything the tool printed.
pub async fn run_tool(
    tool: &'static str,
    mut command: Command,
    timeout: Duration,
) -> Result<ToolOutput, PassError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|source| PassError::Spawn { tool, source })?;
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| PassError::Timeout { tool, timeout })?
        .map_err(|source| PassError::Spawn { tool, source })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(PassError::ToolFailed {
            tool,
            status: output.status.code(),
            stdout,
            stderr,
        });
    }
    Ok(ToolOutput { stdout, stderr })
}

/// Per-operation scratch directory, removed recursively when dropped.
pub fn scratch_dir(root: Option<&Path>, prefix: &str) -> Result<TempDir, PassError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix);
    let dir = match root {
        Some(root) => builder.tempdir_in(root)?,
        None => builder.tempdir()?,
    };
    Ok(dir)
}

/// Write a file that only the current user can read.
pub async fn write_private(path: &Path, bytes: &[u8]) -> Result<(), PassError> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_tool_reports_exit_status() {
        let err = run_tool("false", Command::new("false"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PassError::ToolFailed { tool: "false", status: Some(1), .. }
        ));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let err = run_tool(
            "missing",
            Command::new("/nonexistent/definitely-not-a-tool"),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PassError::Spawn { tool: "missing", .. }));
    }

    #[test]
    fn scratch_dir_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let dir = scratch_dir(Some(root.path()), "pass-").unwrap();
        std::fs::write(dir.path().join("key.pem"), b"secret").unwrap();
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 1);

        drop(dir);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
