//! PowerShell backend implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::command::HypervCommand;
use crate::error::{DriverError, Result};
use crate::traits::Hypervisor;

/// Executable looked up on `PATH` when no explicit path is configured.
pub const POWERSHELL_EXECUTABLE: &str = "powershell.exe";

/// Hyper-V backend driving the Hyper-V PowerShell module.
///
/// Each command is run in a fresh, non-interactive PowerShell process.
pub struct PowerShellBackend {
    executable: Option<PathBuf>,
}

impl PowerShellBackend {
    /// Resolve `powershell.exe` on `PATH`.
    pub fn new() -> Self {
        let executable = find_in_path(POWERSHELL_EXECUTABLE);
        match &executable {
            Some(path) => info!(path = %path.display(), "Using PowerShell"),
            None => warn!("{} not found in PATH", POWERSHELL_EXECUTABLE),
        }
        Self { executable }
    }

    /// Use an explicit PowerShell executable.
    pub fn with_executable(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let executable = if path.is_file() { Some(path) } else { find_in_path(&path) };
        Self { executable }
    }
}

impl Default for PowerShellBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Search `PATH` for an executable.
fn find_in_path(name: impl AsRef<Path>) -> Option<PathBuf> {
    let name = name.as_ref();
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[async_trait]
impl Hypervisor for PowerShellBackend {
    fn name(&self) -> &str {
        "powershell"
    }

    fn tool_path(&self) -> Option<&Path> {
        self.executable.as_deref()
    }

    #[instrument(skip(self), fields(command = %command))]
    async fn execute(&self, command: &HypervCommand) -> Result<String> {
        let executable = self
            .executable
            .as_deref()
            .ok_or_else(|| DriverError::ToolNotFound(POWERSHELL_EXECUTABLE.to_string()))?;

        let script = command.script();
        debug!(script = %script, "Running PowerShell");

        let output = Command::new(executable)
            .args(["-NoProfile", "-NonInteractive", "-Command", &script])
            .output()
            .await
            .map_err(|e| DriverError::command(command.cmdlet(), e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!(status = ?output.status.code(), stderr = %stderr, "PowerShell command failed");
            let message = if stderr.is_empty() {
                format!("exit status {}", output.status)
            } else {
                stderr
            };
            return Err(DriverError::command(command.cmdlet(), message));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        debug!(stdout = %stdout, "PowerShell command succeeded");
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_in_path_missing() {
        assert!(find_in_path("definitely-not-a-real-tool-4b1e.exe").is_none());
    }

    #[test]
    fn test_explicit_executable_missing() {
        let backend = PowerShellBackend::with_executable("/nonexistent/dir/powershell.exe");
        assert!(backend.tool_path().is_none());
    }

    #[tokio::test]
    async fn test_execute_without_tool() {
        let backend = PowerShellBackend { executable: None };
        let err = backend.execute(&HypervCommand::ListSwitches).await.unwrap_err();
        assert!(matches!(err, DriverError::ToolNotFound(_)));
    }
}
