//! Command backend abstraction trait.

use async_trait::async_trait;
use std::path::Path;

use crate::command::HypervCommand;
use crate::error::Result;

/// Backend that executes Hyper-V commands on the host.
///
/// Implementations run each command to completion and return its standard
/// output verbatim. Any non-zero exit or transport failure must be reported
/// as an error with no partial output. The driver never retries a failed
/// command.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// Name of the backend (e.g. "powershell", "mock").
    fn name(&self) -> &str;

    /// Path of the management tool, or `None` when it could not be resolved.
    fn tool_path(&self) -> Option<&Path>;

    /// Execute a command and return its raw output.
    async fn execute(&self, command: &HypervCommand) -> Result<String>;
}
