//! Error types for the Hyper-V driver.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during driver operations.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The management tool (PowerShell) could not be resolved on this host.
    #[error("PowerShell was not found in the path: {0}")]
    ToolNotFound(String),

    /// The Hyper-V feature is not enabled on this host.
    #[error("Hyper-V is not available: {0}")]
    HypervisorUnavailable(String),

    /// The caller is neither an Administrator nor a Hyper-V Administrator.
    #[error("Hyper-V commands have to be run as an Administrator")]
    PermissionDenied,

    /// A virtual switch is required but none was requested.
    #[error("no virtual switch given")]
    NoSwitchConfigured,

    /// The requested virtual switch does not exist on the host.
    #[error("virtual switch {0:?} not found")]
    SwitchNotFound(String),

    /// The hypervisor could not report the VM status.
    #[error("Failed to find the VM status: {0}")]
    StateQueryFailed(String),

    /// An IP address was requested while the VM is not running.
    #[error("Host is not running")]
    HostNotRunning,

    /// The VM is running but no address has been reported.
    #[error("IP not found")]
    IpNotFound,

    /// A memory size whose byte count does not fit the hypervisor API.
    #[error("memory size of {0} MB is out of range")]
    InvalidMemory(u64),

    /// A hypervisor command exited unsuccessfully.
    #[error("{command} failed: {message}")]
    CommandExecutionFailed {
        command: &'static str,
        message: String,
    },

    /// An update payload could not be decoded into a descriptor.
    #[error("Failed to decode machine config: {0}")]
    ConfigUnmarshalFailed(#[from] serde_json::Error),

    /// Local filesystem failure (disk image copy).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A polling loop exceeded its deadline.
    #[error("Timed out after {after:?} waiting for {what}")]
    Timeout { what: &'static str, after: Duration },

    /// A polling loop was cancelled by the caller.
    #[error("Cancelled while waiting for {0}")]
    Cancelled(&'static str),
}

impl DriverError {
    /// Build a command failure for the given cmdlet.
    pub fn command(command: &'static str, message: impl Into<String>) -> Self {
        Self::CommandExecutionFailed {
            command,
            message: message.into(),
        }
    }
}

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;
