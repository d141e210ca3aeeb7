//! VM state query.

use tracing::{debug, instrument};

use crate::command::HypervCommand;
use crate::error::{DriverError, Result};
use crate::parse::parse_lines;
use crate::traits::Hypervisor;
use crate::types::VmState;

/// Ask the hypervisor for the canonical state of a VM.
///
/// Only the first line of output is considered. Unrecognized or missing
/// status tokens map to [`VmState::Unknown`]; only a failing command is an
/// error.
#[instrument(skip(backend))]
pub async fn query_state(backend: &dyn Hypervisor, machine: &str) -> Result<VmState> {
    let stdout = backend
        .execute(&HypervCommand::GetState { name: machine.to_string() })
        .await
        .map_err(|e| DriverError::StateQueryFailed(e.to_string()))?;

    let state = parse_lines(&stdout)
        .first()
        .map(|raw| VmState::from_hyperv(raw))
        .unwrap_or(VmState::Unknown);

    debug!(%state, "Queried VM state");
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    #[tokio::test]
    async fn test_query_running_and_stopped() {
        let backend = MockBackend::new().with_vm("up", true, None).with_vm("down", false, None);
        assert_eq!(query_state(&backend, "up").await.unwrap(), VmState::Running);
        assert_eq!(query_state(&backend, "down").await.unwrap(), VmState::Stopped);
    }

    #[tokio::test]
    async fn test_unrecognized_status_is_unknown() {
        let backend = MockBackend::new().with_vm("crc", true, None);
        for raw in ["Paused", "Saved", "Starting", "running", "  "] {
            backend.set_status_override(Some(raw));
            assert_eq!(query_state(&backend, "crc").await.unwrap(), VmState::Unknown, "{raw:?}");
        }
    }

    #[tokio::test]
    async fn test_only_first_line_counts() {
        let backend = MockBackend::new().with_vm("crc", false, None);
        backend.set_status_override(Some("Off\r\nRunning"));
        assert_eq!(query_state(&backend, "crc").await.unwrap(), VmState::Stopped);
    }

    #[tokio::test]
    async fn test_query_failure() {
        let backend = MockBackend::new();
        let err = query_state(&backend, "missing").await.unwrap_err();
        assert!(matches!(err, DriverError::StateQueryFailed(_)));
    }
}
