//! Checks run before a VM is created.

use tracing::{debug, info, instrument};

use crate::command::HypervCommand;
use crate::error::{DriverError, Result};
use crate::network::choose_switch;
use crate::parse::parse_lines;
use crate::powershell::POWERSHELL_EXECUTABLE;
use crate::traits::Hypervisor;

/// Run the preflight chain; the first failing check wins.
///
/// 1. PowerShell is resolvable
/// 2. The Hyper-V feature is enabled
/// 3. The caller is an Administrator or a Hyper-V Administrator
/// 4. The requested switch, if any, exists
#[instrument(skip(backend))]
pub async fn pre_create_check(backend: &dyn Hypervisor, switch: Option<&str>) -> Result<()> {
    if backend.tool_path().is_none() {
        return Err(DriverError::ToolNotFound(POWERSHELL_EXECUTABLE.to_string()));
    }

    check_hyperv_available(backend).await?;

    if !is_administrator(backend).await? {
        return Err(DriverError::PermissionDenied);
    }

    match switch.filter(|s| !s.is_empty()) {
        Some(switch) => {
            choose_switch(backend, switch).await?;
        }
        None => debug!("No virtual switch requested, skipping switch check"),
    }

    info!("Preflight checks passed");
    Ok(())
}

async fn check_hyperv_available(backend: &dyn Hypervisor) -> Result<()> {
    let stdout = backend.execute(&HypervCommand::GetHypervModule).await?;
    let module = parse_lines(&stdout).into_iter().next();

    match module.as_deref() {
        Some("Hyper-V") => Ok(()),
        Some(other) => Err(DriverError::HypervisorUnavailable(format!(
            "New-VM is provided by {:?}, not by Hyper-V",
            other
        ))),
        None => Err(DriverError::HypervisorUnavailable(
            "the Hyper-V PowerShell module is not installed".to_string(),
        )),
    }
}

async fn is_administrator(backend: &dyn Hypervisor) -> Result<bool> {
    if is_true(backend, &HypervCommand::IsHypervAdministrator).await? {
        return Ok(true);
    }
    is_true(backend, &HypervCommand::IsAdministrator).await
}

async fn is_true(backend: &dyn Hypervisor, command: &HypervCommand) -> Result<bool> {
    let stdout = backend.execute(command).await?;
    Ok(parse_lines(&stdout).first().map(String::as_str) == Some("True"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    #[tokio::test]
    async fn test_all_checks_pass() {
        let backend = MockBackend::new().with_switches(["ExternalSwitch"]);
        pre_create_check(&backend, Some("ExternalSwitch")).await.unwrap();
    }

    #[tokio::test]
    async fn test_tool_missing_short_circuits() {
        let backend = MockBackend::new().without_tool().without_hyperv();
        let err = pre_create_check(&backend, None).await.unwrap_err();
        assert!(matches!(err, DriverError::ToolNotFound(_)));
        assert!(backend.issued().is_empty());
    }

    #[tokio::test]
    async fn test_hyperv_unavailable() {
        let backend = MockBackend::new().without_hyperv().with_privileges(false, false);
        let err = pre_create_check(&backend, None).await.unwrap_err();
        assert!(matches!(err, DriverError::HypervisorUnavailable(_)));
        assert_eq!(backend.issued(), vec![HypervCommand::GetHypervModule]);
    }

    #[tokio::test]
    async fn test_not_administrator() {
        let backend = MockBackend::new().with_privileges(false, false);
        let err = pre_create_check(&backend, Some("ExternalSwitch")).await.unwrap_err();
        assert!(matches!(err, DriverError::PermissionDenied));
        assert!(!backend.issued().contains(&HypervCommand::ListSwitches));
    }

    #[tokio::test]
    async fn test_hyperv_administrator_is_enough() {
        let backend = MockBackend::new().with_privileges(false, true);
        pre_create_check(&backend, None).await.unwrap();
        assert!(!backend.issued().contains(&HypervCommand::IsAdministrator));
    }

    #[tokio::test]
    async fn test_missing_switch() {
        let backend = MockBackend::new().with_switches(["Default Switch"]);
        let err = pre_create_check(&backend, Some("ExternalSwitch")).await.unwrap_err();
        assert!(matches!(err, DriverError::SwitchNotFound(_)));
    }

    #[tokio::test]
    async fn test_no_switch_skips_lookup() {
        let backend = MockBackend::new();
        pre_create_check(&backend, None).await.unwrap();
        pre_create_check(&backend, Some("")).await.unwrap();
        assert!(!backend.issued().contains(&HypervCommand::ListSwitches));
    }
}
