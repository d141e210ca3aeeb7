//! Mock Hyper-V backend for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

use crate::command::HypervCommand;
use crate::error::{DriverError, Result};
use crate::traits::Hypervisor;
use crate::types::VmState;

type FailurePredicate = Box<dyn Fn(&HypervCommand) -> bool + Send + Sync>;

/// Mock Hyper-V host.
///
/// Simulates VMs in memory and answers every [`HypervCommand`] the way a
/// Hyper-V host would, recording each command it receives. Useful for:
/// - Unit and integration testing of the lifecycle controller
/// - Development on hosts without Hyper-V
///
/// Guests take `ip_delay` IP probes to report an address after start, and
/// `stop_delay` state probes to power off after a stop request.
pub struct MockBackend {
    host: Mutex<MockHost>,
    tool_path: Option<PathBuf>,
    failures: Vec<FailurePredicate>,
}

#[derive(Default)]
struct MockHost {
    vms: HashMap<String, MockVm>,
    switches: Vec<String>,
    guest_ip: String,
    ip_delay: u32,
    stop_delay: u32,
    hyperv_disabled: bool,
    administrator: bool,
    hyperv_administrator: bool,
    status_override: Option<String>,
    disk_sizes: HashMap<PathBuf, u64>,
    issued: Vec<HypervCommand>,
}

#[derive(Debug, Clone, Default)]
struct MockVm {
    running: bool,
    memory_mb: u64,
    cpu: u32,
    dynamic_memory: bool,
    switch: Option<String>,
    has_adapter: bool,
    mac: Option<String>,
    disks: Vec<PathBuf>,
    ip_polls_remaining: u32,
    stop_polls_remaining: Option<u32>,
}

/// Observable state of a mock VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockVmInfo {
    pub running: bool,
    pub memory_mb: u64,
    pub cpu: u32,
    pub dynamic_memory: bool,
    pub switch: Option<String>,
    pub has_adapter: bool,
    pub mac: Option<String>,
    pub disks: Vec<PathBuf>,
}

impl MockBackend {
    /// Create a mock host where the caller is an administrator and Hyper-V
    /// is enabled, with no switches and no VMs.
    pub fn new() -> Self {
        info!("Creating mock Hyper-V backend");
        Self {
            host: Mutex::new(MockHost {
                administrator: true,
                guest_ip: "192.168.1.50".to_string(),
                ..Default::default()
            }),
            tool_path: Some(PathBuf::from("powershell.exe")),
            failures: Vec::new(),
        }
    }

    /// Set the virtual switches present on the host.
    pub fn with_switches<I, S>(self, switches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().switches = switches.into_iter().map(Into::into).collect();
        self
    }

    /// Set the address guests report once they have booted.
    pub fn with_guest_ip(self, ip: impl Into<String>) -> Self {
        self.lock().guest_ip = ip.into();
        self
    }

    /// Number of empty IP probes after each start.
    pub fn with_ip_delay(self, polls: u32) -> Self {
        self.lock().ip_delay = polls;
        self
    }

    /// Number of state probes that still report `Running` after a stop.
    pub fn with_stop_delay(self, polls: u32) -> Self {
        self.lock().stop_delay = polls;
        self
    }

    /// Simulate a host where PowerShell cannot be found.
    pub fn without_tool(mut self) -> Self {
        self.tool_path = None;
        self
    }

    /// Simulate a host where the Hyper-V feature is disabled.
    pub fn without_hyperv(self) -> Self {
        self.lock().hyperv_disabled = true;
        self
    }

    /// Set the caller's privileges.
    pub fn with_privileges(self, administrator: bool, hyperv_administrator: bool) -> Self {
        {
            let mut host = self.lock();
            host.administrator = administrator;
            host.hyperv_administrator = hyperv_administrator;
        }
        self
    }

    /// Pre-create a VM, bypassing `New-VM`.
    pub fn with_vm(self, name: impl Into<String>, running: bool, switch: Option<&str>) -> Self {
        {
            let mut host = self.lock();
            let vm = MockVm {
                running,
                memory_mb: 8192,
                cpu: 4,
                dynamic_memory: true,
                switch: switch.map(str::to_string),
                has_adapter: true,
                ..Default::default()
            };
            host.vms.insert(name.into(), vm);
        }
        self
    }

    /// Fail every command matching the predicate.
    pub fn fail_when(mut self, predicate: impl Fn(&HypervCommand) -> bool + Send + Sync + 'static) -> Self {
        self.failures.push(Box::new(predicate));
        self
    }

    /// Report this raw status token for every state query.
    pub fn set_status_override(&self, status: Option<&str>) {
        self.lock().status_override = status.map(str::to_string);
    }

    /// Every command received so far, in order.
    pub fn issued(&self) -> Vec<HypervCommand> {
        self.lock().issued.clone()
    }

    /// Forget recorded commands.
    pub fn clear_issued(&self) {
        self.lock().issued.clear();
    }

    /// Snapshot of a VM, if it exists.
    pub fn vm(&self, name: &str) -> Option<MockVmInfo> {
        self.lock().vms.get(name).map(|vm| MockVmInfo {
            running: vm.running,
            memory_mb: vm.memory_mb,
            cpu: vm.cpu,
            dynamic_memory: vm.dynamic_memory,
            switch: vm.switch.clone(),
            has_adapter: vm.has_adapter,
            mac: vm.mac.clone(),
            disks: vm.disks.clone(),
        })
    }

    /// Size a disk was last resized to.
    pub fn disk_size(&self, path: &Path) -> Option<u64> {
        self.lock().disk_sizes.get(path).copied()
    }

    fn lock(&self) -> MutexGuard<'_, MockHost> {
        self.host.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    fn vm_mut(&mut self, command: &HypervCommand, name: &str) -> Result<&mut MockVm> {
        self.vms.get_mut(name).ok_or_else(|| {
            DriverError::command(
                command.cmdlet(),
                format!("Hyper-V was unable to find a virtual machine with name \"{}\".", name),
            )
        })
    }

    fn apply(&mut self, command: &HypervCommand) -> Result<String> {
        let cmdlet = command.cmdlet();
        match command {
            HypervCommand::NewVm { name, memory_mb, switch, .. } => {
                if self.vms.contains_key(name) {
                    return Err(DriverError::command(cmdlet, format!("VM {} already exists", name)));
                }
                if let Some(switch) = switch {
                    if !self.switches.contains(switch) {
                        return Err(DriverError::command(cmdlet, format!("switch {} not found", switch)));
                    }
                }
                self.vms.insert(
                    name.clone(),
                    MockVm {
                        memory_mb: *memory_mb,
                        cpu: 1,
                        dynamic_memory: true,
                        switch: switch.clone(),
                        has_adapter: true,
                        ..Default::default()
                    },
                );
                Ok(String::new())
            }
            HypervCommand::StartVm { name } => {
                let ip_delay = self.ip_delay;
                let vm = self.vm_mut(command, name)?;
                if !vm.running {
                    vm.running = true;
                    vm.ip_polls_remaining = ip_delay;
                }
                vm.stop_polls_remaining = None;
                Ok(String::new())
            }
            HypervCommand::StopVm { name } => {
                let stop_delay = self.stop_delay;
                let vm = self.vm_mut(command, name)?;
                if vm.running {
                    vm.stop_polls_remaining = Some(stop_delay);
                }
                Ok(String::new())
            }
            HypervCommand::TurnOffVm { name } => {
                let vm = self.vm_mut(command, name)?;
                vm.running = false;
                vm.stop_polls_remaining = None;
                Ok(String::new())
            }
            HypervCommand::RemoveVm { name } => {
                let vm = self.vm_mut(command, name)?;
                if vm.running {
                    return Err(DriverError::command(cmdlet, format!("VM {} is running", name)));
                }
                self.vms.remove(name);
                Ok(String::new())
            }
            HypervCommand::SetMemory { name, memory_mb } => {
                self.vm_mut(command, name)?.memory_mb = *memory_mb;
                Ok(String::new())
            }
            HypervCommand::DisableDynamicMemory { name } => {
                self.vm_mut(command, name)?.dynamic_memory = false;
                Ok(String::new())
            }
            HypervCommand::SetProcessorCount { name, count } => {
                self.vm_mut(command, name)?.cpu = *count;
                Ok(String::new())
            }
            HypervCommand::ResizeVhd { path, size_bytes } => {
                self.disk_sizes.insert(path.clone(), *size_bytes);
                Ok(String::new())
            }
            HypervCommand::AddHardDiskDrive { name, path } => {
                self.vm_mut(command, name)?.disks.push(path.clone());
                Ok(String::new())
            }
            HypervCommand::RemoveNetworkAdapter { name } => {
                let vm = self.vm_mut(command, name)?;
                vm.has_adapter = false;
                vm.switch = None;
                Ok(String::new())
            }
            HypervCommand::SetStaticMacAddress { name, mac } => {
                let vm = self.vm_mut(command, name)?;
                if !vm.has_adapter {
                    return Err(DriverError::command(cmdlet, "no network adapter"));
                }
                vm.mac = Some(mac.clone());
                Ok(String::new())
            }
            HypervCommand::ListSwitches => {
                Ok(self.switches.iter().map(|s| format!("{}\r\n", s)).collect())
            }
            HypervCommand::GetState { name } => {
                let status_override = self.status_override.clone();
                let vm = self.vm_mut(command, name)?;
                if let Some(remaining) = vm.stop_polls_remaining {
                    if remaining == 0 {
                        vm.running = false;
                        vm.stop_polls_remaining = None;
                    } else {
                        vm.stop_polls_remaining = Some(remaining - 1);
                    }
                }
                if let Some(status) = status_override {
                    return Ok(format!("{}\r\n", status));
                }
                Ok(if vm.running { "Running\r\n" } else { "Off\r\n" }.to_string())
            }
            HypervCommand::GetIpAddress { name } => {
                let guest_ip = self.guest_ip.clone();
                let vm = self.vm_mut(command, name)?;
                if !vm.running || !vm.has_adapter || vm.switch.is_none() {
                    return Ok(String::new());
                }
                if vm.ip_polls_remaining > 0 {
                    vm.ip_polls_remaining -= 1;
                    return Ok(String::new());
                }
                Ok(format!("{}\r\n", guest_ip))
            }
            HypervCommand::GetHypervModule => {
                if self.hyperv_disabled {
                    Ok(String::new())
                } else {
                    Ok("Hyper-V\r\n".to_string())
                }
            }
            HypervCommand::IsAdministrator => Ok(format!("{}\r\n", pwsh_bool(self.administrator))),
            HypervCommand::IsHypervAdministrator => {
                Ok(format!("{}\r\n", pwsh_bool(self.hyperv_administrator)))
            }
        }
    }
}

fn pwsh_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

#[async_trait]
impl Hypervisor for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn tool_path(&self) -> Option<&Path> {
        self.tool_path.as_deref()
    }

    #[instrument(skip(self), fields(command = %command))]
    async fn execute(&self, command: &HypervCommand) -> Result<String> {
        let mut host = self.lock();
        host.issued.push(command.clone());

        if self.failures.iter().any(|fail| fail(command)) {
            debug!("Injected failure");
            return Err(DriverError::command(command.cmdlet(), "injected failure"));
        }

        host.apply(command)
    }
}

impl MockVmInfo {
    /// State of the VM as the driver would see it.
    pub fn state(&self) -> VmState {
        if self.running {
            VmState::Running
        } else {
            VmState::Stopped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name() -> String {
        "crc".to_string()
    }

    #[tokio::test]
    async fn test_vm_lifecycle() {
        let backend = MockBackend::new().with_switches(["ExternalSwitch"]);

        backend
            .execute(&HypervCommand::NewVm {
                name: name(),
                path: PathBuf::from("/store"),
                memory_mb: 2048,
                switch: Some("ExternalSwitch".to_string()),
            })
            .await
            .unwrap();
        let state = backend.execute(&HypervCommand::GetState { name: name() }).await.unwrap();
        assert_eq!(state.trim(), "Off");

        backend.execute(&HypervCommand::StartVm { name: name() }).await.unwrap();
        let state = backend.execute(&HypervCommand::GetState { name: name() }).await.unwrap();
        assert_eq!(state.trim(), "Running");

        let ip = backend.execute(&HypervCommand::GetIpAddress { name: name() }).await.unwrap();
        assert_eq!(ip.trim(), "192.168.1.50");

        // Remove refuses a running VM
        assert!(backend.execute(&HypervCommand::RemoveVm { name: name() }).await.is_err());

        backend.execute(&HypervCommand::TurnOffVm { name: name() }).await.unwrap();
        backend.execute(&HypervCommand::RemoveVm { name: name() }).await.unwrap();
        assert!(backend.vm("crc").is_none());
        assert_eq!(backend.issued().len(), 7);
    }

    #[tokio::test]
    async fn test_graceful_stop_is_delayed() {
        let backend = MockBackend::new().with_vm("crc", true, None).with_stop_delay(2);

        backend.execute(&HypervCommand::StopVm { name: name() }).await.unwrap();

        let mut observed = Vec::new();
        for _ in 0..4 {
            let out = backend.execute(&HypervCommand::GetState { name: name() }).await.unwrap();
            observed.push(out.trim().to_string());
        }
        assert_eq!(observed, vec!["Running", "Running", "Off", "Off"]);
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let backend = MockBackend::new()
            .with_vm("crc", false, None)
            .fail_when(|c| matches!(c, HypervCommand::StartVm { .. }));

        let err = backend.execute(&HypervCommand::StartVm { name: name() }).await.unwrap_err();
        assert!(matches!(err, DriverError::CommandExecutionFailed { command: "Hyper-V\\Start-VM", .. }));
        assert_eq!(backend.issued(), vec![HypervCommand::StartVm { name: name() }]);
        assert!(!backend.vm("crc").unwrap().running);
    }

    #[tokio::test]
    async fn test_unknown_vm_fails() {
        let backend = MockBackend::new();
        let result = backend.execute(&HypervCommand::GetState { name: name() }).await;
        assert!(result.is_err());
    }
}
