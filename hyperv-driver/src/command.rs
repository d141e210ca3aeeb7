//! Typed Hyper-V commands and their PowerShell rendering.
//!
//! Every hypervisor operation the driver performs is a [`HypervCommand`]
//! value. Raw PowerShell text is produced only by [`HypervCommand::script`],
//! which the PowerShell backend hands to the interpreter.

use std::fmt;
use std::path::PathBuf;

/// A single Hyper-V management operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HypervCommand {
    /// `New-VM` in the store directory, optionally connected to a switch.
    NewVm {
        name: String,
        path: PathBuf,
        memory_mb: u64,
        switch: Option<String>,
    },
    StartVm { name: String },
    /// Graceful shutdown through the guest integration services.
    StopVm { name: String },
    /// Power off without notifying the guest.
    TurnOffVm { name: String },
    RemoveVm { name: String },
    SetMemory { name: String, memory_mb: u64 },
    DisableDynamicMemory { name: String },
    SetProcessorCount { name: String, count: u32 },
    ResizeVhd { path: PathBuf, size_bytes: u64 },
    AddHardDiskDrive { name: String, path: PathBuf },
    RemoveNetworkAdapter { name: String },
    SetStaticMacAddress { name: String, mac: String },
    /// Names of all virtual switches, one per line.
    ListSwitches,
    /// Raw VM status token (`Running`, `Off`, ...).
    GetState { name: String },
    /// First IP address of the first network adapter.
    GetIpAddress { name: String },
    /// Module that provides `New-VM`; `Hyper-V` when the feature is enabled.
    GetHypervModule,
    /// `True` when the caller holds the built-in Administrator role.
    IsAdministrator,
    /// `True` when the caller is in the Hyper-V Administrators group.
    IsHypervAdministrator,
}

/// Well-known SID of the "Hyper-V Administrators" group.
const HYPERV_ADMINISTRATORS_SID: &str = "S-1-5-32-578";

impl HypervCommand {
    /// Name of the cmdlet this command invokes.
    pub fn cmdlet(&self) -> &'static str {
        match self {
            Self::NewVm { .. } => "Hyper-V\\New-VM",
            Self::StartVm { .. } => "Hyper-V\\Start-VM",
            Self::StopVm { .. } | Self::TurnOffVm { .. } => "Hyper-V\\Stop-VM",
            Self::RemoveVm { .. } => "Hyper-V\\Remove-VM",
            Self::SetMemory { .. } | Self::DisableDynamicMemory { .. } => "Hyper-V\\Set-VMMemory",
            Self::SetProcessorCount { .. } => "Hyper-V\\Set-VMProcessor",
            Self::ResizeVhd { .. } => "Hyper-V\\Resize-VHD",
            Self::AddHardDiskDrive { .. } => "Hyper-V\\Add-VMHardDiskDrive",
            Self::RemoveNetworkAdapter { .. } => "Hyper-V\\Remove-VMNetworkAdapter",
            Self::SetStaticMacAddress { .. } => "Hyper-V\\Set-VMNetworkAdapter",
            Self::ListSwitches => "Hyper-V\\Get-VMSwitch",
            Self::GetState { .. } | Self::GetIpAddress { .. } => "Hyper-V\\Get-VM",
            Self::GetHypervModule => "Get-Command",
            Self::IsAdministrator | Self::IsHypervAdministrator => "WindowsPrincipal.IsInRole",
        }
    }

    /// Machine the command targets, if it targets one.
    pub fn machine(&self) -> Option<&str> {
        match self {
            Self::NewVm { name, .. }
            | Self::StartVm { name }
            | Self::StopVm { name }
            | Self::TurnOffVm { name }
            | Self::RemoveVm { name }
            | Self::SetMemory { name, .. }
            | Self::DisableDynamicMemory { name }
            | Self::SetProcessorCount { name, .. }
            | Self::AddHardDiskDrive { name, .. }
            | Self::RemoveNetworkAdapter { name }
            | Self::SetStaticMacAddress { name, .. }
            | Self::GetState { name }
            | Self::GetIpAddress { name } => Some(name),
            Self::ResizeVhd { .. }
            | Self::ListSwitches
            | Self::GetHypervModule
            | Self::IsAdministrator
            | Self::IsHypervAdministrator => None,
        }
    }

    /// Render the command as a PowerShell script.
    pub fn script(&self) -> String {
        let cmdlet = self.cmdlet();
        match self {
            Self::NewVm { name, path, memory_mb, switch } => {
                let mut script = format!(
                    "{} {} -Path {} -MemoryStartupBytes {}",
                    cmdlet,
                    quote(name),
                    quote_path(path),
                    mb_to_bytes(*memory_mb)
                );
                if let Some(switch) = switch {
                    script.push_str(&format!(" -SwitchName {}", quote(switch)));
                }
                script
            }
            Self::StartVm { name } => format!("{} {}", cmdlet, quote(name)),
            Self::StopVm { name } => format!("{} {}", cmdlet, quote(name)),
            Self::TurnOffVm { name } => format!("{} {} -TurnOff", cmdlet, quote(name)),
            Self::RemoveVm { name } => format!("{} {} -Force", cmdlet, quote(name)),
            Self::SetMemory { name, memory_mb } => format!(
                "{} -VMName {} -StartupBytes {}",
                cmdlet,
                quote(name),
                mb_to_bytes(*memory_mb)
            ),
            Self::DisableDynamicMemory { name } => {
                format!("{} -VMName {} -DynamicMemoryEnabled $false", cmdlet, quote(name))
            }
            Self::SetProcessorCount { name, count } => {
                format!("{} {} -Count {}", cmdlet, quote(name), count)
            }
            Self::ResizeVhd { path, size_bytes } => {
                format!("{} -Path {} -SizeBytes {}", cmdlet, quote_path(path), size_bytes)
            }
            Self::AddHardDiskDrive { name, path } => {
                format!("{} -VMName {} -Path {}", cmdlet, quote(name), quote_path(path))
            }
            Self::RemoveNetworkAdapter { name } => format!("{} -VMName {}", cmdlet, quote(name)),
            Self::SetStaticMacAddress { name, mac } => format!(
                "{} -VMName {} -StaticMacAddress {}",
                cmdlet,
                quote(name),
                quote(mac)
            ),
            Self::ListSwitches => format!(
                "[Console]::OutputEncoding = [Text.Encoding]::UTF8; ({}).Name",
                cmdlet
            ),
            Self::GetState { name } => format!("({} {}).State", cmdlet, quote(name)),
            Self::GetIpAddress { name } => format!(
                "(({} {}).NetworkAdapters[0]).IPAddresses[0]",
                cmdlet,
                quote(name)
            ),
            Self::GetHypervModule => "@(Get-Command Hyper-V\\New-VM).ModuleName".to_string(),
            Self::IsAdministrator => format!(
                "{}.IsInRole([Security.Principal.WindowsBuiltInRole] 'Administrator')",
                CURRENT_PRINCIPAL
            ),
            Self::IsHypervAdministrator => format!(
                "{}.IsInRole('{}')",
                CURRENT_PRINCIPAL, HYPERV_ADMINISTRATORS_SID
            ),
        }
    }
}

impl fmt::Display for HypervCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.machine() {
            Some(machine) => write!(f, "{} ({})", self.cmdlet(), machine),
            None => write!(f, "{}", self.cmdlet()),
        }
    }
}

const CURRENT_PRINCIPAL: &str =
    "([Security.Principal.WindowsPrincipal] [Security.Principal.WindowsIdentity]::GetCurrent())";

/// Largest memory size in MB whose byte count fits in a `u64`.
pub const MAX_MEMORY_MB: u64 = u64::MAX >> 20;

/// Convert MB to bytes, saturating at `u64::MAX`.
pub fn mb_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

/// Single-quote a PowerShell string literal.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn quote_path(path: &std::path::Path) -> String {
    quote(&path.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_vm_script_with_switch() {
        let cmd = HypervCommand::NewVm {
            name: "crc".to_string(),
            path: PathBuf::from("C:\\machines\\crc"),
            memory_mb: 4096,
            switch: Some("ExternalSwitch".to_string()),
        };

        assert_eq!(
            cmd.script(),
            "Hyper-V\\New-VM 'crc' -Path 'C:\\machines\\crc' -MemoryStartupBytes 4294967296 -SwitchName 'ExternalSwitch'"
        );
    }

    #[test]
    fn test_new_vm_script_without_switch() {
        let cmd = HypervCommand::NewVm {
            name: "crc".to_string(),
            path: PathBuf::from("/store"),
            memory_mb: 8192,
            switch: None,
        };

        let script = cmd.script();
        assert!(script.ends_with("-MemoryStartupBytes 8589934592"));
        assert!(!script.contains("-SwitchName"));
    }

    #[test]
    fn test_quotes_are_escaped() {
        let cmd = HypervCommand::StartVm { name: "bob's vm".to_string() };
        assert_eq!(cmd.script(), "Hyper-V\\Start-VM 'bob''s vm'");
    }

    #[test]
    fn test_stop_variants() {
        let graceful = HypervCommand::StopVm { name: "crc".to_string() };
        let forced = HypervCommand::TurnOffVm { name: "crc".to_string() };

        assert_eq!(graceful.cmdlet(), forced.cmdlet());
        assert!(!graceful.script().contains("-TurnOff"));
        assert!(forced.script().ends_with("-TurnOff"));
    }

    #[test]
    fn test_query_scripts() {
        let state = HypervCommand::GetState { name: "crc".to_string() };
        assert_eq!(state.script(), "(Hyper-V\\Get-VM 'crc').State");

        let ip = HypervCommand::GetIpAddress { name: "crc".to_string() };
        assert_eq!(ip.script(), "((Hyper-V\\Get-VM 'crc').NetworkAdapters[0]).IPAddresses[0]");

        assert!(HypervCommand::ListSwitches.script().contains("Get-VMSwitch"));
        assert!(HypervCommand::IsHypervAdministrator.script().contains("S-1-5-32-578"));
    }

    #[test]
    fn test_memory_bytes_saturate() {
        assert_eq!(mb_to_bytes(MAX_MEMORY_MB), MAX_MEMORY_MB << 20);
        assert_eq!(mb_to_bytes(u64::MAX), u64::MAX);

        let cmd = HypervCommand::SetMemory { name: "crc".to_string(), memory_mb: u64::MAX };
        assert!(cmd.script().ends_with(&format!("-StartupBytes {}", u64::MAX)));
    }

    #[test]
    fn test_display_names_machine() {
        let cmd = HypervCommand::RemoveVm { name: "crc".to_string() };
        assert_eq!(cmd.to_string(), "Hyper-V\\Remove-VM (crc)");
        assert_eq!(HypervCommand::ListSwitches.to_string(), "Hyper-V\\Get-VMSwitch");
    }
}
