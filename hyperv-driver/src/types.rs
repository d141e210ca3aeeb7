//! Type definitions for the machine descriptor and VM state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default memory size in MB.
pub const DEFAULT_MEMORY_MB: u64 = 8192;

/// Default number of virtual processors.
pub const DEFAULT_CPU_COUNT: u32 = 4;

/// Default disk image format (file extension of the copied image).
pub const DEFAULT_IMAGE_FORMAT: &str = "vhdx";

/// Default SSH user for provisioned machines.
pub const DEFAULT_SSH_USER: &str = "core";

/// Port of the endpoint returned by `url()`.
pub const DOCKER_PORT: u16 = 2376;

// =============================================================================
// MACHINE DESCRIPTOR
// =============================================================================

/// Desired and observed configuration of a single Hyper-V VM.
///
/// This is also the wire format of the persisted machine config and of the
/// update payload consumed by the reconciler, hence the PascalCase names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VmDescriptor {
    /// VM name, used as the key in every hypervisor call
    pub machine_name: String,
    /// Directory holding the VM's files
    pub store_path: PathBuf,
    /// Memory size in MB
    pub memory: u64,
    /// Number of virtual processors
    #[serde(rename = "CPU")]
    pub cpu: u32,
    /// Disk capacity in bytes
    pub disk_capacity: u64,
    /// Disk image copied into the store at creation
    pub image_source_path: PathBuf,
    /// Disk image format, e.g. "vhdx"
    pub image_format: String,
    /// Virtual switch to attach; `None` or empty means no networking
    pub virtual_switch: Option<String>,
    /// Static MAC address for the network adapter
    pub mac_address: Option<String>,
    /// Last observed IP address, only set while running
    #[serde(rename = "IPAddress")]
    pub ip_address: Option<String>,
    /// Turn off Hyper-V dynamic memory
    pub disable_dynamic_memory: bool,
    /// URL of the bundle the disk image came from
    #[serde(rename = "BundleURL")]
    pub bundle_url: Option<String>,
    /// SSH user for the provisioned guest
    #[serde(rename = "SSHUser")]
    pub ssh_user: String,
    /// SSH private key path for the provisioned guest
    #[serde(rename = "SSHKeyPath")]
    pub ssh_key_path: Option<PathBuf>,
}

impl Default for VmDescriptor {
    fn default() -> Self {
        Self {
            machine_name: String::new(),
            store_path: PathBuf::new(),
            memory: DEFAULT_MEMORY_MB,
            cpu: DEFAULT_CPU_COUNT,
            disk_capacity: 0,
            image_source_path: PathBuf::new(),
            image_format: DEFAULT_IMAGE_FORMAT.to_string(),
            virtual_switch: None,
            mac_address: None,
            ip_address: None,
            disable_dynamic_memory: false,
            bundle_url: None,
            ssh_user: DEFAULT_SSH_USER.to_string(),
            ssh_key_path: None,
        }
    }
}

impl VmDescriptor {
    /// Create a descriptor with default compute settings.
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            machine_name: machine_name.into(),
            store_path: store_path.into(),
            ..Default::default()
        }
    }

    /// Set the memory size in MB.
    pub fn with_memory(mut self, memory_mb: u64) -> Self {
        self.memory = memory_mb;
        self
    }

    /// Set the number of virtual processors.
    pub fn with_cpu(mut self, count: u32) -> Self {
        self.cpu = count;
        self
    }

    /// Set the virtual switch to attach.
    pub fn with_virtual_switch(mut self, switch: impl Into<String>) -> Self {
        self.virtual_switch = Some(switch.into());
        self
    }

    /// Set a static MAC address.
    pub fn with_mac_address(mut self, mac: impl Into<String>) -> Self {
        self.mac_address = Some(mac.into());
        self
    }

    /// Set the source disk image and its format.
    pub fn with_disk_image(mut self, path: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        self.image_source_path = path.into();
        self.image_format = format.into();
        self
    }

    /// Set the disk capacity in bytes.
    pub fn with_disk_capacity(mut self, bytes: u64) -> Self {
        self.disk_capacity = bytes;
        self
    }

    /// Disable dynamic memory.
    pub fn with_dynamic_memory_disabled(mut self, disabled: bool) -> Self {
        self.disable_dynamic_memory = disabled;
        self
    }

    /// The requested switch, with an empty name treated as no switch.
    pub fn requested_switch(&self) -> Option<&str> {
        self.virtual_switch.as_deref().filter(|s| !s.is_empty())
    }

    /// The requested static MAC address, if any.
    pub fn requested_mac(&self) -> Option<&str> {
        self.mac_address.as_deref().filter(|s| !s.is_empty())
    }

    /// Resolve a file name inside the store directory.
    pub fn resolve_store_path(&self, file: impl AsRef<Path>) -> PathBuf {
        self.store_path.join(file)
    }

    /// Path of the VM disk: `<store>/<name>.<format>`.
    pub fn disk_path(&self) -> PathBuf {
        self.resolve_store_path(format!("{}.{}", self.machine_name, self.image_format))
    }
}

// =============================================================================
// VM STATE
// =============================================================================

/// Canonical VM state as reported by the hypervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmState {
    Running,
    Stopped,
    Unknown,
}

impl VmState {
    /// Map a raw Hyper-V status token. Only `Running` and `Off` are recognized.
    pub fn from_hyperv(raw: &str) -> Self {
        match raw {
            "Running" => VmState::Running,
            "Off" => VmState::Stopped,
            _ => VmState::Unknown,
        }
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmState::Running => write!(f, "Running"),
            VmState::Stopped => write!(f, "Stopped"),
            VmState::Unknown => write!(f, "Unknown"),
        }
    }
}
