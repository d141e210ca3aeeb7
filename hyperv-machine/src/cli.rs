//! Command-line argument parsing.

use clap::builder::TypedValueParser;
use clap::{Parser, Subcommand};
use hyperv_driver::{VmDescriptor, DEFAULT_CPU_COUNT, DEFAULT_IMAGE_FORMAT, DEFAULT_MEMORY_MB};
use std::path::PathBuf;

/// hyperv-machine - Manage a Hyper-V virtual machine
#[derive(Parser, Debug)]
#[command(name = "hyperv-machine")]
#[command(about = "hyperv-machine - Manage the lifecycle of a Hyper-V virtual machine")]
#[command(version)]
pub struct Args {
    /// Path to a YAML settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Directory holding one sub-directory per machine
    #[arg(long, env = "HYPERV_STORE_PATH")]
    pub store_path: Option<PathBuf>,

    /// Name of the virtual machine
    #[arg(long, env = "HYPERV_MACHINE_NAME", default_value = "crc")]
    pub machine_name: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Machine operations.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that a machine can be created on this host
    Precheck(CreateArgs),
    /// Create and start the machine
    Create(CreateArgs),
    /// Start the machine and wait for its address
    Start,
    /// Shut the machine down gracefully
    Stop,
    /// Power the machine off
    Kill,
    /// Stop then start the machine
    Restart,
    /// Remove the machine, powering it off first if needed
    Remove,
    /// Print the machine state
    Status,
    /// Print the machine IP address
    Ip,
    /// Print the Docker endpoint URL of the machine
    Url,
    /// Apply a JSON machine config, resizing memory, CPUs and disk as needed
    UpdateConfig {
        /// Path to the JSON payload
        payload: PathBuf,
    },
}

/// Options that shape a new machine.
#[derive(clap::Args, Debug, Clone)]
pub struct CreateArgs {
    /// URL of the bundle the disk image comes from
    #[arg(long = "hyperv-bundlepath-url", env = "HYPERV_BUNDLEPATH_URL")]
    pub bundle_url: Option<String>,

    /// Virtual switch name; without one the machine has no network adapter
    #[arg(long = "hyperv-virtual-switch", env = "HYPERV_VIRTUAL_SWITCH")]
    pub virtual_switch: Option<String>,

    /// Memory size for host in MB
    #[arg(long = "hyperv-memory", env = "HYPERV_MEMORY", default_value_t = DEFAULT_MEMORY_MB)]
    pub memory: u64,

    /// Number of CPUs for the machine
    #[arg(long = "hyperv-cpu-count", env = "HYPERV_CPU_COUNT", default_value_t = DEFAULT_CPU_COUNT)]
    pub cpu_count: u32,

    /// Hyper-V network adapter's static MAC address
    #[arg(long = "hyperv-static-macaddress", env = "HYPERV_STATIC_MACADDRESS")]
    pub mac_address: Option<String>,

    /// Disable dynamic memory management setting
    #[arg(long = "hyperv-disable-dynamic-memory", env = "HYPERV_DISABLE_DYNAMIC_MEMORY")]
    pub disable_dynamic_memory: bool,

    /// Disk image copied into the machine directory
    #[arg(long, env = "HYPERV_DISK_IMAGE", default_value = "", value_parser = clap::builder::OsStringValueParser::new().map(PathBuf::from))]
    pub disk_image: PathBuf,

    /// Disk image format
    #[arg(long, default_value = DEFAULT_IMAGE_FORMAT)]
    pub image_format: String,

    /// Disk capacity in bytes
    #[arg(long, default_value_t = 0)]
    pub disk_capacity: u64,

    /// SSH private key for the guest
    #[arg(long)]
    pub ssh_key_path: Option<PathBuf>,
}

impl CreateArgs {
    /// Bind the options onto a descriptor.
    pub fn apply(&self, descriptor: &mut VmDescriptor) {
        descriptor.bundle_url = self.bundle_url.clone();
        descriptor.virtual_switch = self.virtual_switch.clone();
        descriptor.memory = self.memory;
        descriptor.cpu = self.cpu_count;
        descriptor.mac_address = self.mac_address.clone();
        descriptor.disable_dynamic_memory = self.disable_dynamic_memory;
        descriptor.image_source_path = self.disk_image.clone();
        descriptor.image_format = self.image_format.clone();
        descriptor.disk_capacity = self.disk_capacity;
        descriptor.ssh_key_path = self.ssh_key_path.clone();
    }
}
