//! # hyperv-driver
//!
//! Lifecycle driver for a single Hyper-V virtual machine.
//!
//! The driver creates, starts, stops, kills, restarts and removes one VM,
//! resolves its network address and reconciles configuration updates. The
//! hypervisor is reached through the [`Hypervisor`] command backend:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HypervDriver               │
//! │  (create, start, stop, kill, remove)    │
//! └─────────────────────┬───────────────────┘
//!                       │ HypervCommand
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │ PowerShellBackend │     │    MockBackend    │
//! │  (Hyper-V module) │     │    (in memory)    │
//! └───────────────────┘     └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hyperv_driver::{HypervDriver, PowerShellBackend, VmDescriptor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let descriptor = VmDescriptor::new("crc", "C:\\machines\\crc")
//!         .with_virtual_switch("ExternalSwitch")
//!         .with_disk_image("C:\\bundles\\crc.vhdx", "vhdx");
//!
//!     let mut driver = HypervDriver::new(Arc::new(PowerShellBackend::new()), descriptor);
//!     driver.pre_create_check().await.unwrap();
//!     driver.create().await.unwrap();
//!     println!("{:?}", driver.url().await.unwrap());
//! }
//! ```

pub mod command;
pub mod driver;
pub mod error;
pub mod mock;
pub mod network;
pub mod parse;
pub mod poll;
pub mod powershell;
pub mod preflight;
pub mod reconcile;
pub mod state;
pub mod traits;
pub mod types;

pub use command::HypervCommand;
pub use driver::{HypervDriver, DRIVER_NAME};
pub use error::{DriverError, Result};
pub use mock::MockBackend;
pub use poll::PollPolicy;
pub use powershell::PowerShellBackend;
pub use reconcile::ConfigDiff;
pub use traits::Hypervisor;
pub use types::*;
