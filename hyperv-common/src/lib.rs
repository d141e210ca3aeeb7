//! # hyperv-common
//!
//! Shared utilities for the Hyper-V machine tools.
//!
//! ## Logging
//!
//! ```rust,ignore
//! use hyperv_common::{init_logging, LogFormat};
//!
//! init_logging("info", LogFormat::Pretty).unwrap();
//! tracing::info!(machine = "crc", "Creating VM...");
//! ```

pub mod logging;

pub use logging::{init_logging, LogFormat};
