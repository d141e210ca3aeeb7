//! # hyperv-machine
//!
//! Command-line front end for the Hyper-V driver. Each invocation manages one
//! machine whose descriptor lives in `<store path>/<machine name>/config.json`.
//!
//! ## Usage
//! ```bash
//! hyperv-machine create --disk-image crc.vhdx --hyperv-virtual-switch ExternalSwitch
//! hyperv-machine ip
//! hyperv-machine remove
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{debug, info, warn};

use hyperv_driver::{HypervDriver, Hypervisor, PowerShellBackend, VmDescriptor};

mod cli;
mod config;
mod store;

use cli::{Args, Command, CreateArgs};
use config::Config;
use store::MachineStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration, CLI flags win over the file
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    }
    .with_cli_overrides(&args)?;

    hyperv_common::init_logging(&config.logging.level, config.logging.format)?;

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        machine = %args.machine_name,
        "Starting hyperv-machine"
    );

    let backend: Arc<dyn Hypervisor> = match &config.hyperv.powershell_path {
        Some(path) => Arc::new(PowerShellBackend::with_executable(path)),
        None => Arc::new(PowerShellBackend::new()),
    };

    let store = MachineStore::new(config.machine_dir(&args.machine_name));

    match args.command {
        Command::Precheck(ref create) => {
            let descriptor = new_descriptor(&args.machine_name, &store, create);
            HypervDriver::new(backend, descriptor).pre_create_check().await?;
            println!("Host is ready to create {}", args.machine_name);
        }
        Command::Create(ref create) => {
            if create.disk_image.as_os_str().is_empty() {
                bail!("--disk-image is required to create a machine");
            }
            let descriptor = new_descriptor(&args.machine_name, &store, create);
            let mut driver = build_driver(backend, descriptor, &config);

            driver.pre_create_check().await?;
            // Saved before creation so a half-created machine can still be removed
            store.save(driver.descriptor())?;
            let result = driver.create().await;
            store.save(driver.descriptor())?;
            result?;

            info!(machine = %args.machine_name, "Machine created");
        }
        Command::Start => {
            let mut driver = build_driver(backend, store.load()?, &config);
            let result = driver.start().await;
            store.save(driver.descriptor())?;
            result?;
        }
        Command::Stop => {
            let mut driver = build_driver(backend, store.load()?, &config);
            let result = driver.stop().await;
            store.save(driver.descriptor())?;
            result?;
        }
        Command::Kill => {
            let mut driver = build_driver(backend, store.load()?, &config);
            let result = driver.kill().await;
            store.save(driver.descriptor())?;
            result?;
        }
        Command::Restart => {
            let mut driver = build_driver(backend, store.load()?, &config);
            let result = driver.restart().await;
            store.save(driver.descriptor())?;
            result?;
        }
        Command::Remove => {
            let mut driver = build_driver(backend, store.load()?, &config);
            driver.remove().await?;
            store.delete()?;
            info!(machine = %args.machine_name, "Machine removed");
        }
        Command::Status => {
            let driver = build_driver(backend, store.load()?, &config);
            println!("{}", driver.state().await?);
        }
        Command::Ip => {
            let driver = build_driver(backend, store.load()?, &config);
            println!("{}", driver.ip().await?);
        }
        Command::Url => {
            let driver = build_driver(backend, store.load()?, &config);
            match driver.url().await? {
                Some(url) => println!("{}", url),
                None => warn!(machine = %args.machine_name, "Machine has no address yet"),
            }
        }
        Command::UpdateConfig { ref payload } => {
            let raw = std::fs::read(payload)
                .with_context(|| format!("Failed to read {}", payload.display()))?;
            let mut driver = build_driver(backend, store.load()?, &config);
            driver.update_config_raw(&raw).await?;
            store.save(driver.descriptor())?;
            info!(machine = %args.machine_name, "Machine config updated");
        }
    }

    Ok(())
}

fn new_descriptor(machine_name: &str, store: &MachineStore, create: &CreateArgs) -> VmDescriptor {
    let mut descriptor = VmDescriptor::new(machine_name, store.dir());
    create.apply(&mut descriptor);
    descriptor
}

/// Build a driver whose waits are cut short by Ctrl-C.
fn build_driver(backend: Arc<dyn Hypervisor>, descriptor: VmDescriptor, config: &Config) -> HypervDriver {
    let driver = HypervDriver::new(backend, descriptor)
        .with_polling(config.polling.ip_policy(), config.polling.stop_policy());

    let cancel = driver.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    driver
}
