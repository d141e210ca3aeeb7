//! Lifecycle controller for a single Hyper-V VM.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::command::{HypervCommand, MAX_MEMORY_MB};
use crate::error::{DriverError, Result};
use crate::network::{choose_switch, get_ip, wait_for_ip};
use crate::poll::{poll_until, PollPolicy};
use crate::preflight::pre_create_check;
use crate::reconcile::ConfigDiff;
use crate::state::query_state;
use crate::traits::Hypervisor;
use crate::types::{VmDescriptor, VmState, DOCKER_PORT};

/// Name under which this driver is registered.
pub const DRIVER_NAME: &str = "hyperv";

/// Hyper-V machine driver.
///
/// Owns the descriptor of one VM and drives it through
/// create → start ⇄ stop/kill → remove. The hypervisor is the only source of
/// truth for the VM state: it is queried on every call and never cached.
/// Mutating operations take `&mut self`, so one driver value never runs two
/// lifecycle operations at once.
pub struct HypervDriver {
    backend: Arc<dyn Hypervisor>,
    descriptor: VmDescriptor,
    ip_wait: PollPolicy,
    stop_wait: PollPolicy,
    cancel: CancellationToken,
}

impl HypervDriver {
    /// Create a driver for the given descriptor.
    pub fn new(backend: Arc<dyn Hypervisor>, descriptor: VmDescriptor) -> Self {
        Self {
            backend,
            descriptor,
            ip_wait: PollPolicy::ip_default(),
            stop_wait: PollPolicy::stop_default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Override the polling policies used while starting and stopping.
    pub fn with_polling(mut self, ip_wait: PollPolicy, stop_wait: PollPolicy) -> Self {
        self.ip_wait = ip_wait;
        self.stop_wait = stop_wait;
        self
    }

    /// Use an externally owned cancellation token for polling.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts in-flight polling when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn descriptor(&self) -> &VmDescriptor {
        &self.descriptor
    }

    pub fn into_descriptor(self) -> VmDescriptor {
        self.descriptor
    }

    pub fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    pub fn ssh_key_path(&self) -> Option<&Path> {
        self.descriptor.ssh_key_path.as_deref()
    }

    fn machine(&self) -> String {
        self.descriptor.machine_name.clone()
    }

    async fn run(&self, command: HypervCommand) -> Result<String> {
        self.backend.execute(&command).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Check that creation can be started safely.
    pub async fn pre_create_check(&self) -> Result<()> {
        pre_create_check(self.backend.as_ref(), self.descriptor.requested_switch()).await
    }

    /// Create the VM and start it.
    ///
    /// Steps run in order and the first failure aborts; nothing already
    /// applied is rolled back.
    #[instrument(skip(self), fields(machine = %self.descriptor.machine_name))]
    pub async fn create(&mut self) -> Result<()> {
        check_memory(self.descriptor.memory)?;

        let disk_path = self.descriptor.disk_path();
        debug!(
            source = %self.descriptor.image_source_path.display(),
            target = %disk_path.display(),
            "Copying disk image"
        );
        tokio::fs::create_dir_all(&self.descriptor.store_path).await?;
        tokio::fs::copy(&self.descriptor.image_source_path, &disk_path).await?;

        let switch = match self.descriptor.requested_switch() {
            Some(requested) => {
                let switch = choose_switch(self.backend.as_ref(), requested).await?;
                info!(switch = %switch, "Using switch");
                Some(switch)
            }
            None => None,
        };

        info!("Creating VM...");
        self.run(HypervCommand::NewVm {
            name: self.machine(),
            path: self.descriptor.store_path.clone(),
            memory_mb: self.descriptor.memory,
            switch: switch.clone(),
        })
        .await?;

        if switch.is_none() {
            self.run(HypervCommand::RemoveNetworkAdapter { name: self.machine() }).await?;
        }

        if self.descriptor.disable_dynamic_memory {
            self.run(HypervCommand::DisableDynamicMemory { name: self.machine() }).await?;
        }

        if self.descriptor.cpu > 1 {
            self.run(HypervCommand::SetProcessorCount {
                name: self.machine(),
                count: self.descriptor.cpu,
            })
            .await?;
        }

        if let (Some(_), Some(mac)) = (&switch, self.descriptor.requested_mac()) {
            self.run(HypervCommand::SetStaticMacAddress {
                name: self.machine(),
                mac: mac.to_string(),
            })
            .await?;
        }

        self.run(HypervCommand::AddHardDiskDrive {
            name: self.machine(),
            path: disk_path,
        })
        .await?;

        info!("Starting VM...");
        self.start().await
    }

    /// Start the VM and, when networked, wait for its address.
    #[instrument(skip(self), fields(machine = %self.descriptor.machine_name))]
    pub async fn start(&mut self) -> Result<()> {
        self.run(HypervCommand::StartVm { name: self.machine() }).await?;

        let Some(switch) = self.descriptor.requested_switch() else {
            debug!("No virtual switch, not waiting for an address");
            return Ok(());
        };

        let ip = wait_for_ip(
            self.backend.as_ref(),
            &self.descriptor.machine_name,
            Some(switch),
            self.ip_wait,
            &self.cancel,
        )
        .await?;

        info!(ip = %ip, "VM is up");
        self.descriptor.ip_address = Some(ip);
        Ok(())
    }

    /// Shut the VM down gracefully and wait until it is no longer running.
    #[instrument(skip(self), fields(machine = %self.descriptor.machine_name))]
    pub async fn stop(&mut self) -> Result<()> {
        self.run(HypervCommand::StopVm { name: self.machine() }).await?;
        self.wait_stopped().await?;
        self.descriptor.ip_address = None;
        Ok(())
    }

    /// Power the VM off and wait until it is no longer running.
    #[instrument(skip(self), fields(machine = %self.descriptor.machine_name))]
    pub async fn kill(&mut self) -> Result<()> {
        self.run(HypervCommand::TurnOffVm { name: self.machine() }).await?;
        self.wait_stopped().await?;
        self.descriptor.ip_address = None;
        Ok(())
    }

    /// Stop then start. A failed stop is returned as-is and start is skipped.
    pub async fn restart(&mut self) -> Result<()> {
        self.stop().await?;
        self.start().await
    }

    /// Remove the VM, powering it off first if it is running.
    #[instrument(skip(self), fields(machine = %self.descriptor.machine_name))]
    pub async fn remove(&mut self) -> Result<()> {
        if self.state().await? == VmState::Running {
            warn!("VM is running, turning it off before removal");
            self.kill().await?;
        }

        self.run(HypervCommand::RemoveVm { name: self.machine() }).await?;
        info!("VM removed");
        Ok(())
    }

    async fn wait_stopped(&self) -> Result<()> {
        info!("Waiting for host to stop...");
        let backend = self.backend.as_ref();
        let machine = self.descriptor.machine_name.as_str();

        poll_until(self.stop_wait, &self.cancel, "VM to stop", move || async move {
            let state = query_state(backend, machine).await?;
            Ok((state != VmState::Running).then_some(state))
        })
        .await?;

        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current canonical state, always fetched from the hypervisor.
    pub async fn state(&self) -> Result<VmState> {
        query_state(self.backend.as_ref(), &self.descriptor.machine_name).await
    }

    /// Current guest address.
    pub async fn ip(&self) -> Result<String> {
        get_ip(
            self.backend.as_ref(),
            &self.descriptor.machine_name,
            self.descriptor.requested_switch(),
        )
        .await
    }

    /// Hostname to reach the guest over SSH.
    pub async fn ssh_hostname(&self) -> Result<String> {
        self.ip().await
    }

    /// Docker endpoint of the guest.
    ///
    /// A running guest that has not reported an address yet yields `None`;
    /// every other failure of [`Self::ip`] is returned.
    pub async fn url(&self) -> Result<Option<String>> {
        match self.ip().await {
            Ok(ip) => Ok(Some(endpoint_url(&ip))),
            Err(DriverError::IpNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Configuration updates
    // =========================================================================

    /// Decode a JSON descriptor and converge the VM to it.
    pub async fn update_config_raw(&mut self, raw: &[u8]) -> Result<()> {
        let desired: VmDescriptor = serde_json::from_slice(raw)?;
        self.update_config(desired).await
    }

    /// Apply memory, CPU and disk changes, then adopt `desired` wholesale.
    ///
    /// The held descriptor is only replaced once every command succeeded.
    #[instrument(skip(self, desired), fields(machine = %self.descriptor.machine_name))]
    pub async fn update_config(&mut self, desired: VmDescriptor) -> Result<()> {
        let diff = ConfigDiff::between(&self.descriptor, &desired);
        if let Some(memory) = diff.memory {
            check_memory(memory)?;
        }

        if let Some(memory) = diff.memory {
            debug!("Updating memory from {} MB to {} MB", self.descriptor.memory, memory);
        }
        if let Some(cpu) = diff.cpu {
            debug!("Updating CPU count from {} to {}", self.descriptor.cpu, cpu);
        }
        if let Some(capacity) = diff.disk_capacity {
            debug!(
                "Resizing disk from {} bytes to {} bytes",
                self.descriptor.disk_capacity, capacity
            );
        }

        for command in diff.commands(&self.descriptor) {
            if let Err(e) = self.backend.execute(&command).await {
                warn!(command = %command, error = %e, "Failed to apply configuration change");
                return Err(e);
            }
        }

        self.descriptor = desired;
        Ok(())
    }
}

fn check_memory(memory_mb: u64) -> Result<()> {
    if memory_mb > MAX_MEMORY_MB {
        return Err(DriverError::InvalidMemory(memory_mb));
    }
    Ok(())
}

/// Format the Docker endpoint for an address.
fn endpoint_url(ip: &str) -> String {
    match ip.parse::<IpAddr>() {
        Ok(addr) => format!("tcp://{}", SocketAddr::new(addr, DOCKER_PORT)),
        Err(_) => format!("tcp://{}:{}", ip, DOCKER_PORT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(endpoint_url("192.168.1.50"), "tcp://192.168.1.50:2376");
        assert_eq!(endpoint_url("fe80::1"), "tcp://[fe80::1]:2376");
        assert_eq!(endpoint_url("crc.local"), "tcp://crc.local:2376");
    }

    #[test]
    fn test_check_memory() {
        assert!(check_memory(8192).is_ok());
        assert!(check_memory(MAX_MEMORY_MB).is_ok());
        assert!(matches!(
            check_memory(MAX_MEMORY_MB + 1),
            Err(DriverError::InvalidMemory(m)) if m == MAX_MEMORY_MB + 1
        ));
    }
}
