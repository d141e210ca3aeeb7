//! Virtual switch selection and guest address discovery.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::command::HypervCommand;
use crate::error::{DriverError, Result};
use crate::parse::parse_lines;
use crate::poll::{poll_until, PollPolicy};
use crate::state::query_state;
use crate::traits::Hypervisor;
use crate::types::VmState;

/// Check that the requested switch exists on the host.
///
/// The name must match an existing switch exactly.
#[instrument(skip(backend))]
pub async fn choose_switch(backend: &dyn Hypervisor, requested: &str) -> Result<String> {
    if requested.is_empty() {
        return Err(DriverError::NoSwitchConfigured);
    }

    let stdout = backend.execute(&HypervCommand::ListSwitches).await?;
    let switches = parse_lines(&stdout);
    debug!(?switches, "Available virtual switches");

    if switches.iter().any(|name| name == requested) {
        Ok(requested.to_string())
    } else {
        Err(DriverError::SwitchNotFound(requested.to_string()))
    }
}

/// Current address of a running, networked VM.
#[instrument(skip(backend))]
pub async fn get_ip(backend: &dyn Hypervisor, machine: &str, switch: Option<&str>) -> Result<String> {
    if query_state(backend, machine).await? != VmState::Running {
        return Err(DriverError::HostNotRunning);
    }
    if switch.map_or(true, str::is_empty) {
        return Err(DriverError::NoSwitchConfigured);
    }

    let stdout = backend
        .execute(&HypervCommand::GetIpAddress { name: machine.to_string() })
        .await?;

    parse_lines(&stdout)
        .into_iter()
        .next()
        .ok_or(DriverError::IpNotFound)
}

/// Wait until the guest reports an address.
///
/// Failed probes count as "not yet": the guest may still be booting.
pub async fn wait_for_ip(
    backend: &dyn Hypervisor,
    machine: &str,
    switch: Option<&str>,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<String> {
    if switch.map_or(true, str::is_empty) {
        return Err(DriverError::NoSwitchConfigured);
    }

    info!(machine, "Waiting for host to start...");

    poll_until(policy, cancel, "guest IP address", move || async move {
        match get_ip(backend, machine, switch).await {
            Ok(ip) if !ip.is_empty() => Ok(Some(ip)),
            Ok(_) => Ok(None),
            Err(e) => {
                debug!(error = %e, "No address yet");
                Ok(None)
            }
        }
    })
    .await
}
