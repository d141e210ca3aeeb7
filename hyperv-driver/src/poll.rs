//! Bounded, cancellable polling of hypervisor state.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{DriverError, Result};

/// Default delay between two probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default time to wait for a guest to report an address.
pub const DEFAULT_IP_TIMEOUT: Duration = Duration::from_secs(600);

/// Default time to wait for a VM to power off.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(300);

/// How often to probe and how long to keep trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between probes
    pub interval: Duration,
    /// Give up after this long; `None` waits forever
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    /// Policy used while waiting for a guest IP.
    pub fn ip_default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, Some(DEFAULT_IP_TIMEOUT))
    }

    /// Policy used while waiting for a VM to stop.
    pub fn stop_default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, Some(DEFAULT_STOP_TIMEOUT))
    }
}

/// Call `probe` until it yields a value.
///
/// Probe errors end the loop immediately. Between probes the loop sleeps for
/// `policy.interval`; it fails with [`DriverError::Cancelled`] when `cancel`
/// fires and with [`DriverError::Timeout`] once the deadline has passed.
pub async fn poll_until<T, F, Fut>(
    policy: PollPolicy,
    cancel: &CancellationToken,
    what: &'static str,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = policy.timeout.map(|timeout| Instant::now() + timeout);
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled(what));
        }

        attempts += 1;
        if let Some(value) = probe().await? {
            debug!(what, attempts, "Condition reached");
            return Ok(value);
        }

        if let (Some(deadline), Some(timeout)) = (deadline, policy.timeout) {
            if Instant::now() + policy.interval > deadline {
                return Err(DriverError::Timeout { what, after: timeout });
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(DriverError::Cancelled(what)),
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(timeout: Option<Duration>) -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), timeout)
    }

    #[tokio::test]
    async fn test_poll_until_value() {
        let cancel = CancellationToken::new();
        let mut calls = 0;
        let value = poll_until(fast(None), &cancel, "value", || {
            calls += 1;
            let current = calls;
            async move { Ok(if current >= 3 { Some(current) } else { None }) }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_poll_until_timeout() {
        let cancel = CancellationToken::new();
        let result: Result<()> = poll_until(fast(Some(Duration::from_millis(20))), &cancel, "never", || async {
            Ok(None)
        })
        .await;
        assert!(matches!(result, Err(DriverError::Timeout { what: "never", .. })));
    }

    #[tokio::test]
    async fn test_poll_until_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> = poll_until(fast(None), &cancel, "cancelled", || async { Ok(None) }).await;
        assert!(matches!(result, Err(DriverError::Cancelled("cancelled"))));
    }

    #[tokio::test]
    async fn test_poll_until_cancelled_while_sleeping() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let policy = PollPolicy::new(Duration::from_secs(60), None);
        let result: Result<()> = poll_until(policy, &cancel, "slow", || async { Ok(None) }).await;
        assert!(matches!(result, Err(DriverError::Cancelled("slow"))));
    }

    #[tokio::test]
    async fn test_probe_error_propagates() {
        let cancel = CancellationToken::new();
        let result: Result<()> = poll_until(fast(None), &cancel, "state", || async {
            Err(DriverError::StateQueryFailed("boom".to_string()))
        })
        .await;
        assert!(matches!(result, Err(DriverError::StateQueryFailed(_))));
    }
}
