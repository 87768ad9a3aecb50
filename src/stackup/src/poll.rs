//! Bounded readiness polling.
//!
//! One primitive for every "wait until it answers" loop: probe at a fixed
//! interval until the probe succeeds or the ceiling passes. The returned
//! future carries its own deadline; dropping it cancels the wait.
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between the start of consecutive attempts
    pub interval: Duration,
    /// Hard limit on the waiting period
    pub ceiling: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, ceiling: Duration) -> Self {
        Self { interval, ceiling }
    }

    /// A single attempt may run at most one interval, so a hung probe cannot
    /// push the total past `ceiling + interval`.
    pub fn attempt_timeout(&self) -> Duration {
        self.interval.max(Duration::from_millis(1))
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(60))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready { attempts: u32, elapsed: Duration },
    TimedOut { attempts: u32, elapsed: Duration },
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Ready { attempts, .. } | PollOutcome::TimedOut { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            PollOutcome::Ready { elapsed, .. } | PollOutcome::TimedOut { elapsed, .. } => *elapsed,
        }
    }
}

/// Probe until it returns `true` or `policy.ceiling` has passed.
///
/// Attempts start at 0, interval, 2*interval, ... and one final attempt is
/// made at the ceiling itself.
pub async fn poll_until<F, Fut>(policy: &PollPolicy, mut probe: F) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let deadline = start + policy.ceiling;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let ready = tokio::time::timeout(policy.attempt_timeout(), probe())
            .await
            .unwrap_or(false);

        if ready {
            return PollOutcome::Ready {
                attempts,
                elapsed: start.elapsed(),
            };
        }

        let now = Instant::now();
        if now >= deadline {
            return PollOutcome::TimedOut {
                attempts,
                elapsed: start.elapsed(),
            };
        }

        let next = (start + policy.interval * attempts).max(now).min(deadline);
        tokio::time::sleep_until(next).await;
    }
}

/// Whether a TCP connection to `host:port` succeeds within `timeout`.
pub async fn tcp_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::debug!("[Poll] {}:{} not reachable: {}", host, port, e);
            false
        }
        Err(_) => {
            tracing::debug!("[Poll] {}:{} connect timed out after {:?}", host, port, timeout);
            false
        }
    }
}
