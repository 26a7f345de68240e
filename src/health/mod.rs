//! Upstream health checking.
//!
//! Unlike the multi-backend health machinery this crate inherited, there is
//! exactly one upstream here, so health state collapses to a single
//! [`HealthState`] behind an `RwLock`, with an `AtomicBool` fast path for
//! the readiness probe on the hot path of every `/readyz` call.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Liveness is separate from readiness: the proxy process is always alive
/// once it answers `/healthz` at all. Readiness reflects whether the last
/// probe reached the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Unknown,
}

/// Snapshot of the last upstream dial probe, read by `/readyz` under the
/// checker's lock.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub last_check_time: DateTime<Utc>,
    pub last_latency: Duration,
    pub last_error: Option<String>,
}

pub struct HealthChecker {
    target_addr: String,
    interval: Duration,
    dial_timeout: Duration,
    state: RwLock<HealthState>,
    last_probe: RwLock<Option<ProbeResult>>,
    ready: AtomicBool,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(target_addr: String, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            target_addr,
            interval,
            dial_timeout: Duration::from_secs(5),
            state: RwLock::new(HealthState::Unknown),
            last_probe: RwLock::new(None),
            ready: AtomicBool::new(false),
            start_time: Instant::now(),
        })
    }

    /// Fast, lock-free readiness check for the `/readyz` hot path.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub async fn state(&self) -> HealthState {
        *self.state.read().await
    }

    /// Seconds since this checker (and therefore the process) started.
    /// Liveness, per spec, is process health only — this never depends on
    /// probe results.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// The last dial probe's latency, error, and timestamp, or `None` before
    /// the first probe has run.
    pub async fn last_probe(&self) -> Option<ProbeResult> {
        self.last_probe.read().await.clone()
    }

    /// Runs one probe immediately, then on `interval` until `shutdown` fires.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.probe_once().await;
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await; // first tick fires immediately; already probed above

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.probe_once().await;
                    }
                    _ = shutdown.cancelled() => {
                        debug!("health checker stopping");
                        break;
                    }
                }
            }
        })
    }

    async fn probe_once(&self) {
        let dial_started = Instant::now();
        let (healthy, error) =
            match timeout(self.dial_timeout, TcpStream::connect(&self.target_addr)).await {
                Ok(Ok(_stream)) => (true, None),
                Ok(Err(e)) => {
                    warn!(error = %e, target = %self.target_addr, "upstream health probe failed");
                    (false, Some(e.to_string()))
                },
                Err(_) => {
                    warn!(target = %self.target_addr, timeout = ?self.dial_timeout, "upstream health probe timed out");
                    (false, Some("dial timed out".to_string()))
                },
            };
        let latency = dial_started.elapsed();

        let new_state = if healthy {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        };
        *self.state.write().await = new_state;
        *self.last_probe.write().await = Some(ProbeResult {
            last_check_time: Utc::now(),
            last_latency: latency,
            last_error: error,
        });
        self.ready.store(healthy, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn probe_marks_ready_when_upstream_accepts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });

        let checker = HealthChecker::new(addr.to_string(), Duration::from_secs(60));
        checker.probe_once().await;
        assert!(checker.is_ready());
        assert_eq!(checker.state().await, HealthState::Healthy);
        let probe = checker.last_probe().await.unwrap();
        assert!(probe.last_error.is_none());
    }

    #[tokio::test]
    async fn probe_marks_unhealthy_when_nothing_listens() {
        // Port 0 never accepts; pick a high port unlikely to be bound.
        let checker = HealthChecker::new("127.0.0.1:1".to_string(), Duration::from_secs(60));
        checker.probe_once().await;
        assert!(!checker.is_ready());
        assert_eq!(checker.state().await, HealthState::Unhealthy);
        let probe = checker.last_probe().await.unwrap();
        assert!(probe.last_error.is_some());
    }
}
