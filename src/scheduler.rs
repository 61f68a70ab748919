//! Pass scheduling: periodic ticks and on-demand triggers.
//!
//! At most one diagnostic pass runs at a time. Both triggers go through a
//! non-blocking gate: if a pass is already in flight the new request is
//! refused immediately instead of queueing, so detached passes can never
//! pile up behind a slow Home Assistant instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::{DiagnosticEngine, PassReport};

/// Result of asking for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAck {
    /// A new pass was launched.
    Started,
    /// Another pass is still running; nothing was launched.
    AlreadyRunning,
}

/// Drives the [`DiagnosticEngine`].
#[derive(Clone)]
pub struct Scheduler {
    engine: Arc<DiagnosticEngine>,
    running: Arc<AtomicBool>,
}

/// Clears the running flag when the pass ends, including on panic.
struct PassGuard {
    running: Arc<AtomicBool>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

impl Scheduler {
    /// Create a scheduler around an engine.
    pub fn new(engine: Arc<DiagnosticEngine>) -> Self {
        Self {
            engine,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a pass is currently in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Launch a detached pass and return without waiting for it.
    pub fn trigger(&self) -> TriggerAck {
        let Some(guard) = self.try_begin() else {
            return TriggerAck::AlreadyRunning;
        };
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            let _guard = guard;
            engine.run_pass().await;
        });
        TriggerAck::Started
    }

    /// Run a pass in the caller's task. Returns `None` if one is already running.
    pub async fn run_now(&self) -> Option<PassReport> {
        let _guard = self.try_begin()?;
        Some(self.engine.run_pass().await)
    }

    /// Trigger a pass every `interval` until shutdown is signalled.
    ///
    /// The first pass fires one full interval after start. Ticks that land
    /// while a pass is still running are skipped.
    pub async fn run_periodic(&self, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "periodic diagnostics started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip the first immediate tick.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    info!("scheduled diagnostic pass");
                    if self.trigger() == TriggerAck::AlreadyRunning {
                        warn!("previous pass still running, skipping tick");
                    }
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        debug!("periodic diagnostics shutting down");
                        break;
                    }
                }
            }
        }

        info!("periodic diagnostics stopped");
    }

    fn try_begin(&self) -> Option<PassGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(PassGuard {
            running: Arc::clone(&self.running),
        })
    }
}

/// Parse the `cron_interval` setting: a whole, positive number of minutes.
///
/// Returns `None` for anything else, which disables periodic passes.
pub fn parse_interval(raw: &str) -> Option<Duration> {
    let minutes: u64 = raw.trim().parse().ok()?;
    if minutes == 0 {
        return None;
    }
    minutes.checked_mul(60).map(Duration::from_secs)
}
