//! Tick pump
//!
//! Drives `Bridge::tick` at a fixed interval. The bridge is single-threaded
//! (`Rc`), so the pump is a local task: run it inside a `tokio::task::LocalSet`.
//!
//! ```ignore
//! let shutdown = Shutdown::new();
//! let bridge = Rc::new(RefCell::new(Bridge::new(config, host, transport)));
//! let local = LocalSet::new();
//! local.run_until(async {
//!     let pump = Pump::spawn_local(bridge.clone(), interval, shutdown.subscribe());
//!     // ...
//!     shutdown.trigger().await;
//!     let stats = pump.await?;
//! }).await;
//! ```

use crate::bridge::{Bridge, TickReport};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Totals over the pump's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PumpStats {
    pub ticks: u64,
    pub dispatched: usize,
    pub failed: usize,
    pub sent: usize,
}

impl PumpStats {
    pub fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.dispatched += report.dispatched;
        self.failed += report.failed;
        self.sent += report.sent;
    }
}

pub struct Pump;

impl Pump {
    /// Tick `bridge` every `interval` until `shutdown` fires, then flush
    /// once more and return the totals.
    pub fn spawn_local(
        bridge: Rc<RefCell<Bridge>>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<PumpStats> {
        tokio::task::spawn_local(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut stats = PumpStats::default();
            info!(interval_ms = interval.as_millis() as u64, "pump running");

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        stats.sent += bridge.borrow_mut().flush();
                        info!(ticks = stats.ticks, "pump stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = bridge.borrow_mut().tick();
                        if !report.is_idle() {
                            debug!(?report, "tick");
                        }
                        stats.record(&report);
                    }
                }
            }
            stats
        })
    }

    /// Tick synchronously until a tick neither receives nor sends anything,
    /// or `max_ticks` is reached.
    pub fn run_until_idle(bridge: &mut Bridge, max_ticks: u64) -> PumpStats {
        let mut stats = PumpStats::default();
        while stats.ticks < max_ticks {
            let report = bridge.tick();
            stats.record(&report);
            if report.is_idle() && bridge.pending() == 0 {
                break;
            }
        }
        stats
    }
}
