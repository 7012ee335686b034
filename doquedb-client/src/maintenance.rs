//! Background pool maintenance.
//!
//! Once per period the reaper evicts the oldest idle channels beyond the
//! pool cap and reports them, together with channels discarded by callers,
//! to the server in one NO_REUSE_CONNECTION exchange. Failures are logged
//! and counted; they never reach a caller.

use crate::datasource::Inner;
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Snapshot of the maintenance counters of a data source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceStats {
    /// Maintenance cycles run.
    pub reaper_cycles: u64,
    /// Idle channels closed for exceeding the pool cap.
    pub evicted_channels: u64,
    /// Slave ids reported to the server as no longer reusable.
    pub reported_ids: u64,
    /// Eviction reports that failed or had no connection to go through.
    pub report_failures: u64,
    /// Failures ignored on best-effort teardown paths.
    pub swallowed_teardown_errors: u64,
    /// Full reconnects after a transport failure.
    pub reconnects: u64,
    /// Control connections opened beyond the first.
    pub connections_spawned: u64,
}

#[derive(Debug, Default)]
pub(crate) struct MaintenanceCounters {
    reaper_cycles: AtomicU64,
    evicted_channels: AtomicU64,
    reported_ids: AtomicU64,
    report_failures: AtomicU64,
    swallowed_teardown_errors: AtomicU64,
    reconnects: AtomicU64,
    connections_spawned: AtomicU64,
}

impl MaintenanceCounters {
    pub fn record_swallowed(&self) {
        self.swallowed_teardown_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_spawned(&self) {
        self.connections_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MaintenanceStats {
        MaintenanceStats {
            reaper_cycles: self.reaper_cycles.load(Ordering::Relaxed),
            evicted_channels: self.evicted_channels.load(Ordering::Relaxed),
            reported_ids: self.reported_ids.load(Ordering::Relaxed),
            report_failures: self.report_failures.load(Ordering::Relaxed),
            swallowed_teardown_errors: self.swallowed_teardown_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            connections_spawned: self.connections_spawned.load(Ordering::Relaxed),
        }
    }
}

/// Handle to the reaper thread of one open data source.
pub(crate) struct Reaper {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Reaper {
    pub fn start(inner: Weak<Inner>, period: Duration) -> std::io::Result<Self> {
        let (stop, stopped) = bounded(1);
        let handle = thread::Builder::new()
            .name("doquedb-reaper".to_string())
            .spawn(move || run(inner, period, stopped))?;
        Ok(Self { stop, handle })
    }

    /// Signals the thread and waits for it to finish its current cycle.
    pub fn stop(self) {
        drop(self.stop);
        if self.handle.join().is_err() {
            tracing::warn!("Pool reaper panicked");
        }
    }
}

fn run(inner: Weak<Inner>, period: Duration, stopped: Receiver<()>) {
    tracing::info!("Pool reaper started (period={}ms)", period.as_millis());
    let ticker = tick(period);
    loop {
        select! {
            recv(stopped) -> _ => break,
            recv(ticker) -> _ => {
                let Some(inner) = inner.upgrade() else { break };
                run_cycle(&inner);
            }
        }
    }
    tracing::info!("Pool reaper stopped");
}

/// One maintenance pass: trim the pool, then report what was dropped.
pub(crate) fn run_cycle(inner: &Inner) {
    let counters = &inner.counters;
    counters.reaper_cycles.fetch_add(1, Ordering::Relaxed);

    let (evicted, ids) = inner.trim_pool();
    if evicted > 0 {
        counters
            .evicted_channels
            .fetch_add(evicted as u64, Ordering::Relaxed);
        tracing::debug!("Evicted {} idle channels", evicted);
    }
    if ids.is_empty() {
        return;
    }

    let result = inner
        .client_connection()
        .and_then(|conn| conn.disconnect_ports(&ids));
    match result {
        Ok(()) => {
            counters
                .reported_ids
                .fetch_add(ids.len() as u64, Ordering::Relaxed);
        }
        Err(e) => {
            counters.report_failures.fetch_add(1, Ordering::Relaxed);
            inner.swallow("reporting evicted channels", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let counters = MaintenanceCounters::default();
        counters.record_reconnect();
        counters.record_swallowed();
        counters.record_swallowed();
        counters.record_connection_spawned();

        let stats = counters.snapshot();
        assert_eq!(stats.reconnects, 1);
        assert_eq!(stats.swallowed_teardown_errors, 2);
        assert_eq!(stats.connections_spawned, 1);
        assert_eq!(stats.reaper_cycles, 0);
    }

    #[test]
    fn test_reaper_stops_when_source_is_gone() {
        let reaper = Reaper::start(Weak::new(), Duration::from_millis(5)).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert!(reaper.handle.is_finished());
        reaper.stop();
    }

    #[test]
    fn test_reaper_stop_is_prompt() {
        let reaper = Reaper::start(Weak::new(), Duration::from_secs(3600)).unwrap();
        let started = std::time::Instant::now();
        reaper.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
