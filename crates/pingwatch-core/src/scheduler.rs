//! Per-source interval scheduling.
//!
//! The scheduler owns its pending entries outright and is only driven from a
//! single task, so no locking is involved. Each tick fires every due entry by
//! spawning an unjoined probe task and immediately moving the same entry to
//! `now + interval`. A source therefore always has exactly one pending entry
//! per registration, even while its previous probe is still running.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{MonitorConfig, OverlapPolicy};
use crate::error::SourceError;
use crate::probe::ProbeDispatcher;
use crate::source::{Source, SourceRegistry, MAX_INTERVAL_SECS};

const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct ScheduledEntry {
    pub source: Source,
    pub due_at: Instant,
    in_flight: Arc<AtomicBool>,
}

impl ScheduledEntry {
    fn new(source: Source, due_at: Instant) -> Self {
        Self {
            source,
            due_at,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Clears the in-flight flag when the probe task ends, including on panic.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct IntervalScheduler {
    entries: Vec<ScheduledEntry>,
    dispatcher: Arc<ProbeDispatcher>,
    overlap_policy: OverlapPolicy,
}

impl IntervalScheduler {
    pub fn new(dispatcher: Arc<ProbeDispatcher>, config: &MonitorConfig) -> Self {
        Self {
            entries: Vec::new(),
            dispatcher,
            overlap_policy: config.overlap_policy,
        }
    }

    /// Schedule a source to fire on the next tick.
    pub fn register(&mut self, source: Source) -> Result<(), SourceError> {
        self.register_at(source, Instant::now())
    }

    pub fn register_at(&mut self, source: Source, now: Instant) -> Result<(), SourceError> {
        source.validate()?;
        debug!(url = %source.endpoint, interval_secs = source.interval.as_secs(), "Source registered");
        self.entries.push(ScheduledEntry::new(source, now));
        Ok(())
    }

    pub fn register_all(&mut self, registry: &SourceRegistry) -> Result<usize, SourceError> {
        for source in registry {
            self.register(source.clone())?;
        }
        Ok(registry.len())
    }

    pub fn pending(&self) -> &[ScheduledEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tick(&mut self) -> Vec<Source> {
        self.tick_at(Instant::now())
    }

    /// Fire every entry due at `now`, in registration order, and reschedule it.
    /// Returns the sources whose probes were dispatched.
    pub fn tick_at(&mut self, now: Instant) -> Vec<Source> {
        let mut fired = Vec::new();

        for entry in self.entries.iter_mut().filter(|e| e.due_at <= now) {
            if self.overlap_policy == OverlapPolicy::SkipInFlight && entry.is_in_flight() {
                debug!(url = %entry.source.endpoint, "Previous probe still running, skipping");
            } else {
                spawn_probe(&self.dispatcher, entry);
                fired.push(entry.source.clone());
            }
            entry.due_at = next_due(now, entry.source.interval);
        }

        fired
    }

    /// Drive [`tick`](Self::tick) every `tick_period` until `shutdown` resolves.
    ///
    /// Returns immediately when nothing is registered. Probes already in
    /// flight at shutdown are left to finish on their own.
    pub async fn run_forever(&mut self, tick_period: Duration, shutdown: impl Future<Output = ()>) {
        if self.entries.is_empty() {
            warn!("No sources to monitor");
            return;
        }

        info!(
            sources = self.entries.len(),
            tick_ms = tick_period.as_millis() as u64,
            "Scheduler started"
        );

        let mut ticker = tokio::time::interval(tick_period.max(MIN_TICK_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let fired = self.tick();
                    if !fired.is_empty() {
                        debug!(count = fired.len(), "Dispatched probes");
                    }
                }
            }
        }
    }
}

/// `now + interval`, capped so an out-of-range instant can never panic the tick loop.
fn next_due(now: Instant, interval: Duration) -> Instant {
    now.checked_add(interval)
        .or_else(|| now.checked_add(Duration::from_secs(MAX_INTERVAL_SECS)))
        .unwrap_or(now)
}

fn spawn_probe(dispatcher: &Arc<ProbeDispatcher>, entry: &ScheduledEntry) {
    entry.in_flight.store(true, Ordering::Release);
    let guard = InFlightGuard(Arc::clone(&entry.in_flight));
    let dispatcher = Arc::clone(dispatcher);
    let source = entry.source.clone();

    tokio::spawn(async move {
        let _guard = guard;
        dispatcher.probe(&source).await;
    });
}
