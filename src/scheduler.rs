// =============================================================================
// scheduler.rs - THE ETERNAL LOOP
// =============================================================================
//
// Poll every source, in order, with a short breather between them. Add up
// the numbers. Log a summary. Sleep. Do it again. Forever, or until someone
// hits Ctrl+C, or until `max_cycles` says we are done.
//
// No exponential backoff, no jitter, no circuit breakers. The interval is
// the interval, whether the last cycle went perfectly or caught fire.
//
// "Caught fire" in Rust means a panic. Pollers already contain every error
// they know about, so the only thing left to catch at this level is the
// thing nobody anticipated. Each cycle runs under catch_unwind; a panic gets
// logged and the loop carries on after the usual sleep.
//
// Everything runs on one task. Sources are polled one after another and the
// dedup store has exactly one owner: us.
// =============================================================================

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::dedup::DedupStore;
use crate::fetcher::PageFetcher;
use crate::models::{CycleStats, SourceConfig};
use crate::poller::SourcePoller;
use crate::publisher::Dispatcher;

/// Timing knobs for the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Sleep after every cycle, good or bad.
    pub poll_interval: Duration,
    /// Pause between two sources within one cycle. Not after the last one.
    pub source_pause: Duration,
    /// Stop after this many cycles. `None` runs until shutdown.
    pub max_cycles: Option<u64>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            source_pause: Duration::from_secs(2),
            max_cycles: None,
        }
    }
}

pub struct PollScheduler<F, D> {
    sources: Vec<SourceConfig>,
    poller: SourcePoller<F, D>,
    store: DedupStore,
    settings: SchedulerSettings,
    cycles_run: u64,
    lifetime: CycleStats,
}

impl<F, D> PollScheduler<F, D>
where
    F: PageFetcher,
    D: Dispatcher,
{
    pub fn new(
        sources: Vec<SourceConfig>,
        poller: SourcePoller<F, D>,
        store: DedupStore,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            sources,
            poller,
            store,
            settings,
            cycles_run: 0,
            lifetime: CycleStats::default(),
        }
    }

    /// One pass over every configured source.
    pub async fn run_cycle(&mut self) -> CycleStats {
        let mut totals = CycleStats::default();
        let last = self.sources.len().saturating_sub(1);

        for (index, source) in self.sources.iter().enumerate() {
            let stats = self.poller.poll(source, &mut self.store).await;
            info!(
                source = %source.name,
                new = stats.new,
                sent = stats.sent,
                duplicate = stats.duplicate,
                failed = stats.failed,
                "{}: {} new, {} sent",
                source.name,
                stats.new,
                stats.sent
            );
            totals += stats;

            if index < last {
                tokio::time::sleep(self.settings.source_pause).await;
            }
        }

        info!(
            total = totals.total,
            duplicate = totals.duplicate,
            "Cycle summary: {} new, {} sent, {} failed",
            totals.new,
            totals.sent,
            totals.failed
        );
        totals
    }

    /// Run cycles until `max_cycles` is reached or `shutdown` flips.
    /// Returns how many cycles were started.
    ///
    /// Shutdown is only observed between cycles; a fetch or dispatch that is
    /// already in flight runs to completion or to its own timeout.
    ///
    /// A closed shutdown channel is not a shutdown request. The loop logs it
    /// once and keeps polling until the process is stopped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        info!(
            sources = self.sources.len(),
            interval_secs = self.settings.poll_interval.as_secs(),
            "Scheduler online, polling every {}s",
            self.settings.poll_interval.as_secs()
        );

        let mut listening = true;
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.cycles_run += 1;
            let cycle = self.cycles_run;
            let started = Instant::now();
            info!(cycle = cycle, started_at = %Utc::now().to_rfc3339(), "Cycle #{} starting", cycle);

            match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                Ok(stats) => {
                    self.lifetime += stats;
                    info!(
                        cycle = cycle,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Cycle #{} done",
                        cycle
                    );
                }
                Err(panic) => {
                    error!(
                        cycle = cycle,
                        error = %panic_message(panic.as_ref()),
                        "Cycle #{} crashed, retrying after the usual interval",
                        cycle
                    );
                }
            }

            if self.settings.max_cycles.is_some_and(|max| cycle >= max) {
                info!(cycles = cycle, "Cycle limit reached, scheduler stopping");
                break;
            }

            info!("Waiting {}s before the next cycle", self.settings.poll_interval.as_secs());
            let wake = tokio::time::Instant::now() + self.settings.poll_interval;
            if idle_until(wake, &mut shutdown, &mut listening).await {
                info!("Scheduler received shutdown signal");
                break;
            }
        }

        info!(
            cycles = self.cycles_run,
            sent = self.lifetime.sent,
            failed = self.lifetime.failed,
            "Scheduler stopped"
        );
        self.cycles_run
    }

    /// Counters summed over every cycle that finished without panicking.
    pub fn lifetime_stats(&self) -> CycleStats {
        self.lifetime
    }

    #[cfg(test)]
    pub fn store(&self) -> &DedupStore {
        &self.store
    }
}

/// Sleep until `wake`. Returns true if shutdown was requested meanwhile.
async fn idle_until(
    wake: tokio::time::Instant,
    shutdown: &mut watch::Receiver<bool>,
    listening: &mut bool,
) -> bool {
    loop {
        let changed = tokio::select! {
            _ = tokio::time::sleep_until(wake) => return false,
            changed = shutdown.changed(), if *listening => changed,
        };

        match changed {
            Ok(()) if *shutdown.borrow() => return true,
            Ok(()) => {}
            Err(_) => {
                warn!("Shutdown channel closed, polling continues until the process is stopped");
                *listening = false;
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
