//! Repeating probe scheduler with proxy rotation
//!
//! Drives the [`Prober`] on a fixed interval until the configured count is
//! reached or the shutdown channel flips to `true`. Each tick awaits its probe
//! before the next tick is polled, so at most one probe is ever in flight and
//! the rotation cursor always matches logical tick order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::models::{ProbeResult, ProxyConfig};
use crate::output::ResultSink;
use crate::probe::Prober;

/// Default interval between probe starts
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// Default number of probes per run
pub const DEFAULT_COUNT: usize = 10;

/// Smallest interval accepted by the timer
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Parameters of one scheduled run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Time between probe starts
    pub interval: Duration,
    /// Total number of probes
    pub count: usize,
    /// Rotate through the proxy pool (falls back to direct when the pool is empty)
    pub use_proxy: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            count: DEFAULT_COUNT,
            use_proxy: true,
        }
    }
}

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Configured count reached
    Completed,
    /// Shutdown requested before the count was reached
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub outcome: RunOutcome,
}

/// Runs probes on a timer, rotating through an ordered proxy pool
pub struct Scheduler {
    prober: Arc<Prober>,
    pool: Vec<ProxyConfig>,
    cursor: usize,
    completed: usize,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(prober: Prober, pool: Vec<ProxyConfig>) -> Self {
        Self {
            prober: Arc::new(prober),
            pool,
            cursor: 0,
            completed: 0,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Index of the proxy the next proxied tick will use
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Probes finished so far, successful or not
    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn pool(&self) -> &[ProxyConfig] {
        &self.pool
    }

    /// Run the schedule to completion or until `shutdown` becomes `true`.
    ///
    /// Cancellation does not wait for an in-flight probe; its result is
    /// discarded. A scheduler runs once: calling `run` again after it stopped
    /// returns immediately.
    #[instrument(
        skip(self, sink, shutdown),
        fields(count = schedule.count, use_proxy = schedule.use_proxy)
    )]
    pub async fn run<S: ResultSink + ?Sized>(
        &mut self,
        schedule: &Schedule,
        sink: &mut S,
        mut shutdown: watch::Receiver<bool>,
    ) -> RunSummary {
        if self.state == SchedulerState::Stopped {
            warn!("Scheduler already stopped, ignoring run request");
            return self.summary(RunOutcome::Completed);
        }

        self.state = SchedulerState::Running;
        let proxied = schedule.use_proxy && !self.pool.is_empty();
        if schedule.use_proxy && !proxied {
            info!("Proxy mode requested but pool is empty, probing directly");
        }
        info!(
            "Starting {} probes every {}ms ({})",
            schedule.count,
            schedule.interval.as_millis(),
            if proxied { "rotating proxies" } else { "direct" }
        );

        let mut ticker = interval(schedule.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.completed < schedule.count {
            tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => return self.cancel(schedule),
                _ = ticker.tick() => {}
            }

            let route = if proxied {
                Some(self.pool[self.cursor].clone())
            } else {
                None
            };

            let prober = self.prober.clone();
            let mut task = tokio::spawn(async move {
                match route {
                    Some(proxy) => prober.probe_via_proxy(&proxy).await,
                    None => prober.probe_direct().await,
                }
            });

            let joined = tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => {
                    task.abort();
                    return self.cancel(schedule);
                }
                joined = &mut task => joined,
            };

            if proxied {
                self.cursor = (self.cursor + 1) % self.pool.len();
            }

            match joined {
                Ok(result) => sink.record(&result),
                Err(e) => error!(
                    "Probe dispatch failed on tick {}: {}",
                    self.completed + 1,
                    e
                ),
            }
            self.completed += 1;
            debug!(completed = self.completed, cursor = self.cursor, "tick finished");
        }

        self.state = SchedulerState::Stopped;
        info!("All {} probes completed", self.completed);
        self.summary(RunOutcome::Completed)
    }

    /// Run one probe outside the schedule.
    ///
    /// With `use_proxy` and a non-empty pool, probes through
    /// `pool[proxy_index % len]`, or through the proxy at the current cursor
    /// when no index is given. The cursor is never advanced.
    pub async fn single_test(&self, use_proxy: bool, proxy_index: Option<usize>) -> ProbeResult {
        match self.select_single(use_proxy, proxy_index) {
            Some(proxy) => self.prober.probe_via_proxy(proxy).await,
            None => self.prober.probe_direct().await,
        }
    }

    fn select_single(&self, use_proxy: bool, proxy_index: Option<usize>) -> Option<&ProxyConfig> {
        if !use_proxy || self.pool.is_empty() {
            return None;
        }
        let index = proxy_index.unwrap_or(self.cursor) % self.pool.len();
        self.pool.get(index)
    }

    fn cancel(&mut self, schedule: &Schedule) -> RunSummary {
        self.state = SchedulerState::Stopped;
        warn!(
            "Forced shutdown: {} of {} probes completed",
            self.completed, schedule.count
        );
        self.summary(RunOutcome::Cancelled)
    }

    fn summary(&self, outcome: RunOutcome) -> RunSummary {
        RunSummary {
            completed: self.completed,
            outcome,
        }
    }
}

/// Resolves once shutdown is requested. A dropped sender never cancels.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
