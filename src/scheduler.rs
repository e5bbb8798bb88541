//! Tick scheduler.
//!
//! Drives a bounded number of sampling rounds ("ticks"). Each tick:
//!
//! 1. generates one [`TimeRange`] ending now,
//! 2. spawns one task per catalog query on a [`JoinSet`]; each task runs the
//!    backend query, flattens the matrix and emits its [`QueryResult`],
//! 3. joins every task before the tick is considered finished.
//!
//! The pause between ticks starts once the previous tick has been joined, so
//! slow queries stretch the period instead of overlapping ticks. No pause
//! follows the final tick.
//!
//! Failed queries are reported as [`Outcome::Failure`] and never affect
//! sibling queries or later ticks; there are no retries within a tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, BackendError, DEFAULT_STEP};
use crate::catalog::{Query, QueryCatalog};
use crate::config::{DEFAULT_INTERVAL, DEFAULT_TICKS};
use crate::extract::{Notice, flatten};
use crate::outcome::{Outcome, QueryResult};
use crate::sink::ResultSink;
use crate::timerange::{DEFAULT_WINDOW, TimeRange};

/// Default per-query timeout (30 seconds).
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of ticks to run.
    pub ticks: u64,
    /// Pause between the end of one tick and the start of the next.
    pub interval: Duration,
    /// Width of each tick's query window.
    pub window: Duration,
    /// Range-query resolution.
    pub step: Duration,
    /// Upper bound for a single backend call.
    pub query_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ticks: DEFAULT_TICKS,
            interval: DEFAULT_INTERVAL,
            window: DEFAULT_WINDOW,
            step: DEFAULT_STEP,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Between ticks, or finished once `completed_ticks` reaches the target.
    Idle { completed_ticks: u64 },
    /// One tick in flight.
    Sampling { tick: u64 },
}

/// Totals of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks fully joined.
    pub ticks: u64,
    /// Query outcomes observed, successes plus failures.
    pub results: u64,
    /// Failed query outcomes.
    pub failures: u64,
    /// Whether the run stopped early on the shutdown token.
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct TickReport {
    results: u64,
    failures: u64,
}

/// Periodic multi-query sampler.
pub struct Scheduler {
    backend: Arc<dyn Backend>,
    catalog: Arc<QueryCatalog>,
    sink: Arc<dyn ResultSink>,
    config: SchedulerConfig,
    state: watch::Sender<SchedulerState>,
}

impl Scheduler {
    pub fn new(
        backend: Arc<dyn Backend>,
        catalog: QueryCatalog,
        sink: Arc<dyn ResultSink>,
        config: SchedulerConfig,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle { completed_ticks: 0 });
        Self {
            backend,
            catalog: Arc::new(catalog),
            sink,
            config,
            state,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &QueryCatalog {
        &self.catalog
    }

    /// Current state.
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Run every tick, or until `shutdown` fires.
    ///
    /// On shutdown, in-flight query tasks of the current tick are detached
    /// rather than aborted; they finish on their own but emit nothing.
    pub async fn run(&self, shutdown: CancellationToken) -> RunSummary {
        let mut summary = RunSummary::default();

        tracing::info!(
            backend = self.backend.name(),
            ticks = self.config.ticks,
            queries = self.catalog.len(),
            interval = ?self.config.interval,
            window = ?self.config.window,
            step = ?self.config.step,
            "Sampling started"
        );

        for tick in 1..=self.config.ticks {
            if shutdown.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            self.state.send_replace(SchedulerState::Sampling { tick });
            let range = TimeRange::generate(Utc::now(), self.config.window);
            tracing::debug!(tick, range = %range, "Tick started");

            let report = self.run_tick(tick, range, &shutdown).await;
            let Some(report) = report else {
                summary.cancelled = true;
                self.state.send_replace(SchedulerState::Idle {
                    completed_ticks: summary.ticks,
                });
                tracing::warn!(tick, "Tick abandoned on shutdown");
                break;
            };

            summary.ticks += 1;
            summary.results += report.results;
            summary.failures += report.failures;
            self.state.send_replace(SchedulerState::Idle {
                completed_ticks: summary.ticks,
            });
            tracing::debug!(
                tick,
                results = report.results,
                failures = report.failures,
                "Tick completed"
            );

            if tick < self.config.ticks && !self.config.interval.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        summary.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.config.interval) => {}
                }
            }
        }

        tracing::info!(
            ticks = summary.ticks,
            results = summary.results,
            failures = summary.failures,
            cancelled = summary.cancelled,
            "Sampling finished"
        );
        summary
    }

    /// Fan out one task per query and join them all.
    ///
    /// Returns `None` if `shutdown` fired before every task was joined.
    async fn run_tick(
        &self,
        tick: u64,
        range: TimeRange,
        shutdown: &CancellationToken,
    ) -> Option<TickReport> {
        let mut tasks = JoinSet::new();
        for query in self.catalog.queries() {
            let task = QueryTask {
                backend: Arc::clone(&self.backend),
                sink: Arc::clone(&self.sink),
                query: Arc::clone(query),
                tick,
                range,
                step: self.config.step,
                query_timeout: self.config.query_timeout,
                shutdown: shutdown.clone(),
            };
            tasks.spawn(task.run());
        }

        let mut report = TickReport::default();
        loop {
            tokio::select! {
                biased;
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(success)) => {
                        report.results += 1;
                        if !success {
                            report.failures += 1;
                        }
                    }
                    Some(Err(e)) => {
                        // Panicked task; its result was never emitted.
                        tracing::error!(tick, error = %e, "Query task failed to complete");
                        report.results += 1;
                        report.failures += 1;
                    }
                },
                _ = shutdown.cancelled() => {
                    tasks.detach_all();
                    return None;
                }
            }
        }

        Some(report)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("backend", &self.backend.name())
            .field("queries", &self.catalog.len())
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// One query execution within one tick.
struct QueryTask {
    backend: Arc<dyn Backend>,
    sink: Arc<dyn ResultSink>,
    query: Arc<Query>,
    tick: u64,
    range: TimeRange,
    step: Duration,
    query_timeout: Duration,
    shutdown: CancellationToken,
}

impl QueryTask {
    /// Execute, flatten and emit. Returns whether the query succeeded.
    async fn run(self) -> bool {
        let id = self.query.id();
        let start = Instant::now();
        tracing::debug!(query = %id, tick = self.tick, "Running query");

        let call = self
            .backend
            .execute(self.query.expression(), &self.range, self.step);

        let outcome = match timeout(self.query_timeout, call).await {
            Ok(Ok(response)) => {
                let mut notices = Vec::with_capacity(response.warnings.len());
                for warning in response.warnings {
                    tracing::warn!(query = %id, tick = self.tick, warning = %warning, "Backend warning");
                    notices.push(Notice::BackendWarning(warning));
                }

                let flattened = flatten(&response.matrix, self.query.watched_labels(), id);
                notices.extend(flattened.notices);

                tracing::debug!(
                    query = %id,
                    tick = self.tick,
                    records = flattened.records.len(),
                    duration_ms = start.elapsed().as_millis(),
                    "Query succeeded"
                );
                Outcome::Success {
                    records: flattened.records,
                    notices,
                }
            }
            Ok(Err(error)) => {
                tracing::warn!(query = %id, tick = self.tick, error = %error, "Query failed");
                Outcome::Failure { error }
            }
            Err(_) => {
                tracing::warn!(
                    query = %id,
                    tick = self.tick,
                    timeout_ms = self.query_timeout.as_millis(),
                    "Query timed out"
                );
                Outcome::Failure {
                    error: BackendError::Unreachable(format!(
                        "query timed out after {:?}",
                        self.query_timeout
                    )),
                }
            }
        };

        let success = matches!(outcome, Outcome::Success { .. });

        if self.shutdown.is_cancelled() {
            tracing::debug!(query = %id, tick = self.tick, "Discarding result of abandoned query");
            return success;
        }

        let result = QueryResult {
            query: Arc::clone(&self.query),
            tick: self.tick,
            time_range: self.range,
            outcome,
        };
        if let Err(e) = self.sink.emit(&result).await {
            tracing::error!(query = %id, tick = self.tick, error = %e, "Failed to emit result");
        }

        success
    }
}
