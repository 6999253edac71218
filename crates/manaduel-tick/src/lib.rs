//! Time for Manaduel: clocks and the deadline poll scheduler.
//!
//! A duel has no server, so nothing pushes "the plan phase is over" to the
//! clients. Each client instead polls on a fixed interval and checks the
//! shared deadline itself. [`PollScheduler`] provides that interval with
//! overrun handling, pause/resume, and budget monitoring.
//!
//! # Integration
//!
//! The scheduler sits inside a driver's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = scheduler.wait_for_poll() => {
//!             controller.try_advance().await;
//!             scheduler.record_poll_end();
//!         }
//!     }
//! }
//! ```

mod clock;

pub use clock::{Clock, ManualClock, SystemClock, TokioClock};

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a poll wakes up later than scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPolicy {
    /// Forget the missed polls and schedule the next one from now.
    #[default]
    Skip,
    /// Keep the original cadence; the next poll fires at its planned time.
    Drop,
}

/// Configuration for [`PollScheduler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Milliseconds between polls.
    pub interval_ms: u64,
    pub policy: PollPolicy,
    /// Fraction of the interval (0.0–1.0) a poll may take before a
    /// warning is logged.
    pub budget_warn_threshold: f64,
    pub metrics_enabled: bool,
    /// Upper bound of the random delay added to the first poll, so clients
    /// that start together do not hit the store in lockstep.
    pub initial_jitter_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 250,
            policy: PollPolicy::default(),
            budget_warn_threshold: 0.80,
            metrics_enabled: true,
            initial_jitter_ms: 25,
        }
    }
}

impl PollConfig {
    pub const MIN_INTERVAL_MS: u64 = 10;
    pub const MAX_INTERVAL_MS: u64 = 60_000;

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            ..Default::default()
        }
    }

    /// Clamps out-of-range values.
    ///
    /// - `interval_ms` to `MIN_INTERVAL_MS..=MAX_INTERVAL_MS`.
    /// - `budget_warn_threshold` to `0.0..=1.0`.
    /// - `initial_jitter_ms` to at most one interval.
    pub fn validated(mut self) -> Self {
        let clamped = self
            .interval_ms
            .clamp(Self::MIN_INTERVAL_MS, Self::MAX_INTERVAL_MS);
        if clamped != self.interval_ms {
            warn!(
                interval_ms = self.interval_ms,
                clamped,
                "poll interval out of range, clamping"
            );
            self.interval_ms = clamped;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self.initial_jitter_ms = self.initial_jitter_ms.min(self.interval_ms);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// ---------------------------------------------------------------------------
// Poll info / metrics
// ---------------------------------------------------------------------------

/// Returned by [`PollScheduler::wait_for_poll`].
#[derive(Debug, Clone)]
pub struct PollInfo {
    /// Starts at 1.
    pub poll: u64,
    /// `true` if the poll woke more than 10% of an interval late.
    pub overrun: bool,
    /// Whole intervals missed because of the overrun.
    pub polls_skipped: u64,
}

/// Counters kept by the scheduler.
///
/// Timing values measure the work reported through
/// [`PollScheduler::record_poll_end`].
#[derive(Debug, Clone, Default)]
pub struct PollMetrics {
    pub total_polls: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Exponential moving average (α = 0.1).
    pub avg_poll_time: Duration,
    pub max_poll_time: Duration,
    /// Last poll's work time as a fraction of the interval.
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-interval poll scheduler. One per driver.
pub struct PollScheduler {
    config: PollConfig,
    interval: Duration,
    poll_count: u64,
    next_poll: TokioInstant,
    poll_start: Option<Instant>,
    paused: bool,
    metrics: PollMetrics,
}

impl PollScheduler {
    pub fn new(config: PollConfig) -> Self {
        let config = config.validated();
        let interval = config.interval();

        let jitter = if config.initial_jitter_ms > 0 {
            Duration::from_millis(rand::rng().random_range(0..config.initial_jitter_ms))
        } else {
            Duration::ZERO
        };

        debug!(
            interval_ms = config.interval_ms,
            policy = ?config.policy,
            "poll scheduler created"
        );

        Self {
            next_poll: TokioInstant::now() + interval + jitter,
            config,
            interval,
            poll_count: 0,
            poll_start: None,
            paused: false,
            metrics: PollMetrics::default(),
        }
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self::new(PollConfig::with_interval(interval))
    }

    /// Waits for the next poll.
    ///
    /// While paused this never resolves, which leaves the other branches of
    /// an enclosing `select!` running.
    pub async fn wait_for_poll(&mut self) -> PollInfo {
        if self.paused {
            std::future::pending::<()>().await;
        }

        let scheduled = self.next_poll;
        time::sleep_until(scheduled).await;

        let now = TokioInstant::now();
        self.poll_count += 1;
        self.poll_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(scheduled);
        let overrun = late_by > self.interval / 10;
        let mut polls_skipped = 0u64;

        self.next_poll = match self.config.policy {
            PollPolicy::Skip => {
                if overrun {
                    polls_skipped = whole_intervals(late_by, self.interval);
                    if polls_skipped > 0 {
                        warn!(
                            poll = self.poll_count,
                            skipped = polls_skipped,
                            late_ms = whole_millis(late_by),
                            "poll overrun, skipping ahead"
                        );
                    }
                }
                now + self.interval
            }
            PollPolicy::Drop => {
                if overrun {
                    warn!(
                        poll = self.poll_count,
                        late_ms = whole_millis(late_by),
                        "poll overrun, keeping original schedule"
                    );
                }
                // Never schedule in the past more than once.
                (scheduled + self.interval).max(now)
            }
        };

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += polls_skipped;
        self.metrics.total_polls += 1;

        trace!(poll = self.poll_count, overrun, "poll fired");

        PollInfo {
            poll: self.poll_count,
            overrun,
            polls_skipped,
        }
    }

    /// Marks the end of the work done for the current poll.
    ///
    /// A no-op unless [`wait_for_poll`](Self::wait_for_poll) fired since the
    /// last call.
    pub fn record_poll_end(&mut self) {
        let Some(start) = self.poll_start.take() else {
            return;
        };
        let elapsed = start.elapsed();

        let utilization = elapsed.as_secs_f64() / self.interval.as_secs_f64();
        self.metrics.budget_utilization = utilization;
        if utilization >= self.config.budget_warn_threshold {
            warn!(
                poll = self.poll_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                interval_ms = self.config.interval_ms,
                "poll work approaching interval"
            );
        }

        if self.config.metrics_enabled {
            if elapsed > self.metrics.max_poll_time {
                self.metrics.max_poll_time = elapsed;
            }
            let alpha = 0.1;
            let prev = self.metrics.avg_poll_time.as_secs_f64();
            self.metrics.avg_poll_time =
                Duration::from_secs_f64(prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha);
        }
    }

    /// Stops polls until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(poll = self.poll_count, "poll scheduler paused");
        }
    }

    /// Restarts polling one interval from now. Idempotent.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.next_poll = TokioInstant::now() + self.interval;
            debug!(poll = self.poll_count, "poll scheduler resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn poll_count(&self) -> u64 {
        self.poll_count
    }

    pub fn metrics(&self) -> &PollMetrics {
        &self.metrics
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

fn whole_intervals(late_by: Duration, interval: Duration) -> u64 {
    let late = late_by.as_nanos();
    let step = interval.as_nanos().max(1);
    u64::try_from(late / step).unwrap_or(u64::MAX)
}

fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
