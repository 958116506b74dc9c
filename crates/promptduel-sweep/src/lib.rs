//! Periodic expiry sweep for PromptDuel.
//!
//! Lobbies and duels have deadlines (`EngineConfig::lobby_timeout`,
//! `EngineConfig::duel_duration`) that nobody's request will trigger. A
//! single background task wakes up at a fixed interval and asks the engine
//! to apply every deadline that has passed.
//!
//! # Disabled mode
//!
//! When `interval` is zero, [`SweepScheduler::wait_for_sweep`] pends
//! forever. Deployments that expire rooms some other way (a cron job
//! calling `DuelEngine::sweep_expired`) use this.
//!
//! # Integration
//!
//! [`run_sweeper`] is the loop the server spawns. It stops when the
//! shutdown channel flips to `true` or its sender is dropped:
//!
//! ```ignore
//! let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
//! let task = tokio::spawn(run_sweeper(engine, SweepScheduler::new(config), stop_rx));
//! // ...
//! stop_tx.send(true)?;
//! let metrics = task.await?;
//! ```

mod runner;

pub use runner::run_sweeper;

use std::time::{Duration, Instant};

use promptduel_room::SweepReport;
use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the sweep scheduler.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time between sweeps. Zero disables sweeping.
    pub interval: Duration,
    /// Random jitter (0..max ms) added to the first sweep so several
    /// server instances started together do not sweep in lockstep.
    pub initial_jitter_ms: u64,
    /// Fraction of `interval` (0.0..=1.0) a sweep may take before a
    /// warning is logged.
    pub budget_warn_threshold: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            initial_jitter_ms: 250,
            budget_warn_threshold: 0.5,
        }
    }
}

impl SweepConfig {
    /// Shortest accepted non-zero interval.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

    /// A config sweeping every `interval` with default settings.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values.
    ///
    /// Called by [`SweepScheduler::new`]. A non-zero interval below
    /// [`Self::MIN_INTERVAL`] is raised to it; the threshold is clamped to
    /// `0.0..=1.0`.
    pub fn validated(mut self) -> Self {
        if !self.interval.is_zero() && self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "sweep interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// The sweep period, or `None` when disabled.
    pub fn period(&self) -> Option<Duration> {
        (!self.interval.is_zero()).then_some(self.interval)
    }
}

// ---------------------------------------------------------------------------
// Sweep info
// ---------------------------------------------------------------------------

/// Returned by [`SweepScheduler::wait_for_sweep`] when a sweep is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepTick {
    /// Sweep number, starting at 1.
    pub sweep: u64,
    /// The scheduler woke up late.
    pub overrun: bool,
    /// Whole intervals skipped because of the overrun.
    pub sweeps_skipped: u64,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Counters accumulated by the scheduler across sweeps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepMetrics {
    pub total_sweeps: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Sweeps that failed outright (could not list open rooms).
    pub failed_sweeps: u64,
    pub rooms_started: u64,
    pub rooms_abandoned: u64,
    pub rooms_timed_out: u64,
    /// Closed rooms removed after their retention period.
    pub rooms_purged: u64,
    /// Individual rooms the engine could not expire.
    pub room_failures: u64,
    pub last_sweep_time: Duration,
    pub max_sweep_time: Duration,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-interval sweep scheduler. Late wake-ups skip ahead instead of
/// bursting through missed sweeps.
pub struct SweepScheduler {
    config: SweepConfig,
    period: Option<Duration>,
    sweep_count: u64,
    next_sweep: Option<TokioInstant>,
    /// Set by `wait_for_sweep`, consumed by `record_sweep_end`.
    sweep_start: Option<Instant>,
    paused: bool,
    metrics: SweepMetrics,
}

impl SweepScheduler {
    /// Creates a scheduler. The first sweep fires after one interval plus
    /// jitter.
    pub fn new(config: SweepConfig) -> Self {
        let config = config.validated();
        let period = config.period();

        let next_sweep = period.map(|p| {
            let jitter = if config.initial_jitter_ms > 0 {
                Duration::from_millis(rand::rng().random_range(0..config.initial_jitter_ms))
            } else {
                Duration::ZERO
            };
            TokioInstant::now() + p + jitter
        });

        match period {
            Some(p) => debug!(interval_ms = p.as_millis() as u64, "sweep scheduler created"),
            None => debug!("sweep scheduler created disabled"),
        }

        Self {
            config,
            period,
            sweep_count: 0,
            next_sweep,
            sweep_start: None,
            paused: false,
            metrics: SweepMetrics::default(),
        }
    }

    /// Waits until the next sweep is due.
    ///
    /// Pends forever when disabled or paused, so it is safe inside
    /// `tokio::select!`.
    pub async fn wait_for_sweep(&mut self) -> SweepTick {
        let (next, period) = match (self.next_sweep, self.period) {
            (Some(next), Some(period)) if !self.paused => (next, period),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.sweep_count += 1;
        self.sweep_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > period / 10;
        let mut sweeps_skipped = 0;
        if overrun {
            sweeps_skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
            if sweeps_skipped > 0 {
                warn!(
                    sweep = self.sweep_count,
                    skipped = sweeps_skipped,
                    late_ms = late_by.as_millis() as u64,
                    "sweep overrun, skipping ahead"
                );
            }
            self.metrics.total_overruns += 1;
        }
        self.next_sweep = Some(now + period);
        self.metrics.total_skipped += sweeps_skipped;
        self.metrics.total_sweeps += 1;

        trace!(sweep = self.sweep_count, overrun, "sweep due");

        SweepTick {
            sweep: self.sweep_count,
            overrun,
            sweeps_skipped,
        }
    }

    /// Records the outcome of the sweep started by the last
    /// [`wait_for_sweep`](Self::wait_for_sweep).
    pub fn record_sweep_end(&mut self, report: &SweepReport) {
        self.metrics.rooms_started += report.started as u64;
        self.metrics.rooms_abandoned += report.abandoned as u64;
        self.metrics.rooms_timed_out += report.timed_out as u64;
        self.metrics.rooms_purged += report.purged as u64;
        self.metrics.room_failures += report.failed as u64;
        self.record_elapsed();
    }

    /// Records that the last sweep failed as a whole.
    pub fn record_sweep_failure(&mut self) {
        self.metrics.failed_sweeps += 1;
        self.record_elapsed();
    }

    fn record_elapsed(&mut self) {
        let Some(start) = self.sweep_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        self.metrics.last_sweep_time = elapsed;
        self.metrics.max_sweep_time = self.metrics.max_sweep_time.max(elapsed);

        if let Some(period) = self.period {
            let utilization = elapsed.as_secs_f64() / period.as_secs_f64();
            if utilization >= self.config.budget_warn_threshold {
                warn!(
                    sweep = self.sweep_count,
                    elapsed_ms = elapsed.as_millis() as u64,
                    interval_ms = period.as_millis() as u64,
                    "sweep is taking a large share of its interval"
                );
            }
        }
    }

    /// Stops sweeping until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(sweep = self.sweep_count, "sweep scheduler paused");
        }
    }

    /// Resumes after a pause. The next sweep is one full interval away.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            if let Some(period) = self.period {
                self.next_sweep = Some(TokioInstant::now() + period);
            }
            debug!(sweep = self.sweep_count, "sweep scheduler resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_disabled(&self) -> bool {
        self.period.is_none()
    }

    pub fn sweep_count(&self) -> u64 {
        self.sweep_count
    }

    pub fn metrics(&self) -> &SweepMetrics {
        &self.metrics
    }

    pub fn interval(&self) -> Option<Duration> {
        self.period
    }
}
