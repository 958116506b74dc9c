use std::sync::Arc;

use promptduel_room::{DuelEngine, QuestionBank, RoomStore};
use tokio::sync::watch;

use crate::{SweepMetrics, SweepScheduler};

/// Sweeps expired rooms until `shutdown` turns `true` or its sender is
/// dropped. Returns the scheduler's final metrics.
///
/// A failed sweep is logged and counted; the loop keeps going.
pub async fn run_sweeper<S, B>(
    engine: Arc<DuelEngine<S, B>>,
    mut scheduler: SweepScheduler,
    mut shutdown: watch::Receiver<bool>,
) -> SweepMetrics
where
    B: QuestionBank,
    S: RoomStore<B::Question>,
{
    tracing::info!(interval = ?scheduler.interval(), "sweeper running");

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            tick = scheduler.wait_for_sweep() => {
                match engine.sweep_expired().await {
                    Ok(report) => scheduler.record_sweep_end(&report),
                    Err(err) => {
                        tracing::warn!(sweep = tick.sweep, error = %err, "sweep failed");
                        scheduler.record_sweep_failure();
                    }
                }
            }
        }
    }

    let metrics = scheduler.metrics().clone();
    tracing::info!(
        sweeps = metrics.total_sweeps,
        started = metrics.rooms_started,
        abandoned = metrics.rooms_abandoned,
        timed_out = metrics.rooms_timed_out,
        purged = metrics.rooms_purged,
        "sweeper stopped"
    );
    metrics
}
