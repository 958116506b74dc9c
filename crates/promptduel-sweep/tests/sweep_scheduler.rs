//! Integration tests for the sweep scheduler and the sweeper loop.
//!
//! Tokio time is paused in every async test, so `sleep_until` resolves as
//! soon as the runtime is idle. Room deadlines run on a `ManualClock`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use promptduel_protocol::{Difficulty, RoomId, RoomStatus, UserId};
use promptduel_room::{
    DuelConfig, DuelEngine, EngineConfig, Evaluate, InMemoryQuestionBank, InMemoryRoomStore,
    ManualClock, MultipleChoice, Room, RoomStore, StoreError, SweepReport, Versioned,
};
use promptduel_sweep::{run_sweeper, SweepConfig, SweepScheduler};
use tokio::sync::watch;

// =========================================================================
// Helpers
// =========================================================================

const TOPIC: &str = "prompt-basics";

fn every_second() -> SweepConfig {
    SweepConfig {
        initial_jitter_ms: 0,
        ..SweepConfig::every(Duration::from_secs(1))
    }
}

fn bank() -> InMemoryQuestionBank<MultipleChoice> {
    let questions = (0..10).map(|i| {
        MultipleChoice::new(
            format!("q{i}"),
            format!("question {i}"),
            vec!["a".into(), "b".into()],
            0,
        )
    });
    InMemoryQuestionBank::new().with_pool(TOPIC, Difficulty::Beginner, questions)
}

type TestEngine = DuelEngine<InMemoryRoomStore, InMemoryQuestionBank<MultipleChoice>>;

fn engine() -> (Arc<TestEngine>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap(),
    ));
    let engine = DuelEngine::new(InMemoryRoomStore::new(), bank(), EngineConfig::default())
        .with_clock(clock.clone());
    (Arc::new(engine), clock)
}

async fn create(engine: &TestEngine) -> RoomId {
    let config = DuelConfig {
        item_count: 3,
        min_players: 2,
        max_players: 4,
    };
    engine
        .create_room(UserId::new("creator"), TOPIC, Difficulty::Beginner, config)
        .await
        .unwrap()
}

struct OfflineStore;

impl<Q: Evaluate> RoomStore<Q> for OfflineStore {
    async fn get(&self, _room_id: RoomId) -> Result<Option<Versioned<Room<Q>>>, StoreError> {
        Err(StoreError::Unavailable("offline".into()))
    }

    async fn insert(&self, _room: Room<Q>) -> Result<Versioned<Room<Q>>, StoreError> {
        Err(StoreError::Unavailable("offline".into()))
    }

    async fn replace(
        &self,
        _room_id: RoomId,
        _expected_version: u64,
        _room: Room<Q>,
    ) -> Result<Versioned<Room<Q>>, StoreError> {
        Err(StoreError::Unavailable("offline".into()))
    }

    async fn list_open(&self) -> Result<Vec<RoomId>, StoreError> {
        Err(StoreError::Unavailable("offline".into()))
    }

    async fn list_closed_before(&self, _cutoff: DateTime<Utc>) -> Result<Vec<RoomId>, StoreError> {
        Err(StoreError::Unavailable("offline".into()))
    }

    async fn remove(&self, _room_id: RoomId) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("offline".into()))
    }
}

// =========================================================================
// SweepConfig
// =========================================================================

#[test]
fn test_default_config_sweeps_every_five_seconds() {
    let cfg = SweepConfig::default();
    assert_eq!(cfg.period(), Some(Duration::from_secs(5)));
}

#[test]
fn test_period_zero_interval_is_disabled() {
    let cfg = SweepConfig::every(Duration::ZERO);
    assert_eq!(cfg.period(), None);
}

#[test]
fn test_validated_tiny_interval_clamped_to_minimum() {
    let cfg = SweepConfig::every(Duration::from_millis(5)).validated();
    assert_eq!(cfg.interval, SweepConfig::MIN_INTERVAL);
}

#[test]
fn test_validated_threshold_clamped() {
    let cfg = SweepConfig {
        budget_warn_threshold: 3.0,
        ..SweepConfig::default()
    }
    .validated();
    assert_eq!(cfg.budget_warn_threshold, 1.0);
}

// =========================================================================
// Scheduler
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_scheduler_initial_state() {
    let s = SweepScheduler::new(every_second());
    assert_eq!(s.sweep_count(), 0);
    assert!(!s.is_paused());
    assert!(!s.is_disabled());
    assert_eq!(s.interval(), Some(Duration::from_secs(1)));
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_sweep_fires_after_interval() {
    let mut s = SweepScheduler::new(every_second());
    let start = tokio::time::Instant::now();

    let tick = s.wait_for_sweep().await;

    assert_eq!(tick.sweep, 1);
    assert!(!tick.overrun);
    assert_eq!(tick.sweeps_skipped, 0);
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_sweep_counts_monotonically() {
    let mut s = SweepScheduler::new(every_second());

    for expected in 1..=4 {
        assert_eq!(s.wait_for_sweep().await.sweep, expected);
    }
    assert_eq!(s.metrics().total_sweeps, 4);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_sweep_late_wakeup_skips_ahead() {
    let mut s = SweepScheduler::new(every_second());
    tokio::time::advance(Duration::from_millis(3500)).await;

    let tick = s.wait_for_sweep().await;

    assert!(tick.overrun);
    assert_eq!(tick.sweeps_skipped, 2);
    assert_eq!(s.metrics().total_overruns, 1);
    assert_eq!(s.metrics().total_skipped, 2);

    let start = tokio::time::Instant::now();
    let next = s.wait_for_sweep().await;
    assert!(!next.overrun);
    assert_eq!(start.elapsed(), Duration::from_secs(1), "rescheduled from now");
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_sweep_disabled_never_fires() {
    let mut s = SweepScheduler::new(SweepConfig::every(Duration::ZERO));
    assert!(s.is_disabled());

    let result = tokio::time::timeout(Duration::from_secs(60), s.wait_for_sweep()).await;

    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_pause_blocks_until_resume() {
    let mut s = SweepScheduler::new(every_second());
    s.pause();
    s.pause();
    assert!(s.is_paused());

    let result = tokio::time::timeout(Duration::from_secs(10), s.wait_for_sweep()).await;
    assert!(result.is_err());

    s.resume();
    assert!(!s.is_paused());
    let start = tokio::time::Instant::now();
    let tick = s.wait_for_sweep().await;
    assert_eq!(tick.sweep, 1);
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_record_sweep_end_accumulates_report() {
    let mut s = SweepScheduler::new(every_second());
    s.wait_for_sweep().await;

    s.record_sweep_end(&SweepReport {
        scanned: 5,
        started: 1,
        abandoned: 2,
        timed_out: 1,
        failed: 1,
        purged: 3,
    });
    s.wait_for_sweep().await;
    s.record_sweep_failure();

    let m = s.metrics();
    assert_eq!(m.rooms_started, 1);
    assert_eq!(m.rooms_abandoned, 2);
    assert_eq!(m.rooms_purged, 3);
    assert_eq!(m.rooms_timed_out, 1);
    assert_eq!(m.room_failures, 1);
    assert_eq!(m.failed_sweeps, 1);
}

// =========================================================================
// run_sweeper
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_run_sweeper_expires_lobbies_and_duels() {
    let (engine, clock) = engine();
    let empty = create(&engine).await;
    let ready = create(&engine).await;
    engine.join_room(ready, UserId::new("a")).await.unwrap();
    engine.join_room(ready, UserId::new("b")).await.unwrap();
    clock.advance(TimeDelta::seconds(301));

    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run_sweeper(
        engine.clone(),
        SweepScheduler::new(every_second()),
        stop_rx,
    ));
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(
        engine.get_room_details(empty).await.unwrap().status,
        RoomStatus::Abandoned
    );
    assert_eq!(
        engine.get_room_details(ready).await.unwrap().status,
        RoomStatus::Active
    );

    clock.advance(TimeDelta::seconds(601));
    tokio::time::sleep(Duration::from_secs(1)).await;
    stop_tx.send(true).unwrap();
    let metrics = task.await.unwrap();

    assert_eq!(
        engine.get_room_details(ready).await.unwrap().status,
        RoomStatus::Completed
    );
    assert_eq!(metrics.rooms_abandoned, 1);
    assert_eq!(metrics.rooms_started, 1);
    assert_eq!(metrics.rooms_timed_out, 1);
    assert_eq!(metrics.failed_sweeps, 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_sweeper_store_offline_counts_failures() {
    let engine = Arc::new(DuelEngine::new(OfflineStore, bank(), EngineConfig::default()));

    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run_sweeper(engine, SweepScheduler::new(every_second()), stop_rx));
    tokio::time::sleep(Duration::from_millis(3500)).await;
    stop_tx.send(true).unwrap();
    let metrics = task.await.unwrap();

    assert_eq!(metrics.total_sweeps, 3);
    assert_eq!(metrics.failed_sweeps, 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_sweeper_sender_dropped_stops() {
    let (engine, _clock) = engine();
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run_sweeper(engine, SweepScheduler::new(every_second()), stop_rx));

    drop(stop_tx);
    let metrics = task.await.unwrap();

    assert_eq!(metrics.total_sweeps, 0);
}
