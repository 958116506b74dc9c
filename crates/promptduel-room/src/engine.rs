//! The room lifecycle engine.
//!
//! [`DuelEngine`] is the only entry point that mutates rooms. Every
//! mutating operation follows the same cycle:
//!
//! 1. read the room and its version from the store
//! 2. apply one pure transition from [`Room`] to a private copy
//! 3. write it back with `replace(expected_version)`
//!
//! When step 3 loses a race the cycle starts over from a fresh read, up to
//! [`EngineConfig::max_retries`] times. Committed transitions are then
//! handed to the [`RoomObserver`].

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use promptduel_protocol::{
    Difficulty, RoomEvent, RoomEventKind, RoomId, RoomStatus, StandingEntry, UserId,
};

use crate::{
    draw_questions, AnswerOutcome, Applied, Clock, DuelConfig, DuelError, EngineConfig,
    Evaluate, ExpiryAction, NoopObserver, QuestionBank, Room, RoomObserver, RoomStore, RoomView,
    StoreError, SystemClock, Versioned,
};

/// Confirmation returned for an accepted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerReceipt {
    pub room_id: RoomId,
    pub question_index: usize,
    pub correct: bool,
    pub score: u32,
    /// The participant has now answered every question.
    pub finished: bool,
    /// Room status right after the answer committed.
    pub room_status: RoomStatus,
    pub version: u64,
}

/// What one sweep pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Open rooms inspected.
    pub scanned: usize,
    /// Lobbies started because their timeout passed with enough players.
    pub started: usize,
    /// Lobbies abandoned because their timeout passed without enough players.
    pub abandoned: usize,
    /// Active duels completed because their duration elapsed.
    pub timed_out: usize,
    /// Rooms whose expiry could not be applied this pass.
    pub failed: usize,
    /// Closed rooms removed from the store after their retention period.
    pub purged: usize,
}

/// Enforces the duel room state machine on top of a [`RoomStore`].
///
/// Cheap to share: wrap it in an `Arc` and call it from any task.
pub struct DuelEngine<S, B> {
    store: S,
    bank: B,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn RoomObserver>,
    config: EngineConfig,
}

impl<S, B> DuelEngine<S, B>
where
    B: QuestionBank,
    S: RoomStore<B::Question>,
{
    /// Creates an engine with the system clock and no observer.
    pub fn new(store: S, bank: B, config: EngineConfig) -> Self {
        Self {
            store,
            bank,
            clock: Arc::new(SystemClock),
            observer: Arc::new(NoopObserver),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RoomObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -- operations -------------------------------------------------------

    /// Creates a room in its lobby and draws its fixed question sequence.
    ///
    /// The bank is queried once and `item_count` questions are drawn at
    /// random without replacement. The creator is not joined.
    ///
    /// # Errors
    /// - [`DuelError::InvalidConfig`] for out-of-range settings
    /// - [`DuelError::QuestionBankUnavailable`] if the bank fails
    /// - [`DuelError::InsufficientQuestions`] if the pool is too small
    pub async fn create_room(
        &self,
        creator: UserId,
        topic: &str,
        difficulty: Difficulty,
        config: DuelConfig,
    ) -> Result<RoomId, DuelError> {
        config.validate()?;

        let pool = self.bank.fetch_pool(topic, difficulty).await.map_err(|e| {
            tracing::error!(%topic, %difficulty, error = %e, "question bank failed");
            DuelError::from(e)
        })?;
        let questions = {
            let mut rng = rand::rng();
            draw_questions(pool, config.item_count, &mut rng)?
        };

        let now = self.clock.now();
        let room = Room::new(
            RoomId::new(),
            creator.clone(),
            topic,
            difficulty,
            config,
            questions,
            now,
        );
        let room_id = room.id();
        let committed = self.store.insert(room).await.map_err(|e| {
            tracing::error!(%room_id, error = %e, "failed to store new room");
            DuelError::from(e)
        })?;

        tracing::info!(
            %room_id,
            creator = %creator,
            %topic,
            %difficulty,
            items = config.item_count,
            min_players = config.min_players,
            max_players = config.max_players,
            "room created"
        );
        self.publish(&committed, vec![RoomEventKind::Created], now);
        Ok(room_id)
    }

    /// Adds `user_id` to a room in its lobby.
    ///
    /// Authoritative regardless of what the client saw in an earlier
    /// snapshot. Filling the last slot starts the duel in the same write.
    pub async fn join_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<RoomView<B::Question>, DuelError> {
        let (committed, ()) = self
            .mutate_room(room_id, "join", |room, now| room.join(user_id.clone(), now))
            .await?;
        tracing::info!(
            %room_id,
            %user_id,
            players = committed.value.participants().len(),
            status = %committed.value.status(),
            "participant joined"
        );
        Ok(committed.value.snapshot(committed.version))
    }

    /// Latest committed snapshot of a room.
    pub async fn get_room_details(
        &self,
        room_id: RoomId,
    ) -> Result<RoomView<B::Question>, DuelError> {
        let current = self.load(room_id).await?;
        Ok(current.value.snapshot(current.version))
    }

    /// Starts a duel on behalf of its creator.
    ///
    /// Succeeds without changes if the room is already active, whichever
    /// path started it.
    pub async fn start_room(
        &self,
        room_id: RoomId,
        requester: &UserId,
    ) -> Result<RoomView<B::Question>, DuelError> {
        let (committed, ()) = self
            .mutate_room(room_id, "start", |room, now| room.start(Some(requester), now))
            .await?;
        tracing::info!(%room_id, requester = %requester, "room started");
        Ok(committed.value.snapshot(committed.version))
    }

    /// Records one answer and updates the standings.
    pub async fn submit_answer(
        &self,
        room_id: RoomId,
        user_id: &UserId,
        question_index: usize,
        answer: <B::Question as Evaluate>::Answer,
    ) -> Result<AnswerReceipt, DuelError> {
        let (committed, outcome): (_, AnswerOutcome) = self
            .mutate_room(room_id, "submit_answer", |room, now| {
                room.submit_answer(user_id, question_index, answer.clone(), now)
            })
            .await?;

        tracing::debug!(
            %room_id,
            %user_id,
            question_index,
            correct = outcome.evaluation.correct,
            score = outcome.evaluation.score,
            "answer recorded"
        );
        if outcome.completed {
            tracing::info!(%room_id, "all participants finished, room completed");
        }

        Ok(AnswerReceipt {
            room_id,
            question_index,
            correct: outcome.evaluation.correct,
            score: outcome.evaluation.score,
            finished: outcome.finished,
            room_status: committed.value.status(),
            version: committed.version,
        })
    }

    /// Current ranking of a room.
    pub async fn get_standings(&self, room_id: RoomId) -> Result<Vec<StandingEntry>, DuelError> {
        let current = self.load(room_id).await?;
        Ok(current.value.standings().entries())
    }

    /// Removes a participant from a room that has not started.
    pub async fn leave_room(
        &self,
        room_id: RoomId,
        user_id: &UserId,
    ) -> Result<RoomView<B::Question>, DuelError> {
        let (committed, ()) = self
            .mutate_room(room_id, "leave", |room, now| room.leave(user_id, now))
            .await?;
        tracing::info!(
            %room_id,
            %user_id,
            players = committed.value.participants().len(),
            status = %committed.value.status(),
            "participant left"
        );
        Ok(committed.value.snapshot(committed.version))
    }

    /// Abandons a room that has not completed.
    pub async fn abandon_room(&self, room_id: RoomId) -> Result<RoomView<B::Question>, DuelError> {
        let (committed, ()) = self
            .mutate_room(room_id, "abandon", |room, now| room.abandon(now))
            .await?;
        tracing::info!(%room_id, "room abandoned");
        Ok(committed.value.snapshot(committed.version))
    }

    /// Forces an active duel to complete. No-op on closed rooms.
    pub async fn timeout_room(&self, room_id: RoomId) -> Result<RoomView<B::Question>, DuelError> {
        let (committed, ()) = self
            .mutate_room(room_id, "timeout", |room, now| room.time_out(now))
            .await?;
        tracing::info!(%room_id, status = %committed.value.status(), "room timed out");
        Ok(committed.value.snapshot(committed.version))
    }

    /// Applies every passed deadline among open rooms.
    ///
    /// A failure on one room is logged and counted; it does not stop the
    /// pass. Only a failure to list open rooms is returned.
    pub async fn sweep_expired(&self) -> Result<SweepReport, DuelError> {
        let open = self.store.list_open().await.map_err(|e| {
            tracing::error!(error = %e, "failed to list open rooms");
            DuelError::from(e)
        })?;

        let mut report = SweepReport {
            scanned: open.len(),
            ..SweepReport::default()
        };
        for room_id in open {
            let config = &self.config;
            let result = self
                .mutate_room(room_id, "expire", |room, now| room.expire(now, config))
                .await;
            match result {
                Ok((_, Some(ExpiryAction::Started))) => {
                    tracing::info!(%room_id, "lobby timed out, room started");
                    report.started += 1;
                }
                Ok((_, Some(ExpiryAction::Abandoned))) => {
                    tracing::info!(%room_id, "lobby timed out without enough players, room abandoned");
                    report.abandoned += 1;
                }
                Ok((_, Some(ExpiryAction::TimedOut))) => {
                    tracing::info!(%room_id, "duel duration elapsed, room completed");
                    report.timed_out += 1;
                }
                Ok((_, None)) => {}
                // Closed by someone else between listing and reading.
                Err(DuelError::RoomClosed(_) | DuelError::RoomNotFound(_)) => {}
                Err(err) => {
                    tracing::warn!(%room_id, error = %err, "failed to expire room");
                    report.failed += 1;
                }
            }
        }

        report.purged = self.purge_archived().await;

        let changed = report.started + report.abandoned + report.timed_out + report.purged;
        if changed + report.failed > 0 {
            tracing::info!(
                scanned = report.scanned,
                started = report.started,
                abandoned = report.abandoned,
                timed_out = report.timed_out,
                failed = report.failed,
                purged = report.purged,
                "sweep finished"
            );
        }
        Ok(report)
    }

    /// Removes rooms that closed more than
    /// [`EngineConfig::archive_retention`] ago. Returns how many went.
    ///
    /// Until then a closed room keeps answering details and standings
    /// reads. Store failures are logged and retried on the next pass.
    pub async fn purge_archived(&self) -> usize {
        let cutoff = TimeDelta::from_std(self.config.archive_retention)
            .ok()
            .and_then(|retention| self.clock.now().checked_sub_signed(retention));
        let Some(cutoff) = cutoff else {
            return 0;
        };
        let closed = match self.store.list_closed_before(cutoff).await {
            Ok(closed) => closed,
            Err(err) => {
                tracing::warn!(error = %err, "failed to list archived rooms");
                return 0;
            }
        };

        let mut purged = 0;
        for room_id in closed {
            match self.store.remove(room_id).await {
                Ok(true) => {
                    tracing::debug!(%room_id, "archived room purged");
                    purged += 1;
                }
                Ok(false) => {}
                Err(err) => tracing::warn!(%room_id, error = %err, "failed to purge room"),
            }
        }
        purged
    }

    // -- internals --------------------------------------------------------

    async fn load(&self, room_id: RoomId) -> Result<Versioned<Room<B::Question>>, DuelError> {
        match self.store.get(room_id).await {
            Ok(Some(current)) => Ok(current),
            Ok(None) => Err(DuelError::RoomNotFound(room_id)),
            Err(err) => {
                tracing::error!(%room_id, error = %err, "room store read failed");
                Err(err.into())
            }
        }
    }

    /// Read, apply `transition`, compare-and-set; retry on conflict.
    ///
    /// A transition that reports no events is treated as a no-op: nothing
    /// is written and the snapshot that was read is returned.
    async fn mutate_room<T, F>(
        &self,
        room_id: RoomId,
        op: &'static str,
        mut transition: F,
    ) -> Result<(Versioned<Room<B::Question>>, T), DuelError>
    where
        T: Send,
        F: FnMut(&mut Room<B::Question>, DateTime<Utc>) -> Result<Applied<T>, DuelError> + Send,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let Versioned {
                version,
                value: mut room,
            } = self.load(room_id).await?;

            let now = self.clock.now();
            let applied = match transition(&mut room, now) {
                Ok(applied) => applied,
                Err(err) => {
                    tracing::debug!(%room_id, op, error = %err, "transition rejected");
                    return Err(err);
                }
            };
            if applied.is_noop() {
                return Ok((Versioned { version, value: room }, applied.value));
            }

            match self.store.replace(room_id, version, room).await {
                Ok(committed) => {
                    self.publish(&committed, applied.events, now);
                    return Ok((committed, applied.value));
                }
                Err(StoreError::Conflict { .. }) if attempts < self.config.max_retries => {
                    tracing::debug!(%room_id, op, attempts, "write conflict, retrying");
                }
                Err(StoreError::Conflict { .. }) => {
                    tracing::warn!(%room_id, op, attempts, "write conflict, giving up");
                    return Err(DuelError::TransientConflict { room_id, attempts });
                }
                Err(err) => {
                    tracing::error!(%room_id, op, error = %err, "room store write failed");
                    return Err(err.into());
                }
            }
        }
    }

    fn publish(
        &self,
        committed: &Versioned<Room<B::Question>>,
        events: Vec<RoomEventKind>,
        at: DateTime<Utc>,
    ) {
        let standings = committed.value.standings().entries();
        for kind in events {
            self.observer.on_room_event(&RoomEvent {
                room_id: committed.value.id(),
                version: committed.version,
                status: committed.value.status(),
                kind,
                standings: standings.clone(),
                at,
            });
        }
    }
}
