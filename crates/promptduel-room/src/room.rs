//! The room aggregate and its state machine.
//!
//! A [`Room`] holds everything that must change atomically: status,
//! participants with their answers, and the live standings. Every
//! transition is a plain method that takes the current time and returns
//! either a typed rejection or the events it produced. Nothing here does
//! I/O; the engine loads a room, calls one transition, and writes it back
//! with a compare-and-set.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use promptduel_protocol::{
    AnswerRecord, CompletionReason, Difficulty, ParticipantStatus, ParticipantView, Question,
    RoomEventKind, RoomId, RoomSnapshot, RoomStatus, UserId,
};
use serde::{Deserialize, Serialize};

use crate::{DuelConfig, DuelError, EngineConfig, Evaluate, Evaluation, Standings};

/// Client-facing snapshot of a room holding questions of type `Q`.
pub type RoomView<Q> = RoomSnapshot<Q, <Q as Evaluate>::Answer>;

/// Outcome of a transition: a value plus the events to publish once the
/// write commits. No events means nothing changed and nothing needs to be
/// written.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied<T> {
    pub value: T,
    pub events: Vec<RoomEventKind>,
}

impl<T> Applied<T> {
    fn changed(value: T, events: Vec<RoomEventKind>) -> Self {
        Self { value, events }
    }

    fn unchanged(value: T) -> Self {
        Self {
            value,
            events: Vec::new(),
        }
    }

    /// Returns `true` if the transition left the room untouched.
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Applied<U> {
        Applied {
            value: f(self.value),
            events: self.events,
        }
    }
}

/// What an accepted answer did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub evaluation: Evaluation,
    /// This answer was the participant's last unanswered question.
    pub finished: bool,
    /// This answer completed the room.
    pub completed: bool,
}

/// Deadline a room has passed, as seen by the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The room sat in its lobby longer than `lobby_timeout`.
    Lobby,
    /// The duel has run longer than `duel_duration`.
    Duel,
}

/// What the sweep did to an expired room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryAction {
    Started,
    Abandoned,
    TimedOut,
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// A user taking part in a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant<A> {
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    pub status: ParticipantStatus,
    pub finished_at: Option<DateTime<Utc>>,
    /// Append-only, keyed by question index.
    pub answers: BTreeMap<usize, AnswerRecord<A>>,
}

impl<A> Participant<A> {
    fn new(user_id: UserId, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            joined_at,
            status: ParticipantStatus::Waiting,
            finished_at: None,
            answers: BTreeMap::new(),
        }
    }
}

impl<A: Clone> Participant<A> {
    fn view(&self) -> ParticipantView<A> {
        ParticipantView {
            user_id: self.user_id.clone(),
            joined_at: self.joined_at,
            status: self.status,
            finished_at: self.finished_at,
            answers: self.answers.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// The duel room aggregate: the unit of consistency in the room store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Room<Q: Evaluate> {
    id: RoomId,
    creator: UserId,
    topic: String,
    difficulty: Difficulty,
    status: RoomStatus,
    config: DuelConfig,
    questions: Vec<Question<Q>>,
    participants: Vec<Participant<Q::Answer>>,
    standings: Standings,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    /// When the room reached a terminal status, by completion or abandonment.
    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,
    completion: Option<CompletionReason>,
}

impl<Q: Evaluate> Room<Q> {
    /// Creates a room in its lobby with an already drawn question sequence.
    ///
    /// The creator is not joined automatically.
    pub fn new(
        id: RoomId,
        creator: UserId,
        topic: impl Into<String>,
        difficulty: Difficulty,
        config: DuelConfig,
        questions: Vec<Question<Q>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            creator,
            topic: topic.into(),
            difficulty,
            status: RoomStatus::Lobby,
            config,
            questions,
            participants: Vec::new(),
            standings: Standings::new(),
            created_at: now,
            started_at: None,
            completed_at: None,
            closed_at: None,
            completion: None,
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn creator(&self) -> &UserId {
        &self.creator
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn config(&self) -> &DuelConfig {
        &self.config
    }

    pub fn questions(&self) -> &[Question<Q>] {
        &self.questions
    }

    pub fn participants(&self) -> &[Participant<Q::Answer>] {
        &self.participants
    }

    pub fn participant(&self, user_id: &UserId) -> Option<&Participant<Q::Answer>> {
        self.participants.iter().find(|p| &p.user_id == user_id)
    }

    pub fn standings(&self) -> &Standings {
        &self.standings
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn completion(&self) -> Option<CompletionReason> {
        self.completion
    }

    // -- transitions ------------------------------------------------------

    /// Adds `user_id` as a waiting participant.
    ///
    /// Checks run in a fixed order: closed room, existing membership,
    /// capacity, lobby status. A full room has always auto-started, so a
    /// late joiner hears `RoomFull`; a room started below capacity answers
    /// `RoomNotJoinable`. When this join fills the last slot the room
    /// starts in the same transition.
    pub fn join(&mut self, user_id: UserId, now: DateTime<Utc>) -> Result<Applied<()>, DuelError> {
        if self.status.is_terminal() {
            return Err(self.not_joinable());
        }
        if self.participant(&user_id).is_some() {
            return Err(DuelError::AlreadyJoined(user_id, self.id));
        }
        if self.participants.len() >= self.config.max_players {
            return Err(DuelError::RoomFull(self.id));
        }
        if !self.status.is_joinable() {
            return Err(self.not_joinable());
        }

        let now = self.monotonic(now);
        self.participants
            .push(Participant::new(user_id.clone(), now));
        self.standings.insert(user_id.clone(), now);

        let mut events = vec![RoomEventKind::ParticipantJoined { user_id }];
        if self.participants.len() == self.config.max_players {
            self.begin(now);
            events.push(RoomEventKind::Started);
        }
        Ok(Applied::changed((), events))
    }

    /// Removes a waiting participant. Empties abandon the room.
    pub fn leave(
        &mut self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Applied<()>, DuelError> {
        match self.status {
            RoomStatus::Completed | RoomStatus::Abandoned => {
                return Err(DuelError::RoomClosed(self.id));
            }
            RoomStatus::Active => return Err(DuelError::MembershipFrozen(self.id)),
            RoomStatus::Lobby => {}
        }
        let Some(idx) = self.participants.iter().position(|p| &p.user_id == user_id) else {
            return Err(DuelError::NotAParticipant(user_id.clone(), self.id));
        };

        self.participants.remove(idx);
        self.standings.remove(user_id);

        let mut events = vec![RoomEventKind::ParticipantLeft {
            user_id: user_id.clone(),
        }];
        if self.participants.is_empty() {
            self.status = RoomStatus::Abandoned;
            self.closed_at = Some(self.monotonic(now));
            events.push(RoomEventKind::Abandoned);
        }
        Ok(Applied::changed((), events))
    }

    /// Moves the room from its lobby to an active duel.
    ///
    /// `requester` is `None` for system-initiated starts (lobby timeout).
    /// Starting an already active room succeeds without changes, so the
    /// loser of a start race sees the winner's result.
    pub fn start(
        &mut self,
        requester: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> Result<Applied<()>, DuelError> {
        if self.status.is_terminal() {
            return Err(DuelError::RoomClosed(self.id));
        }
        if let Some(user_id) = requester {
            if user_id != &self.creator {
                return Err(DuelError::NotRoomCreator(user_id.clone(), self.id));
            }
        }
        if self.status == RoomStatus::Active {
            return Ok(Applied::unchanged(()));
        }
        if self.participants.len() < self.config.min_players {
            return Err(DuelError::NotEnoughPlayers {
                room_id: self.id,
                present: self.participants.len(),
                needed: self.config.min_players,
            });
        }

        let now = self.monotonic(now);
        self.begin(now);
        Ok(Applied::changed((), vec![RoomEventKind::Started]))
    }

    /// Records and scores one answer.
    ///
    /// Completes the room in the same transition when this answer finishes
    /// the last participant still answering.
    pub fn submit_answer(
        &mut self,
        user_id: &UserId,
        index: usize,
        answer: Q::Answer,
        now: DateTime<Utc>,
    ) -> Result<Applied<AnswerOutcome>, DuelError> {
        match self.status {
            RoomStatus::Lobby => return Err(DuelError::RoomNotStarted(self.id)),
            RoomStatus::Completed | RoomStatus::Abandoned => {
                return Err(DuelError::RoomClosed(self.id));
            }
            RoomStatus::Active => {}
        }

        let len = self.questions.len();
        let now = self.monotonic(now);
        let room_id = self.id;
        let Some(participant) = self.participants.iter_mut().find(|p| &p.user_id == user_id) else {
            return Err(DuelError::NotAParticipant(user_id.clone(), room_id));
        };
        if index >= len {
            return Err(DuelError::InvalidQuestionIndex { index, len });
        }
        if participant.answers.contains_key(&index) {
            return Err(DuelError::DuplicateAnswer {
                user_id: user_id.clone(),
                index,
            });
        }

        let evaluation = self.questions[index].item.evaluate(&answer);
        participant.answers.insert(
            index,
            AnswerRecord {
                answer,
                correct: evaluation.correct,
                score: evaluation.score,
                submitted_at: now,
            },
        );

        let finished = participant.answers.len() == len;
        if finished {
            participant.status = ParticipantStatus::Finished;
            participant.finished_at = Some(now);
        }
        self.standings
            .record(user_id, evaluation, finished.then_some(now));

        let mut events = vec![RoomEventKind::AnswerRecorded {
            user_id: user_id.clone(),
            question_index: index,
        }];
        if finished {
            events.push(RoomEventKind::ParticipantFinished {
                user_id: user_id.clone(),
            });
        }
        let completed = self.complete_if_all_finished(now);
        if completed {
            events.push(RoomEventKind::Completed {
                reason: CompletionReason::AllFinished,
            });
        }

        Ok(Applied::changed(
            AnswerOutcome {
                evaluation,
                finished,
                completed,
            },
            events,
        ))
    }

    /// Completes an active room once every participant has finished.
    ///
    /// Returns `true` if the room completed.
    pub fn complete_if_all_finished(&mut self, now: DateTime<Utc>) -> bool {
        let all_finished = !self.participants.is_empty()
            && self
                .participants
                .iter()
                .all(|p| p.status == ParticipantStatus::Finished);
        if self.status != RoomStatus::Active || !all_finished {
            return false;
        }
        self.complete(CompletionReason::AllFinished, now);
        true
    }

    /// Forces completion of an active duel. Participants still answering
    /// keep their partial answers; unanswered questions score nothing.
    ///
    /// No-op on completed or abandoned rooms.
    pub fn time_out(&mut self, now: DateTime<Utc>) -> Result<Applied<()>, DuelError> {
        match self.status {
            RoomStatus::Completed | RoomStatus::Abandoned => Ok(Applied::unchanged(())),
            RoomStatus::Lobby => Err(DuelError::RoomNotStarted(self.id)),
            RoomStatus::Active => {
                self.complete(CompletionReason::TimedOut, now);
                Ok(Applied::changed(
                    (),
                    vec![RoomEventKind::Completed {
                        reason: CompletionReason::TimedOut,
                    }],
                ))
            }
        }
    }

    /// Abandons a room that has not completed. Idempotent on abandoned rooms.
    pub fn abandon(&mut self, now: DateTime<Utc>) -> Result<Applied<()>, DuelError> {
        match self.status {
            RoomStatus::Abandoned => Ok(Applied::unchanged(())),
            RoomStatus::Completed => Err(DuelError::RoomClosed(self.id)),
            RoomStatus::Lobby | RoomStatus::Active => {
                self.status = RoomStatus::Abandoned;
                self.closed_at = Some(self.monotonic(now));
                Ok(Applied::changed((), vec![RoomEventKind::Abandoned]))
            }
        }
    }

    /// Which deadline, if any, this room has passed at `now`.
    pub fn expiry(&self, now: DateTime<Utc>, config: &EngineConfig) -> Option<Expiry> {
        match self.status {
            RoomStatus::Lobby if elapsed(self.created_at, now, config.lobby_timeout) => {
                Some(Expiry::Lobby)
            }
            RoomStatus::Active => self
                .started_at
                .filter(|started| elapsed(*started, now, config.duel_duration))
                .map(|_| Expiry::Duel),
            _ => None,
        }
    }

    /// Resolves a passed deadline: a lobby with enough players starts, a
    /// lobby without them is abandoned, an overdue duel times out.
    ///
    /// Returns `None` (and changes nothing) if no deadline has passed.
    pub fn expire(
        &mut self,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Result<Applied<Option<ExpiryAction>>, DuelError> {
        match self.expiry(now, config) {
            None => Ok(Applied::unchanged(None)),
            Some(Expiry::Lobby) if self.participants.len() >= self.config.min_players => Ok(self
                .start(None, now)?
                .map(|()| Some(ExpiryAction::Started))),
            Some(Expiry::Lobby) => Ok(self.abandon(now)?.map(|()| Some(ExpiryAction::Abandoned))),
            Some(Expiry::Duel) => Ok(self.time_out(now)?.map(|()| Some(ExpiryAction::TimedOut))),
        }
    }

    /// Read-only view of the room at store version `version`.
    pub fn snapshot(&self, version: u64) -> RoomView<Q> {
        RoomSnapshot {
            room_id: self.id,
            version,
            creator: self.creator.clone(),
            topic: self.topic.clone(),
            difficulty: self.difficulty,
            status: self.status,
            min_players: self.config.min_players,
            max_players: self.config.max_players,
            questions: self.questions.clone(),
            participants: self.participants.iter().map(Participant::view).collect(),
            standings: self.standings.entries(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            completion: self.completion,
        }
    }

    // -- internals --------------------------------------------------------

    fn begin(&mut self, now: DateTime<Utc>) {
        self.status = RoomStatus::Active;
        self.started_at = Some(now);
        for participant in &mut self.participants {
            participant.status = ParticipantStatus::Answering;
        }
        self.standings
            .set_unfinished_status(ParticipantStatus::Answering);
    }

    fn complete(&mut self, reason: CompletionReason, now: DateTime<Utc>) {
        self.status = RoomStatus::Completed;
        self.completed_at = Some(self.monotonic(now));
        self.closed_at = self.completed_at;
        self.completion = Some(reason);
    }

    fn not_joinable(&self) -> DuelError {
        DuelError::RoomNotJoinable {
            room_id: self.id,
            status: self.status,
        }
    }

    /// Clamps `now` so `created_at <= started_at <= completed_at` holds
    /// even if the clock steps backwards.
    fn monotonic(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let floor = self.started_at.unwrap_or(self.created_at);
        now.max(floor)
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>, limit: Duration) -> bool {
    (now - since).to_std().is_ok_and(|e| e >= limit)
}
