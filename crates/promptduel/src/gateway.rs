//! The session gateway: what a transport calls for each connected user.
//!
//! The transport (WebSocket, SSE, a test harness) owns the sockets. For
//! every user it:
//!   1. calls [`Gateway::connect`] with the client's auth token, or
//!      [`Gateway::reconnect`] with a reconnection token
//!   2. passes each inbound frame to [`Gateway::handle`] and writes back
//!      the reply bytes
//!   3. forwards events from [`Gateway::subscribe`], encoded with
//!      [`Gateway::encode_event`]
//!   4. calls [`Gateway::disconnect`] when the socket closes
//!
//! [`Gateway::expire_sessions`] runs periodically and releases the seats
//! of users whose grace period ran out.

use std::sync::Arc;
use std::time::Instant;

use promptduel_protocol::{
    ClientMessage, Codec, Difficulty, RoomEvent, RoomId, RoomStatus, ServerMessage, UserId,
};
use promptduel_room::{DuelConfig, DuelEngine, DuelError, Evaluate, QuestionBank, RoomStore};
use promptduel_session::{Authenticator, Session, SessionConfig, SessionError, SessionManager};
use tokio::sync::{broadcast, Mutex};

use crate::{BroadcastHub, PromptDuelError};

type Answer<B> = <<B as QuestionBank>::Question as Evaluate>::Answer;
type Reply<B> = ServerMessage<<B as QuestionBank>::Question, Answer<B>>;

/// What one [`Gateway::expire_sessions`] pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionExpiry {
    /// Users whose session expired.
    pub expired: Vec<UserId>,
    /// Lobbies an expired user was removed from.
    pub left: Vec<RoomId>,
    /// Active duels abandoned because no participant was left.
    pub abandoned: Vec<RoomId>,
}

enum Release {
    Left,
    Abandoned,
}

/// Routes authenticated client messages to the [`DuelEngine`].
pub struct Gateway<S, B, A, C> {
    engine: Arc<DuelEngine<S, B>>,
    hub: Arc<BroadcastHub>,
    sessions: Mutex<SessionManager>,
    auth: A,
    codec: C,
    started: Instant,
}

impl<S, B, A, C> Gateway<S, B, A, C>
where
    B: QuestionBank,
    S: RoomStore<B::Question>,
    A: Authenticator,
    C: Codec,
{
    pub fn new(
        engine: Arc<DuelEngine<S, B>>,
        hub: Arc<BroadcastHub>,
        auth: A,
        codec: C,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            engine,
            hub,
            sessions: Mutex::new(SessionManager::new(session_config)),
            auth,
            codec,
            started: Instant::now(),
        }
    }

    pub fn engine(&self) -> &Arc<DuelEngine<S, B>> {
        &self.engine
    }

    // -- connection lifecycle ---------------------------------------------

    /// Authenticates `token` and opens a session.
    ///
    /// # Errors
    /// [`SessionError::AuthFailed`] for a rejected token,
    /// [`SessionError::AlreadyConnected`] if the user is online elsewhere.
    pub async fn connect(&self, token: &str) -> Result<Session, PromptDuelError> {
        let user_id = self.auth.authenticate(token).await.inspect_err(|e| {
            tracing::debug!(error = %e, "authentication rejected");
        })?;
        let session = self.sessions.lock().await.create(user_id)?;
        Ok(session)
    }

    /// Resumes a dropped session with its reconnection token.
    pub async fn reconnect(&self, reconnect_token: &str) -> Result<Session, PromptDuelError> {
        let session = self.sessions.lock().await.reconnect(reconnect_token)?;
        Ok(session)
    }

    /// Marks the user's connection as gone. Their seat is kept for the
    /// grace period.
    pub async fn disconnect(&self, user_id: &UserId) -> Result<(), PromptDuelError> {
        self.sessions.lock().await.disconnect(user_id)?;
        Ok(())
    }

    /// Expires sessions past their grace period and releases their seats.
    ///
    /// Every room the user holds a seat in is visited. A lobby seat is
    /// given up with `leave_room`. An active duel is abandoned once none of
    /// its participants is connected or within their grace period, no
    /// matter which other rooms those participants are also in.
    pub async fn expire_sessions(&self) -> SessionExpiry {
        let expired = self.sessions.lock().await.expire_stale();

        let mut report = SessionExpiry::default();
        for session in expired {
            for &room_id in &session.rooms {
                match self.release_seat(room_id, &session.user_id).await {
                    Ok(Some(Release::Left)) => report.left.push(room_id),
                    Ok(Some(Release::Abandoned)) => report.abandoned.push(room_id),
                    Ok(None) => {}
                    Err(err) => tracing::warn!(
                        %room_id,
                        user_id = %session.user_id,
                        error = %err,
                        "could not release seat of expired session"
                    ),
                }
            }
            report.expired.push(session.user_id);
        }

        self.sessions.lock().await.cleanup_expired();
        report
    }

    async fn release_seat(
        &self,
        room_id: RoomId,
        user_id: &UserId,
    ) -> Result<Option<Release>, DuelError> {
        let room = self.engine.get_room_details(room_id).await?;
        if !room.has_participant(user_id) {
            return Ok(None);
        }

        match room.status {
            RoomStatus::Lobby => match self.engine.leave_room(room_id, user_id).await {
                Ok(_) => Ok(Some(Release::Left)),
                // Started between the read and the leave; handled like an
                // active room on the next pass of its last participant.
                Err(DuelError::MembershipFrozen(_)) => Ok(None),
                Err(err) => Err(err),
            },
            RoomStatus::Active => {
                let someone_present = {
                    let sessions = self.sessions.lock().await;
                    room.participants
                        .iter()
                        .any(|p| &p.user_id != user_id && sessions.is_present(&p.user_id))
                };
                if someone_present {
                    return Ok(None);
                }
                match self.engine.abandon_room(room_id).await {
                    Ok(_) => Ok(Some(Release::Abandoned)),
                    // Completed by its last answer in the meantime.
                    Err(DuelError::RoomClosed(_)) => Ok(None),
                    Err(err) => Err(err),
                }
            }
            RoomStatus::Completed | RoomStatus::Abandoned => Ok(None),
        }
    }

    /// Sessions tracked, in any state.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    // -- messages ---------------------------------------------------------

    /// Decodes one client frame, applies it, and returns the encoded reply.
    ///
    /// Rejections (undecodable frames, refused room operations) become a
    /// `ServerMessage::Error` reply.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if `user_id` has no connected session,
    /// or a protocol error if the reply cannot be encoded.
    pub async fn handle(
        &self,
        user_id: &UserId,
        frame: &[u8],
    ) -> Result<Vec<u8>, PromptDuelError> {
        self.ensure_connected(user_id).await?;

        let reply = match self.codec.decode::<ClientMessage<Answer<B>>>(frame) {
            Ok(message) => self.dispatch(user_id, message).await,
            Err(err) => {
                tracing::debug!(%user_id, error = %err, "undecodable client message");
                ServerMessage::Error {
                    code: "invalid_message".into(),
                    message: "That message could not be understood".into(),
                }
            }
        };
        Ok(self.codec.encode(&reply)?)
    }

    /// Events committed for `room_id` from now on.
    pub fn subscribe(&self, room_id: RoomId) -> broadcast::Receiver<RoomEvent> {
        self.hub.subscribe(room_id)
    }

    /// Wraps `event` in a `ServerMessage::Event` frame.
    pub fn encode_event(&self, event: &RoomEvent) -> Result<Vec<u8>, PromptDuelError> {
        let message: Reply<B> = ServerMessage::Event {
            event: event.clone(),
        };
        Ok(self.codec.encode(&message)?)
    }

    async fn ensure_connected(&self, user_id: &UserId) -> Result<(), SessionError> {
        let sessions = self.sessions.lock().await;
        match sessions.get(user_id) {
            Some(session) if session.state.is_connected() => Ok(()),
            _ => Err(SessionError::NotFound(user_id.clone())),
        }
    }

    async fn dispatch(&self, user_id: &UserId, message: ClientMessage<Answer<B>>) -> Reply<B> {
        let result = match message {
            ClientMessage::CreateRoom {
                topic,
                difficulty,
                item_count,
                min_players,
                max_players,
            } => {
                let config = DuelConfig {
                    item_count,
                    min_players,
                    max_players,
                };
                self.create(user_id, &topic, difficulty, config).await
            }
            ClientMessage::JoinRoom { room_id } => {
                match self.engine.join_room(room_id, user_id.clone()).await {
                    Ok(room) => {
                        self.attach(user_id, room_id).await;
                        Ok(ServerMessage::RoomDetails { room })
                    }
                    Err(err) => Err(err),
                }
            }
            ClientMessage::StartRoom { room_id } => self
                .engine
                .start_room(room_id, user_id)
                .await
                .map(|room| ServerMessage::RoomDetails { room }),
            ClientMessage::SubmitAnswer {
                room_id,
                question_index,
                answer,
            } => match self
                .engine
                .submit_answer(room_id, user_id, question_index, answer)
                .await
            {
                Ok(receipt) => {
                    // Re-seats a user whose session was re-created after
                    // expiring mid-duel; a closed room needs no seat.
                    if receipt.room_status.is_terminal() {
                        self.sessions.lock().await.detach_room(user_id, room_id);
                    } else {
                        self.attach(user_id, room_id).await;
                    }
                    Ok(ServerMessage::AnswerAccepted {
                        room_id: receipt.room_id,
                        question_index: receipt.question_index,
                        correct: receipt.correct,
                        score: receipt.score,
                        finished: receipt.finished,
                    })
                }
                Err(err) => Err(err),
            },
            ClientMessage::LeaveRoom { room_id } => {
                match self.engine.leave_room(room_id, user_id).await {
                    Ok(room) => {
                        self.sessions.lock().await.detach_room(user_id, room_id);
                        Ok(ServerMessage::RoomDetails { room })
                    }
                    Err(err) => Err(err),
                }
            }
            ClientMessage::GetRoomDetails { room_id } => self
                .engine
                .get_room_details(room_id)
                .await
                .map(|room| ServerMessage::RoomDetails { room }),
            ClientMessage::GetStandings { room_id } => self
                .engine
                .get_standings(room_id)
                .await
                .map(|standings| ServerMessage::Standings { room_id, standings }),
            ClientMessage::Heartbeat { client_time } => Ok(ServerMessage::HeartbeatAck {
                client_time,
                server_time: self.started.elapsed().as_millis() as u64,
            }),
        };

        result.unwrap_or_else(|err| {
            if err.is_fatal() {
                tracing::error!(%user_id, error = %err, "room operation failed");
            } else {
                tracing::debug!(%user_id, code = err.code(), "room operation rejected");
            }
            ServerMessage::Error {
                code: err.code().to_string(),
                message: user_message(&err),
            }
        })
    }

    async fn create(
        &self,
        user_id: &UserId,
        topic: &str,
        difficulty: Difficulty,
        config: DuelConfig,
    ) -> Result<Reply<B>, DuelError> {
        let room_id = self
            .engine
            .create_room(user_id.clone(), topic, difficulty, config)
            .await?;
        let room = self.engine.get_room_details(room_id).await?;
        Ok(ServerMessage::RoomDetails { room })
    }

    async fn attach(&self, user_id: &UserId, room_id: RoomId) {
        if let Err(err) = self.sessions.lock().await.attach_room(user_id, room_id) {
            tracing::debug!(%user_id, %room_id, error = %err, "session gone before attach");
        }
    }
}

/// The sentence shown to a user for a rejected room operation.
///
/// Infrastructure faults get a generic message; their detail stays in the
/// logs.
pub fn user_message(err: &DuelError) -> String {
    match err {
        DuelError::RoomNotFound(_) => "This duel does not exist".into(),
        DuelError::RoomNotJoinable { status, .. } if status.is_terminal() => {
            "This duel is over".into()
        }
        DuelError::RoomNotJoinable { .. } => "This duel has already started".into(),
        DuelError::RoomFull(_) => "This duel is full".into(),
        DuelError::AlreadyJoined(..) => "You are already in this duel".into(),
        DuelError::NotAParticipant(..) => "You are not part of this duel".into(),
        DuelError::DuplicateAnswer { .. } => "You already answered this question".into(),
        DuelError::InvalidQuestionIndex { .. } => "That question does not exist".into(),
        DuelError::RoomClosed(_) => "This duel is over".into(),
        DuelError::InsufficientQuestions { .. } => {
            "Not enough questions for this topic and difficulty".into()
        }
        DuelError::TransientConflict { .. } => "The duel is busy, please try again".into(),
        DuelError::NotRoomCreator(..) => "Only the creator can start this duel".into(),
        DuelError::NotEnoughPlayers { needed, .. } => {
            format!("At least {needed} players are needed to start")
        }
        DuelError::RoomNotStarted(_) => "This duel has not started yet".into(),
        DuelError::MembershipFrozen(_) => "You cannot leave a duel in progress".into(),
        DuelError::InvalidConfig(reason) => format!("Invalid duel settings: {reason}"),
        DuelError::StoreUnavailable(_) | DuelError::QuestionBankUnavailable(_) => {
            "Something went wrong, please try again".into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_room_full() {
        assert_eq!(user_message(&DuelError::RoomFull(RoomId::new())), "This duel is full");
    }

    #[test]
    fn test_user_message_not_joinable_depends_on_status() {
        let room_id = RoomId::new();
        let started = DuelError::RoomNotJoinable {
            room_id,
            status: RoomStatus::Active,
        };
        let over = DuelError::RoomNotJoinable {
            room_id,
            status: RoomStatus::Completed,
        };

        assert_eq!(user_message(&started), "This duel has already started");
        assert_eq!(user_message(&over), "This duel is over");
    }

    #[test]
    fn test_user_message_fatal_hides_detail() {
        let err = DuelError::StoreUnavailable("10.0.0.7:5432 refused".into());
        assert!(!user_message(&err).contains("10.0.0.7"));
    }
}
