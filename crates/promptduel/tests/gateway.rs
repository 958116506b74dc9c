//! Integration tests for the gateway and server assembly: client frames in,
//! replies and room events out.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use promptduel::prelude::*;
use promptduel_protocol::{CompletionReason, ParticipantStatus};
use tokio::sync::broadcast::error::TryRecvError;

// =========================================================================
// Helpers
// =========================================================================

const TOPIC: &str = "prompt-basics";

type Reply = ServerMessage<MultipleChoice, usize>;
type Snapshot = RoomSnapshot<MultipleChoice, usize>;

fn uid(s: &str) -> UserId {
    UserId::new(s)
}

/// Every question's correct option is 0.
fn bank() -> InMemoryQuestionBank<MultipleChoice> {
    let questions = (0..10).map(|i| {
        MultipleChoice::new(
            format!("q{i}"),
            format!("question {i}"),
            vec!["right".into(), "wrong".into()],
            0,
        )
    });
    InMemoryQuestionBank::new().with_pool(TOPIC, Difficulty::Beginner, questions)
}

fn auth() -> StaticTokenAuthenticator {
    StaticTokenAuthenticator::new()
        .with_token("tok-alice", "alice")
        .with_token("tok-bob", "bob")
        .with_token("tok-carol", "carol")
}

fn server_with(config: ServerConfig) -> (DuelServer, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap(),
    ));
    let server = DuelServer::builder()
        .config(config)
        .clock(clock.clone())
        .build(InMemoryRoomStore::new(), bank(), auth());
    (server, clock)
}

fn server() -> DuelServer {
    server_with(ServerConfig::default()).0
}

/// A server whose sessions expire as soon as they disconnect.
fn server_without_grace() -> DuelServer {
    server_with(ServerConfig {
        session: SessionConfig {
            reconnect_grace_secs: 0,
        },
        ..ServerConfig::default()
    })
    .0
}

async fn send(server: &DuelServer, user: &str, message: ClientMessage<usize>) -> Reply {
    let frame = serde_json::to_vec(&message).unwrap();
    let reply = server.gateway().handle(&uid(user), &frame).await.unwrap();
    serde_json::from_slice(&reply).unwrap()
}

fn room(reply: Reply) -> Snapshot {
    match reply {
        ServerMessage::RoomDetails { room } => room,
        other => panic!("expected RoomDetails, got {other:?}"),
    }
}

fn error_code(reply: &Reply) -> &str {
    match reply {
        ServerMessage::Error { code, .. } => code.as_str(),
        other => panic!("expected Error, got {other:?}"),
    }
}

async fn create(server: &DuelServer, user: &str, items: usize, min: usize, max: usize) -> RoomId {
    let reply = send(
        server,
        user,
        ClientMessage::CreateRoom {
            topic: TOPIC.into(),
            difficulty: Difficulty::Beginner,
            item_count: items,
            min_players: min,
            max_players: max,
        },
    )
    .await;
    room(reply).room_id
}

async fn connect_all(server: &DuelServer, tokens: &[&str]) {
    for token in tokens {
        server.gateway().connect(token).await.unwrap();
    }
}

/// Lets a zero grace period elapse.
fn past_grace() {
    std::thread::sleep(Duration::from_millis(2));
}

// =========================================================================
// Connection lifecycle
// =========================================================================

#[tokio::test]
async fn test_connect_known_token_opens_session() {
    let server = server();

    let session = server.gateway().connect("tok-alice").await.unwrap();

    assert_eq!(session.user_id, uid("alice"));
    assert!(session.rooms.is_empty());
    assert_eq!(server.gateway().session_count().await, 1);
}

#[tokio::test]
async fn test_connect_unknown_token_fails_auth() {
    let server = server();

    let err = server.gateway().connect("tok-mallory").await.unwrap_err();

    assert!(matches!(
        err,
        PromptDuelError::Session(SessionError::AuthFailed(_))
    ));
}

#[tokio::test]
async fn test_connect_twice_already_connected() {
    let server = server();
    server.gateway().connect("tok-alice").await.unwrap();

    let err = server.gateway().connect("tok-alice").await.unwrap_err();

    assert!(matches!(
        err,
        PromptDuelError::Session(SessionError::AlreadyConnected(_))
    ));
}

#[tokio::test]
async fn test_handle_without_session_returns_not_found() {
    let server = server();
    let frame = serde_json::to_vec(&ClientMessage::<usize>::Heartbeat { client_time: 1 }).unwrap();

    let err = server.gateway().handle(&uid("alice"), &frame).await.unwrap_err();

    assert!(matches!(
        err,
        PromptDuelError::Session(SessionError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_handle_after_disconnect_rejected_until_reconnect() {
    let server = server();
    let token = server.gateway().connect("tok-alice").await.unwrap().reconnect_token;
    server.gateway().disconnect(&uid("alice")).await.unwrap();
    let frame = serde_json::to_vec(&ClientMessage::<usize>::Heartbeat { client_time: 1 }).unwrap();

    assert!(server.gateway().handle(&uid("alice"), &frame).await.is_err());

    let session = server.gateway().reconnect(&token).await.unwrap();
    assert_eq!(session.user_id, uid("alice"));
    assert!(server.gateway().handle(&uid("alice"), &frame).await.is_ok());
}

// =========================================================================
// Message handling
// =========================================================================

#[tokio::test]
async fn test_handle_heartbeat_echoes_client_time() {
    let server = server();
    connect_all(&server, &["tok-alice"]).await;

    let reply = send(&server, "alice", ClientMessage::Heartbeat { client_time: 42 }).await;

    assert!(matches!(
        reply,
        ServerMessage::HeartbeatAck { client_time: 42, .. }
    ));
}

#[tokio::test]
async fn test_handle_garbage_frame_replies_invalid_message() {
    let server = server();
    connect_all(&server, &["tok-alice"]).await;

    let bytes = server.gateway().handle(&uid("alice"), b"{nope").await.unwrap();
    let reply: Reply = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(error_code(&reply), "invalid_message");
}

#[tokio::test]
async fn test_handle_create_room_does_not_seat_creator() {
    let server = server();
    connect_all(&server, &["tok-alice"]).await;

    let reply = send(
        &server,
        "alice",
        ClientMessage::CreateRoom {
            topic: TOPIC.into(),
            difficulty: Difficulty::Beginner,
            item_count: 3,
            min_players: 2,
            max_players: 4,
        },
    )
    .await;
    let snapshot = room(reply);

    assert_eq!(snapshot.status, RoomStatus::Lobby);
    assert_eq!(snapshot.creator, uid("alice"));
    assert_eq!(snapshot.questions.len(), 3);
    assert!(snapshot.participants.is_empty());
}

#[tokio::test]
async fn test_handle_create_room_invalid_settings_replies_error() {
    let server = server();
    connect_all(&server, &["tok-alice"]).await;

    let reply = send(
        &server,
        "alice",
        ClientMessage::CreateRoom {
            topic: TOPIC.into(),
            difficulty: Difficulty::Beginner,
            item_count: 3,
            min_players: 1,
            max_players: 4,
        },
    )
    .await;

    assert_eq!(error_code(&reply), "invalid_config");
}

#[tokio::test]
async fn test_handle_join_full_room_replies_room_full() {
    let server = server();
    connect_all(&server, &["tok-alice", "tok-bob", "tok-carol"]).await;
    let room_id = create(&server, "alice", 3, 2, 2).await;
    send(&server, "alice", ClientMessage::JoinRoom { room_id }).await;
    let second = room(send(&server, "bob", ClientMessage::JoinRoom { room_id }).await);
    assert_eq!(second.status, RoomStatus::Active, "filling the room starts it");

    let reply = send(&server, "carol", ClientMessage::JoinRoom { room_id }).await;

    match reply {
        ServerMessage::Error { code, message } => {
            assert_eq!(code, "room_full");
            assert_eq!(message, "This duel is full");
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handle_start_by_non_creator_rejected() {
    let server = server();
    connect_all(&server, &["tok-alice", "tok-bob", "tok-carol"]).await;
    let room_id = create(&server, "alice", 3, 2, 4).await;
    send(&server, "bob", ClientMessage::JoinRoom { room_id }).await;
    send(&server, "carol", ClientMessage::JoinRoom { room_id }).await;

    let reply = send(&server, "bob", ClientMessage::StartRoom { room_id }).await;
    assert_eq!(error_code(&reply), "not_room_creator");

    let started = room(send(&server, "alice", ClientMessage::StartRoom { room_id }).await);
    assert_eq!(started.status, RoomStatus::Active);
}

#[tokio::test]
async fn test_handle_leave_lobby_detaches_session() {
    let server = server();
    connect_all(&server, &["tok-alice", "tok-bob"]).await;
    let room_id = create(&server, "alice", 3, 2, 4).await;
    send(&server, "alice", ClientMessage::JoinRoom { room_id }).await;
    send(&server, "bob", ClientMessage::JoinRoom { room_id }).await;

    let after = room(send(&server, "bob", ClientMessage::LeaveRoom { room_id }).await);

    assert_eq!(after.participant_count(), 1);
    assert!(!after.has_participant(&uid("bob")));
}

#[tokio::test]
async fn test_handle_full_duel_completes_with_ranking_and_events() {
    let server = server();
    connect_all(&server, &["tok-alice", "tok-bob"]).await;
    let room_id = create(&server, "alice", 3, 2, 2).await;
    let mut events = server.gateway().subscribe(room_id);

    send(&server, "alice", ClientMessage::JoinRoom { room_id }).await;
    send(&server, "bob", ClientMessage::JoinRoom { room_id }).await;

    for (user, answers) in [("alice", [0, 0, 0]), ("bob", [0, 1, 1])] {
        for (question_index, answer) in answers.into_iter().enumerate() {
            let reply = send(
                &server,
                user,
                ClientMessage::SubmitAnswer {
                    room_id,
                    question_index,
                    answer,
                },
            )
            .await;
            match reply {
                ServerMessage::AnswerAccepted { correct, finished, .. } => {
                    assert_eq!(correct, answer == 0);
                    assert_eq!(finished, question_index == 2);
                }
                other => panic!("expected AnswerAccepted, got {other:?}"),
            }
        }
    }

    let reply = send(&server, "bob", ClientMessage::GetStandings { room_id }).await;
    let standings = match reply {
        ServerMessage::Standings { standings, .. } => standings,
        other => panic!("expected Standings, got {other:?}"),
    };
    assert_eq!(standings[0].user_id, uid("alice"));
    assert_eq!(standings[0].score, 3);
    assert_eq!(standings[1].user_id, uid("bob"));
    assert_eq!(standings[1].score, 1);
    assert!(standings.iter().all(|s| s.status == ParticipantStatus::Finished));

    let details = room(send(&server, "alice", ClientMessage::GetRoomDetails { room_id }).await);
    assert_eq!(details.status, RoomStatus::Completed);
    assert_eq!(details.completion, Some(CompletionReason::AllFinished));

    let mut received = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => received.push(event),
            Err(TryRecvError::Closed) => break,
            Err(other) => panic!("unexpected receive error {other:?}"),
        }
    }
    assert!(received.windows(2).all(|w| w[0].version <= w[1].version));
    assert!(received.iter().any(|e| e.kind == RoomEventKind::Started));
    assert_eq!(
        received.last().map(|e| e.kind.clone()),
        Some(RoomEventKind::Completed {
            reason: CompletionReason::AllFinished
        })
    );
}

#[tokio::test]
async fn test_handle_duplicate_answer_replies_error() {
    let server = server();
    connect_all(&server, &["tok-alice", "tok-bob"]).await;
    let room_id = create(&server, "alice", 3, 2, 2).await;
    send(&server, "alice", ClientMessage::JoinRoom { room_id }).await;
    send(&server, "bob", ClientMessage::JoinRoom { room_id }).await;
    let answer = ClientMessage::SubmitAnswer {
        room_id,
        question_index: 0,
        answer: 0,
    };
    send(&server, "alice", answer.clone()).await;

    let reply = send(&server, "alice", answer).await;

    assert_eq!(error_code(&reply), "duplicate_answer");
}

#[test]
fn test_encode_event_wraps_in_event_message() {
    let server = server();
    let event = RoomEvent {
        room_id: RoomId::new(),
        version: 4,
        status: RoomStatus::Active,
        kind: RoomEventKind::Started,
        standings: Vec::new(),
        at: Utc::now(),
    };

    let bytes = server.gateway().encode_event(&event).unwrap();
    let decoded: Reply = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(decoded, ServerMessage::Event { event });
}

// =========================================================================
// Session expiry
// =========================================================================

#[tokio::test]
async fn test_expire_sessions_lobby_member_leaves_room() {
    let server = server_without_grace();
    connect_all(&server, &["tok-alice", "tok-bob"]).await;
    let room_id = create(&server, "alice", 3, 2, 4).await;
    send(&server, "alice", ClientMessage::JoinRoom { room_id }).await;
    send(&server, "bob", ClientMessage::JoinRoom { room_id }).await;
    server.gateway().disconnect(&uid("bob")).await.unwrap();
    past_grace();

    let expiry = server.gateway().expire_sessions().await;

    assert_eq!(expiry.expired, vec![uid("bob")]);
    assert_eq!(expiry.left, vec![room_id]);
    let details = server.engine().get_room_details(room_id).await.unwrap();
    assert_eq!(details.status, RoomStatus::Lobby);
    assert!(!details.has_participant(&uid("bob")));
    assert_eq!(server.gateway().session_count().await, 1);
}

#[tokio::test]
async fn test_expire_sessions_active_room_kept_while_someone_connected() {
    let server = server_without_grace();
    connect_all(&server, &["tok-alice", "tok-bob"]).await;
    let room_id = create(&server, "alice", 3, 2, 2).await;
    send(&server, "alice", ClientMessage::JoinRoom { room_id }).await;
    send(&server, "bob", ClientMessage::JoinRoom { room_id }).await;
    server.gateway().disconnect(&uid("bob")).await.unwrap();
    past_grace();

    let expiry = server.gateway().expire_sessions().await;

    assert_eq!(expiry.expired, vec![uid("bob")]);
    assert!(expiry.abandoned.is_empty());
    let details = server.engine().get_room_details(room_id).await.unwrap();
    assert_eq!(details.status, RoomStatus::Active);
}

#[tokio::test]
async fn test_expire_sessions_last_participant_gone_abandons_duel() {
    let server = server_without_grace();
    connect_all(&server, &["tok-alice", "tok-bob"]).await;
    let room_id = create(&server, "alice", 3, 2, 2).await;
    send(&server, "alice", ClientMessage::JoinRoom { room_id }).await;
    send(&server, "bob", ClientMessage::JoinRoom { room_id }).await;
    server.gateway().disconnect(&uid("alice")).await.unwrap();
    server.gateway().disconnect(&uid("bob")).await.unwrap();
    past_grace();

    let expiry = server.gateway().expire_sessions().await;

    assert_eq!(expiry.expired.len(), 2);
    assert_eq!(expiry.abandoned, vec![room_id]);
    let details = server.engine().get_room_details(room_id).await.unwrap();
    assert_eq!(details.status, RoomStatus::Abandoned);
    assert_eq!(server.gateway().session_count().await, 0);
}

#[tokio::test]
async fn test_expire_sessions_opponent_in_another_room_still_counts_as_present() {
    let server = server_without_grace();
    connect_all(&server, &["tok-alice", "tok-bob", "tok-carol"]).await;
    let duel = create(&server, "carol", 3, 2, 2).await;
    send(&server, "alice", ClientMessage::JoinRoom { room_id: duel }).await;
    let started = room(send(&server, "bob", ClientMessage::JoinRoom { room_id: duel }).await);
    assert_eq!(started.status, RoomStatus::Active);
    create(&server, "alice", 3, 2, 4).await;
    server.gateway().disconnect(&uid("bob")).await.unwrap();
    past_grace();

    let expiry = server.gateway().expire_sessions().await;

    assert_eq!(expiry.expired, vec![uid("bob")]);
    assert!(expiry.abandoned.is_empty());
    let details = server.engine().get_room_details(duel).await.unwrap();
    assert_eq!(details.status, RoomStatus::Active);
    let reply = send(
        &server,
        "alice",
        ClientMessage::SubmitAnswer {
            room_id: duel,
            question_index: 0,
            answer: 0,
        },
    )
    .await;
    assert!(matches!(reply, ServerMessage::AnswerAccepted { correct: true, .. }));
}

#[tokio::test]
async fn test_expire_sessions_releases_every_seat_of_user() {
    let server = server_without_grace();
    connect_all(&server, &["tok-alice", "tok-bob", "tok-carol"]).await;
    let duel = create(&server, "carol", 3, 2, 2).await;
    send(&server, "alice", ClientMessage::JoinRoom { room_id: duel }).await;
    send(&server, "bob", ClientMessage::JoinRoom { room_id: duel }).await;
    let lobby = create(&server, "carol", 3, 2, 4).await;
    send(&server, "alice", ClientMessage::JoinRoom { room_id: lobby }).await;
    send(&server, "carol", ClientMessage::JoinRoom { room_id: lobby }).await;
    server.gateway().disconnect(&uid("alice")).await.unwrap();
    past_grace();

    let expiry = server.gateway().expire_sessions().await;

    assert_eq!(expiry.left, vec![lobby]);
    assert!(expiry.abandoned.is_empty(), "bob is still playing");
    let lobby_room = server.engine().get_room_details(lobby).await.unwrap();
    assert!(!lobby_room.has_participant(&uid("alice")));
    assert!(lobby_room.has_participant(&uid("carol")));
    let duel_room = server.engine().get_room_details(duel).await.unwrap();
    assert_eq!(duel_room.status, RoomStatus::Active);
}

#[tokio::test]
async fn test_expire_sessions_creator_without_seat_leaves_room_untouched() {
    let server = server_without_grace();
    connect_all(&server, &["tok-alice", "tok-bob"]).await;
    let room_id = create(&server, "alice", 3, 2, 4).await;
    send(&server, "bob", ClientMessage::JoinRoom { room_id }).await;
    server.gateway().disconnect(&uid("alice")).await.unwrap();
    past_grace();

    let expiry = server.gateway().expire_sessions().await;

    assert_eq!(expiry.expired, vec![uid("alice")]);
    assert!(expiry.left.is_empty());
    let details = server.engine().get_room_details(room_id).await.unwrap();
    assert_eq!(details.status, RoomStatus::Lobby);
    assert!(details.has_participant(&uid("bob")));
}

// =========================================================================
// Server assembly
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_spawn_sweeper_abandons_stale_lobby_and_shuts_down() {
    let (mut server, clock) = server_with(ServerConfig {
        sweep: SweepConfig {
            initial_jitter_ms: 0,
            ..SweepConfig::every(Duration::from_secs(1))
        },
        ..ServerConfig::default()
    });
    let room_id = server
        .engine()
        .create_room(uid("alice"), TOPIC, Difficulty::Beginner, DuelConfig::default())
        .await
        .unwrap();
    clock.advance(TimeDelta::seconds(301));

    assert!(server.spawn_sweeper());
    assert!(!server.spawn_sweeper(), "already running");
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let details = server.engine().get_room_details(room_id).await.unwrap();
    assert_eq!(details.status, RoomStatus::Abandoned);

    let metrics = server.shutdown().await.unwrap();
    assert_eq!(metrics.rooms_abandoned, 1);
}

#[tokio::test]
async fn test_spawn_sweeper_disabled_interval_does_nothing() {
    let (mut server, _clock) = server_with(ServerConfig {
        sweep: SweepConfig::every(Duration::ZERO),
        ..ServerConfig::default()
    });

    assert!(!server.spawn_sweeper());
    assert!(!server.is_sweeping());
    assert_eq!(server.shutdown().await, None);
}
