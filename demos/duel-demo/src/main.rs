//! Runs one five-question duel between two users through the gateway and
//! prints the final standings. Logs are JSON lines on stdout; set
//! `RUST_LOG=debug` to see every transition.

use std::error::Error;

use promptduel::prelude::*;

const TOPIC: &str = "prompt-basics";

type Reply = ServerMessage<MultipleChoice, usize>;

fn question_bank() -> InMemoryQuestionBank<MultipleChoice> {
    let prompts = [
        ("Which prompt states the output format?", "\"Answer in JSON\"", "\"Answer\""),
        ("What makes a few-shot example useful?", "It matches the task", "It is long"),
        ("Where should constraints go?", "Stated explicitly", "Left implied"),
        ("How do you reduce ambiguity?", "Define terms", "Add adjectives"),
        ("What helps the model reason?", "Ask for steps", "Ask for brevity"),
        ("What belongs in a system prompt?", "Role and rules", "The user's question"),
        ("How should you iterate on a prompt?", "Test on examples", "Rewrite from memory"),
    ];
    let questions = prompts.iter().enumerate().map(|(i, (prompt, good, bad))| {
        MultipleChoice::new(
            format!("pb-{i}"),
            *prompt,
            vec![good.to_string(), bad.to_string()],
            0,
        )
    });
    InMemoryQuestionBank::new().with_pool(TOPIC, Difficulty::Beginner, questions)
}

async fn send<S, B, A, C>(
    gateway: &Gateway<S, B, A, C>,
    user: &UserId,
    message: ClientMessage<usize>,
) -> Result<Reply, Box<dyn Error>>
where
    B: QuestionBank<Question = MultipleChoice>,
    S: RoomStore<MultipleChoice>,
    A: Authenticator,
    C: Codec,
{
    let frame = serde_json::to_vec(&message)?;
    let reply = gateway.handle(user, &frame).await?;
    Ok(serde_json::from_slice(&reply)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut config = ServerConfig::from_env()?;
    config.log_format = LogFormat::Json;
    init_tracing(config.log_format)?;

    let auth = StaticTokenAuthenticator::new()
        .with_token("tok-ada", "ada")
        .with_token("tok-grace", "grace");
    let mut server = DuelServer::builder()
        .config(config)
        .build(InMemoryRoomStore::new(), question_bank(), auth);
    server.spawn_sweeper();
    let gateway = server.gateway().clone();

    let ada = gateway.connect("tok-ada").await?.user_id;
    let grace = gateway.connect("tok-grace").await?.user_id;

    let created = send(
        &gateway,
        &ada,
        ClientMessage::CreateRoom {
            topic: TOPIC.into(),
            difficulty: Difficulty::Beginner,
            item_count: 5,
            min_players: 2,
            max_players: 2,
        },
    )
    .await?;
    let room_id = match created {
        ServerMessage::RoomDetails { room } => room.room_id,
        other => return Err(format!("room creation failed: {other:?}").into()),
    };

    let mut events = gateway.subscribe(room_id);
    let watcher = tokio::spawn(async move {
        let mut seen = 0usize;
        while let Ok(event) = events.recv().await {
            tracing::info!(version = event.version, kind = ?event.kind, "room event");
            seen += 1;
        }
        seen
    });

    for user in [&ada, &grace] {
        send(&gateway, user, ClientMessage::JoinRoom { room_id }).await?;
    }

    // Ada answers everything right; Grace misses two.
    let plans = [(&ada, [0, 0, 0, 0, 0]), (&grace, [0, 1, 0, 1, 0])];
    for question_index in 0..5 {
        for (user, answers) in &plans {
            let reply = send(
                &gateway,
                user,
                ClientMessage::SubmitAnswer {
                    room_id,
                    question_index,
                    answer: answers[question_index],
                },
            )
            .await?;
            if let ServerMessage::Error { code, message } = reply {
                tracing::warn!(%code, %message, "answer rejected");
            }
        }
    }

    let standings = send(&gateway, &ada, ClientMessage::GetStandings { room_id }).await?;
    if let ServerMessage::Standings { standings, .. } = standings {
        for entry in &standings {
            println!(
                "#{} {} score={} answered={} status={:?}",
                entry.rank, entry.user_id, entry.score, entry.answered, entry.status
            );
        }
    }

    let seen = watcher.await?;
    tracing::info!(events = seen, "duel finished");

    drop(gateway);
    server.shutdown().await;
    Ok(())
}
