//! `DuelServer` builder and background tasks.
//!
//! Ties the layers together: store and bank → engine → broadcast hub →
//! gateway, plus the sweeper that enforces room and session deadlines.

use std::sync::Arc;

use promptduel_protocol::{Codec, JsonCodec};
use promptduel_room::{
    Clock, DuelEngine, InMemoryQuestionBank, InMemoryRoomStore, MultipleChoice, QuestionBank,
    RoomStore,
};
use promptduel_session::{Authenticator, StaticTokenAuthenticator};
use promptduel_sweep::{run_sweeper, SweepMetrics, SweepScheduler};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{BroadcastHub, Gateway, ServerConfig};

/// Builder for a [`DuelServer`].
///
/// # Example
///
/// ```rust,ignore
/// let mut server = DuelServer::builder()
///     .config(ServerConfig::from_env()?)
///     .build(InMemoryRoomStore::new(), bank, auth);
/// server.spawn_sweeper();
/// let session = server.gateway().connect(token).await?;
/// ```
#[derive(Default)]
pub struct DuelServerBuilder {
    config: ServerConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl DuelServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the system clock, e.g. with a `ManualClock` in tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Assembles the server with the JSON codec.
    pub fn build<S, B, A>(self, store: S, bank: B, auth: A) -> DuelServer<S, B, A, JsonCodec>
    where
        B: QuestionBank,
        S: RoomStore<B::Question>,
        A: Authenticator,
    {
        self.build_with_codec(store, bank, auth, JsonCodec)
    }

    pub fn build_with_codec<S, B, A, C>(
        self,
        store: S,
        bank: B,
        auth: A,
        codec: C,
    ) -> DuelServer<S, B, A, C>
    where
        B: QuestionBank,
        S: RoomStore<B::Question>,
        A: Authenticator,
        C: Codec,
    {
        let hub = Arc::new(BroadcastHub::new(self.config.event_buffer));

        let mut engine = DuelEngine::new(store, bank, self.config.engine.clone())
            .with_observer(hub.clone());
        if let Some(clock) = self.clock {
            engine = engine.with_clock(clock);
        }
        let engine = Arc::new(engine);

        let gateway = Arc::new(Gateway::new(
            engine.clone(),
            hub.clone(),
            auth,
            codec,
            self.config.session.clone(),
        ));

        tracing::info!(
            max_retries = self.config.engine.max_retries,
            duel_duration_secs = self.config.engine.duel_duration.as_secs(),
            lobby_timeout_secs = self.config.engine.lobby_timeout.as_secs(),
            reconnect_grace_secs = self.config.session.reconnect_grace_secs,
            "duel server assembled"
        );

        DuelServer {
            config: self.config,
            hub,
            engine,
            gateway,
            sweeper: None,
        }
    }
}

struct Sweeper {
    stop: watch::Sender<bool>,
    rooms: JoinHandle<SweepMetrics>,
    sessions: JoinHandle<()>,
}

/// An assembled PromptDuel server.
pub struct DuelServer<
    S = InMemoryRoomStore,
    B = InMemoryQuestionBank<MultipleChoice>,
    A = StaticTokenAuthenticator,
    C = JsonCodec,
> {
    config: ServerConfig,
    hub: Arc<BroadcastHub>,
    engine: Arc<DuelEngine<S, B>>,
    gateway: Arc<Gateway<S, B, A, C>>,
    sweeper: Option<Sweeper>,
}

impl DuelServer {
    pub fn builder() -> DuelServerBuilder {
        DuelServerBuilder::new()
    }
}

impl<S, B, A, C> DuelServer<S, B, A, C>
where
    B: QuestionBank,
    S: RoomStore<B::Question>,
    A: Authenticator,
    C: Codec,
{
    pub fn gateway(&self) -> &Arc<Gateway<S, B, A, C>> {
        &self.gateway
    }

    pub fn engine(&self) -> &Arc<DuelEngine<S, B>> {
        &self.engine
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Starts the background tasks expiring rooms and sessions.
    ///
    /// Returns `false` if they are already running or sweeping is
    /// disabled (`sweep.interval` is zero).
    pub fn spawn_sweeper(&mut self) -> bool {
        if self.sweeper.is_some() {
            return false;
        }
        let Some(interval) = self.config.sweep.period() else {
            tracing::info!("sweeping disabled");
            return false;
        };

        let (stop, stop_rx) = watch::channel(false);
        let rooms = tokio::spawn(run_sweeper(
            self.engine.clone(),
            SweepScheduler::new(self.config.sweep.clone()),
            stop_rx.clone(),
        ));

        let gateway = self.gateway.clone();
        let mut stop_sessions = stop_rx;
        let sessions = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    changed = stop_sessions.changed() => {
                        if changed.is_err() || *stop_sessions.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let expiry = gateway.expire_sessions().await;
                        if !expiry.expired.is_empty() {
                            tracing::info!(
                                expired = expiry.expired.len(),
                                left = expiry.left.len(),
                                abandoned = expiry.abandoned.len(),
                                "expired sessions released"
                            );
                        }
                    }
                }
            }
        });

        self.sweeper = Some(Sweeper {
            stop,
            rooms,
            sessions,
        });
        true
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.is_some()
    }

    /// Stops the background tasks and waits for them.
    ///
    /// Returns the room sweeper's metrics, or `None` if it never ran.
    pub async fn shutdown(mut self) -> Option<SweepMetrics> {
        let sweeper = self.sweeper.take()?;
        // Receivers may already be gone if a task panicked.
        let _ = sweeper.stop.send(true);

        if let Err(err) = sweeper.sessions.await {
            tracing::error!(error = %err, "session expiry task failed");
        }
        match sweeper.rooms.await {
            Ok(metrics) => Some(metrics),
            Err(err) => {
                tracing::error!(error = %err, "room sweeper task failed");
                None
            }
        }
    }
}
