//! Fan-out of committed room transitions to subscribers.
//!
//! The engine reports every committed transition to its observer. The hub
//! is that observer: it keeps one `tokio::sync::broadcast` channel per
//! room that has subscribers and forwards each [`RoomEvent`] into it.
//! A room's channel is dropped after its `Completed` or `Abandoned` event,
//! which ends every subscriber's stream.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use promptduel_protocol::{RoomEvent, RoomEventKind, RoomId};
use promptduel_room::RoomObserver;
use tokio::sync::broadcast;

pub struct BroadcastHub {
    channels: Mutex<HashMap<RoomId, broadcast::Sender<RoomEvent>>>,
    capacity: usize,
}

impl BroadcastHub {
    /// A hub whose per-room channels buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Receives every event committed for `room_id` from now on.
    ///
    /// A receiver that lags more than the buffer gets
    /// `RecvError::Lagged` and should re-fetch the room snapshot.
    pub fn subscribe(&self, room_id: RoomId) -> broadcast::Receiver<RoomEvent> {
        self.channels()
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Live receivers for `room_id`.
    pub fn subscriber_count(&self, room_id: RoomId) -> usize {
        self.channels()
            .get(&room_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Rooms that currently have a channel.
    pub fn room_count(&self) -> usize {
        self.channels().len()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<RoomId, broadcast::Sender<RoomEvent>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RoomObserver for BroadcastHub {
    fn on_room_event(&self, event: &RoomEvent) {
        let mut channels = self.channels();
        let Some(sender) = channels.get(&event.room_id) else {
            return;
        };

        if sender.send(event.clone()).is_err() {
            // Every receiver is gone.
            channels.remove(&event.room_id);
            return;
        }
        tracing::trace!(room_id = %event.room_id, version = event.version, "event broadcast");

        if matches!(
            event.kind,
            RoomEventKind::Completed { .. } | RoomEventKind::Abandoned
        ) {
            channels.remove(&event.room_id);
            tracing::debug!(room_id = %event.room_id, "room closed, channel dropped");
        }
    }
}
