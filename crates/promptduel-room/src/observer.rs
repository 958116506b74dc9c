//! Hook for whoever pushes room changes to connected clients.

use promptduel_protocol::RoomEvent;

/// Receives every committed room transition.
///
/// Called after the store write succeeded, never for rejected or retried
/// attempts. Writers on different tasks may deliver out of order; the
/// event's `version` gives the commit order. Implementations must not
/// block: the engine calls this inline.
pub trait RoomObserver: Send + Sync + 'static {
    fn on_room_event(&self, event: &RoomEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RoomObserver for NoopObserver {
    fn on_room_event(&self, _event: &RoomEvent) {}
}
