//! Room store: atomic get and compare-and-set of whole room aggregates.
//!
//! The store knows nothing about the state machine. It keeps one document
//! per room together with a version counter, and refuses a write whose
//! expected version is not the current one. That refusal is what makes
//! joins, starts, and submissions linearizable per room without locks
//! held across requests.

use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use promptduel_protocol::{RoomId, RoomStatus};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::{Evaluate, Room};

/// A value together with the store version it was read or written at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Room store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("room {0} already exists")]
    AlreadyExists(RoomId),

    #[error("room {0} not found")]
    NotFound(RoomId),

    /// Someone else wrote the room since it was read.
    #[error("room {room_id} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        room_id: RoomId,
        expected: u64,
        actual: u64,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored document could not be converted to or from a room.
    #[error("room document is malformed: {0}")]
    Serialization(String),
}

/// Durable keyed storage of room aggregates with optimistic concurrency.
///
/// Versions start at 1 on insert and grow by one on every successful
/// replace.
pub trait RoomStore<Q: Evaluate>: Send + Sync + 'static {
    /// Loads the latest committed state of a room.
    fn get(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<Option<Versioned<Room<Q>>>, StoreError>> + Send;

    /// Stores a new room.
    ///
    /// # Errors
    /// [`StoreError::AlreadyExists`] if the id is taken.
    fn insert(
        &self,
        room: Room<Q>,
    ) -> impl Future<Output = Result<Versioned<Room<Q>>, StoreError>> + Send;

    /// Overwrites a room only if it is still at `expected_version`.
    ///
    /// # Errors
    /// [`StoreError::Conflict`] if the stored version moved on,
    /// [`StoreError::NotFound`] if the room is gone.
    fn replace(
        &self,
        room_id: RoomId,
        expected_version: u64,
        room: Room<Q>,
    ) -> impl Future<Output = Result<Versioned<Room<Q>>, StoreError>> + Send;

    /// Ids of rooms that are in their lobby or active.
    fn list_open(&self) -> impl Future<Output = Result<Vec<RoomId>, StoreError>> + Send;

    /// Ids of completed or abandoned rooms that closed before `cutoff`.
    fn list_closed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<RoomId>, StoreError>> + Send;

    /// Deletes a room. Returns `false` if it was not stored.
    fn remove(&self, room_id: RoomId) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// InMemoryRoomStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Document {
    version: u64,
    status: RoomStatus,
    closed_at: Option<DateTime<Utc>>,
    body: serde_json::Value,
}

/// A process-local room store holding rooms as JSON documents.
///
/// Rooms go through the same serialize/deserialize path a remote document
/// store would impose, so nothing can share memory with a stored room.
#[derive(Debug, Default)]
pub struct InMemoryRoomStore {
    documents: RwLock<HashMap<RoomId, Document>>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rooms, terminal ones included.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

fn encode<Q: Evaluate>(room: &Room<Q>) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(room).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<Q: Evaluate>(body: &serde_json::Value) -> Result<Room<Q>, StoreError> {
    Room::<Q>::deserialize(body).map_err(|e| StoreError::Serialization(e.to_string()))
}

impl<Q: Evaluate> RoomStore<Q> for InMemoryRoomStore {
    async fn get(&self, room_id: RoomId) -> Result<Option<Versioned<Room<Q>>>, StoreError> {
        let documents = self.documents.read().await;
        documents
            .get(&room_id)
            .map(|doc| {
                Ok(Versioned {
                    version: doc.version,
                    value: decode(&doc.body)?,
                })
            })
            .transpose()
    }

    async fn insert(&self, room: Room<Q>) -> Result<Versioned<Room<Q>>, StoreError> {
        let body = encode(&room)?;
        let mut documents = self.documents.write().await;
        if documents.contains_key(&room.id()) {
            return Err(StoreError::AlreadyExists(room.id()));
        }
        documents.insert(
            room.id(),
            Document {
                version: 1,
                status: room.status(),
                closed_at: room.closed_at(),
                body,
            },
        );
        Ok(Versioned {
            version: 1,
            value: room,
        })
    }

    async fn replace(
        &self,
        room_id: RoomId,
        expected_version: u64,
        room: Room<Q>,
    ) -> Result<Versioned<Room<Q>>, StoreError> {
        let body = encode(&room)?;
        let mut documents = self.documents.write().await;
        let doc = documents
            .get_mut(&room_id)
            .ok_or(StoreError::NotFound(room_id))?;
        if doc.version != expected_version {
            return Err(StoreError::Conflict {
                room_id,
                expected: expected_version,
                actual: doc.version,
            });
        }
        doc.version += 1;
        doc.status = room.status();
        doc.closed_at = room.closed_at();
        doc.body = body;
        Ok(Versioned {
            version: doc.version,
            value: room,
        })
    }

    async fn list_open(&self) -> Result<Vec<RoomId>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .filter(|(_, doc)| !doc.status.is_terminal())
            .map(|(id, _)| *id)
            .collect())
    }

    async fn list_closed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<RoomId>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .filter(|(_, doc)| doc.status.is_terminal())
            .filter(|(_, doc)| doc.closed_at.is_some_and(|closed| closed < cutoff))
            .map(|(id, _)| *id)
            .collect())
    }

    async fn remove(&self, room_id: RoomId) -> Result<bool, StoreError> {
        Ok(self.documents.write().await.remove(&room_id).is_some())
    }
}
