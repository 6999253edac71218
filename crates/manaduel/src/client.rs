//! `DuelClient`: one participant's entry point.
//!
//! A client owns the store handle explicitly; nothing in Manaduel reaches
//! for a global connection. Build it, connect, join rooms, and disconnect
//! when done.

use std::sync::Arc;

use manaduel_protocol::{ParticipantId, RoomCode};
use manaduel_room::{DriverHandle, JoinRole, RoomConfig, RoomController, Seat, spawn_driver};
use manaduel_store::SharedStore;
use manaduel_tick::{Clock, SystemClock};
use tracing::info;

use crate::DuelError;

/// Builder for [`DuelClient`].
///
/// # Example
///
/// ```rust,no_run
/// use manaduel::prelude::*;
///
/// # async fn demo() -> Result<(), DuelError> {
/// let backend = MemoryBackend::new();
/// let client = DuelClient::builder(backend.client())
///     .participant("u-42")
///     .connect()
///     .await?;
/// let (room, seat) = client.join("Arena", "Nova", JoinRole::Fighter).await?;
/// # Ok(())
/// # }
/// ```
pub struct DuelClientBuilder<S: SharedStore, C: Clock> {
    store: S,
    clock: C,
    participant: String,
    config: RoomConfig,
}

impl<S: SharedStore, C: Clock + Clone> DuelClientBuilder<S, C> {
    /// Sets the participant id (usually the auth provider's user id).
    pub fn participant(mut self, id: &str) -> Self {
        self.participant = id.to_string();
        self
    }

    /// Sets the room configuration used for every room this client joins.
    pub fn config(mut self, config: RoomConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the wall clock.
    pub fn clock<C2: Clock + Clone>(self, clock: C2) -> DuelClientBuilder<S, C2> {
        DuelClientBuilder {
            store: self.store,
            clock,
            participant: self.participant,
            config: self.config,
        }
    }

    /// Validates the settings and opens the store session.
    pub async fn connect(self) -> Result<DuelClient<S, C>, DuelError> {
        let participant = ParticipantId::parse(&self.participant)?;
        self.store.connect().await?;
        info!(participant = %participant, "duel client connected");
        Ok(DuelClient {
            store: Arc::new(self.store),
            clock: self.clock,
            participant,
            config: self.config.validated(),
        })
    }
}

/// A connected participant.
pub struct DuelClient<S: SharedStore, C: Clock = SystemClock> {
    store: Arc<S>,
    clock: C,
    participant: ParticipantId,
    config: RoomConfig,
}

impl<S: SharedStore> DuelClient<S, SystemClock> {
    /// Starts building a client on top of `store`.
    pub fn builder(store: S) -> DuelClientBuilder<S, SystemClock> {
        DuelClientBuilder {
            store,
            clock: SystemClock,
            participant: String::new(),
            config: RoomConfig::default(),
        }
    }
}

impl<S: SharedStore, C: Clock + Clone> DuelClient<S, C> {
    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// A controller for room `code`, without joining it.
    pub fn room(&self, code: &str) -> Result<Arc<RoomController<S, C>>, DuelError> {
        let code = RoomCode::parse(code)?;
        Ok(Arc::new(RoomController::new(
            code,
            self.participant.clone(),
            self.config.clone(),
            Arc::clone(&self.store),
            self.clock.clone(),
        )))
    }

    /// Joins (and if needed creates) room `code`.
    pub async fn join(
        &self,
        code: &str,
        name: &str,
        role: JoinRole,
    ) -> Result<(Arc<RoomController<S, C>>, Seat), DuelError> {
        let room = self.room(code)?;
        let seat = room.join(name, role).await?;
        Ok((room, seat))
    }

    /// Spawns a round driver for `room` with this client's poll settings.
    pub fn drive(&self, room: &Arc<RoomController<S, C>>) -> DriverHandle {
        spawn_driver(Arc::clone(room), self.config.poll.clone())
    }

    /// Closes the store session. Drivers still running will log store
    /// errors until shut down.
    pub async fn disconnect(self) -> Result<(), DuelError> {
        self.store.disconnect().await?;
        info!(participant = %self.participant, "duel client disconnected");
        Ok(())
    }
}
