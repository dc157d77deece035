//! Room Registry
//!
//! Tracks every connected client and every room. Lock order is always
//! registry first, then room; room tasks never touch the registry.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::rng::DeterministicRng;
use crate::game::state::PlayerId;
use crate::network::protocol::{ClientMessage, RoomListing, ServerMessage};
use crate::network::room::{send, Outbox, Room, RoomConfig, RoomError, RoomHandle};

/// Connection identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A live room already uses the name.
    #[error("Room Name Taken")]
    NameTaken,

    /// No room by that name.
    #[error("no room named {0:?}")]
    UnknownRoom(String),

    /// Room command from a lobby client.
    #[error("client is not in a room")]
    NotInRoom,

    /// Connection is not registered.
    #[error("unknown client {0}")]
    UnknownClient(ClientId),

    /// Rejected by the room.
    #[error(transparent)]
    Room(#[from] RoomError),
}

impl RegistryError {
    /// Text for an `ERROR;` reply, if the client should be told.
    pub fn client_reason(&self) -> Option<&'static str> {
        match self {
            RegistryError::NameTaken => Some("Room Name Taken"),
            RegistryError::Room(e) => e.client_reason(),
            _ => None,
        }
    }
}

/// A connected client.
#[derive(Debug)]
struct ConnectedClient {
    sender: Outbox,
    addr: SocketAddr,
    seat: Option<Seat>,
}

/// Where a client sits.
#[derive(Debug, Clone)]
struct Seat {
    room: String,
    player: PlayerId,
}

#[derive(Default)]
struct RegistryInner {
    rooms: BTreeMap<String, RoomHandle>,
    clients: BTreeMap<ClientId, ConnectedClient>,
}

/// All rooms and clients on the server.
pub struct RoomRegistry {
    inner: Mutex<RegistryInner>,
    room_config: RoomConfig,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new(room_config: RoomConfig) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            room_config,
        }
    }

    /// Register a connection. Lobby clients get a fresh `ROOM_LIST`.
    pub async fn connect(&self, sender: Outbox, addr: SocketAddr) -> ClientId {
        let id = ClientId::new();
        let mut inner = self.inner.lock().await;
        inner.clients.insert(
            id,
            ConnectedClient {
                sender,
                addr,
                seat: None,
            },
        );
        info!(client = %id, %addr, "Client connected");
        broadcast_room_list(&inner).await;
        id
    }

    /// Drop a connection, leaving its room first.
    pub async fn disconnect(&self, client: ClientId) {
        let mut inner = self.inner.lock().await;
        self.vacate_seat(&mut inner, client).await;
        if let Some(c) = inner.clients.remove(&client) {
            info!(client = %client, addr = %c.addr, "Client disconnected");
        }
    }

    /// Apply one parsed command.
    pub async fn dispatch(&self, client: ClientId, msg: ClientMessage) -> Result<(), RegistryError> {
        match msg {
            ClientMessage::CreateRoom { name, private, password } => {
                self.create_room(client, &name, private, &password).await
            }
            ClientMessage::JoinRoom { name, password } => self.join_room(client, &name, &password).await,
            ClientMessage::LeaveRoom => self.leave_room(client).await,
            ClientMessage::StartGame => self.start_game(client).await,
            ClientMessage::VoteRematch => {
                let (room, player) = self.seat_of(client).await?;
                room.write().await.vote_rematch(player)?;
                Ok(())
            }
            ClientMessage::KickPlayer { target } => self.kick(client, target).await,
            ClientMessage::Input { key, pressed } => {
                let (room, player) = self.seat_of(client).await?;
                room.write().await.set_input(player, key, pressed)?;
                Ok(())
            }
            ClientMessage::PlaceBomb => {
                let (room, player) = self.seat_of(client).await?;
                room.write().await.place_bomb(player)?;
                Ok(())
            }
        }
    }

    /// Create a room and seat the creator in it.
    pub async fn create_room(
        &self,
        client: ClientId,
        name: &str,
        private: bool,
        password: &str,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        let sender = client_sender(&inner, client)?;

        if let Some(existing) = inner.rooms.get(name) {
            if !existing.room.read().await.is_empty() {
                return Err(RegistryError::NameTaken);
            }
            // Reclaim a stale empty room
            if let Some(stale) = inner.rooms.remove(name) {
                tokio::spawn(stale.stop());
            }
        }

        self.vacate_seat(&mut inner, client).await;

        let password = (private && !password.is_empty()).then(|| password.to_string());
        let mut room = Room::new(name, password, self.room_config.clone(), DeterministicRng::from_entropy());
        let player = room.join(sender)?;
        info!(room = %name, private = room.is_private(), "Room created");

        inner.rooms.insert(name.to_string(), RoomHandle::spawn(room));
        seat_client(&mut inner, client, name, player);
        broadcast_room_list(&inner).await;
        Ok(())
    }

    /// Join an existing room.
    pub async fn join_room(&self, client: ClientId, name: &str, password: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        let sender = client_sender(&inner, client)?;

        let already_here = inner
            .clients
            .get(&client)
            .and_then(|c| c.seat.as_ref())
            .is_some_and(|s| s.room == name);
        if already_here {
            return Ok(());
        }

        let room = inner
            .rooms
            .get(name)
            .map(|h| h.room.clone())
            .ok_or_else(|| RegistryError::UnknownRoom(name.to_string()))?;
        // Hold the target room from the checks through the join so a client
        // is never pulled out of its old seat for a join that cannot land
        let mut target = room.write().await;
        target.check_password(password)?;
        target.check_capacity()?;

        self.vacate_seat(&mut inner, client).await;

        let player = target.join(sender)?;
        drop(target);
        seat_client(&mut inner, client, name, player);
        Ok(())
    }

    /// Leave the current room and go back to the lobby.
    pub async fn leave_room(&self, client: ClientId) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        let sender = client_sender(&inner, client)?;
        if !self.vacate_seat(&mut inner, client).await {
            return Err(RegistryError::NotInRoom);
        }
        send(&sender, ServerMessage::RoomList(room_listing(&inner).await));
        Ok(())
    }

    async fn start_game(&self, client: ClientId) -> Result<(), RegistryError> {
        let inner = self.inner.lock().await;
        let (room, player) = seat_in(&inner, client)?;
        room.write().await.start(player)?;
        broadcast_room_list(&inner).await;
        Ok(())
    }

    async fn kick(&self, client: ClientId, target: PlayerId) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        let (room, player) = seat_in(&inner, client)?;
        let room_name = room.read().await.name().to_string();
        room.write().await.kick(player, target)?;

        let kicked = inner
            .clients
            .iter()
            .find(|(_, c)| c.seat.as_ref().is_some_and(|s| s.room == room_name && s.player == target))
            .map(|(id, _)| *id);
        if let Some(kicked) = kicked {
            info!(room = %room_name, client = %kicked, player = %target, "Player kicked");
            let listing = room_listing(&inner).await;
            if let Some(c) = inner.clients.get_mut(&kicked) {
                c.seat = None;
                send(&c.sender, ServerMessage::RoomList(listing));
            }
        }
        Ok(())
    }

    /// Room and player id for a seated client.
    async fn seat_of(&self, client: ClientId) -> Result<(Arc<RwLock<Room>>, PlayerId), RegistryError> {
        let inner = self.inner.lock().await;
        seat_in(&inner, client)
    }

    /// Take a client out of its room, closing the room if it empties.
    /// Returns whether the client was seated.
    async fn vacate_seat(&self, inner: &mut RegistryInner, client: ClientId) -> bool {
        let Some(seat) = inner.clients.get_mut(&client).and_then(|c| c.seat.take()) else {
            return false;
        };

        let Some(handle) = inner.rooms.get(&seat.room) else {
            warn!(room = %seat.room, "Seat points at a missing room");
            return true;
        };
        let now_empty = {
            let mut room = handle.room.write().await;
            room.leave(seat.player);
            room.is_empty()
        };

        if now_empty {
            if let Some(handle) = inner.rooms.remove(&seat.room) {
                info!(room = %seat.room, "Room empty, closing");
                tokio::spawn(handle.stop());
            }
            // The leaver is told separately, or is gone
            broadcast_room_list_except(inner, Some(client)).await;
        }
        true
    }

    /// Current `ROOM_LIST` entries.
    pub async fn listing(&self) -> Vec<RoomListing> {
        let inner = self.inner.lock().await;
        room_listing(&inner).await
    }

    /// Number of rooms.
    pub async fn room_count(&self) -> usize {
        self.inner.lock().await.rooms.len()
    }

    /// Number of connected clients.
    pub async fn client_count(&self) -> usize {
        self.inner.lock().await.clients.len()
    }

    /// Stop every room task.
    pub async fn shutdown(&self) {
        let rooms = std::mem::take(&mut self.inner.lock().await.rooms);
        debug!(rooms = rooms.len(), "Stopping rooms");
        for (_, handle) in rooms {
            handle.stop().await;
        }
    }
}

fn client_sender(inner: &RegistryInner, client: ClientId) -> Result<Outbox, RegistryError> {
    inner
        .clients
        .get(&client)
        .map(|c| c.sender.clone())
        .ok_or(RegistryError::UnknownClient(client))
}

fn seat_client(inner: &mut RegistryInner, client: ClientId, room: &str, player: PlayerId) {
    if let Some(c) = inner.clients.get_mut(&client) {
        c.seat = Some(Seat {
            room: room.to_string(),
            player,
        });
    }
}

fn seat_in(inner: &RegistryInner, client: ClientId) -> Result<(Arc<RwLock<Room>>, PlayerId), RegistryError> {
    let c = inner
        .clients
        .get(&client)
        .ok_or(RegistryError::UnknownClient(client))?;
    let seat = c.seat.as_ref().ok_or(RegistryError::NotInRoom)?;
    let handle = inner.rooms.get(&seat.room).ok_or(RegistryError::NotInRoom)?;
    Ok((handle.room.clone(), seat.player))
}

async fn room_listing(inner: &RegistryInner) -> Vec<RoomListing> {
    let mut listing = Vec::new();
    for (name, handle) in &inner.rooms {
        let room = handle.room.read().await;
        if room.is_listed() {
            listing.push(RoomListing {
                name: name.clone(),
                private: room.is_private(),
            });
        }
    }
    listing
}

/// Send `ROOM_LIST` to every lobby client.
async fn broadcast_room_list(inner: &RegistryInner) {
    broadcast_room_list_except(inner, None).await
}

async fn broadcast_room_list_except(inner: &RegistryInner, skip: Option<ClientId>) {
    let listing = room_listing(inner).await;
    let lobby = inner
        .clients
        .iter()
        .filter(|(id, c)| c.seat.is_none() && Some(**id) != skip);
    for (_, client) in lobby {
        send(&client.sender, ServerMessage::RoomList(listing.clone()));
    }
}
