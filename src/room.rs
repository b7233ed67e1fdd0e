//! Client, Room, and RoomGroup: the membership model the distributor (see
//! [`crate::distributor`]) fans messages out over.
//!
//! Lock order is always RoomGroup → Room → Client, and broadcasts never take a
//! client's own lock — they only push onto its queue, per the deadlock-avoidance
//! rule in the design notes.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

use crate::id::IdAllocator;

/// Per-client outgoing queue capacity. Exceeding this closes the connection
/// with code 1011 (internal overload) per §4.5.
pub const SEND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct QueueOverflow;

/// Why a connection's task is being asked to close itself, distinguishing the
/// per-client overload case (§4.5, code 1011) from a process-wide shutdown
/// (§5, code 1001). Carried on the same level-triggered `watch` signal so
/// both paths share one close mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Overload,
    ShuttingDown,
}

/// Per-connection state, owned by the connection-handling task. The room only
/// ever holds a clone of the cheap parts (id, sender, nick) needed to address
/// and describe the client — never a handle that outlives the connection task.
pub struct Client {
    pub connection_id: u64,
    pub remote_addr: String,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub auth_cookie: Option<String>,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    nick: Mutex<String>,
    sender: mpsc::Sender<String>,
    // Level-triggered close signal: the distributor (or a process shutdown)
    // sets this to request a close, independent of whatever the connection
    // task happens to be awaiting at the time.
    close: watch::Sender<Option<CloseReason>>,
}

impl Client {
    pub fn new(
        connection_id: u64,
        remote_addr: String,
        user_agent: Option<String>,
        referer: Option<String>,
        auth_cookie: Option<String>,
        session_id: String,
    ) -> (Arc<Self>, mpsc::Receiver<String>, watch::Receiver<Option<CloseReason>>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let (close_tx, close_rx) = watch::channel(None);
        let client = Arc::new(Self {
            connection_id,
            remote_addr,
            user_agent,
            referer,
            auth_cookie,
            session_id,
            created_at: Utc::now(),
            nick: Mutex::new("anonymous".to_string()),
            sender: tx,
            close: close_tx,
        });
        (client, rx, close_rx)
    }

    /// Request that this connection close for `reason`. Idempotent; observed
    /// by the connection's read and writer tasks regardless of which one is
    /// currently awaiting something else.
    pub fn request_close(&self, reason: CloseReason) {
        let _ = self.close.send(Some(reason));
    }

    pub fn nick(&self) -> String {
        self.nick.lock().expect("nick mutex poisoned").clone()
    }

    pub fn set_nick(&self, nick: String) {
        *self.nick.lock().expect("nick mutex poisoned") = nick;
    }

    /// Enqueue a single already-serialized frame. Used for both unicasts and
    /// each member's copy of a broadcast.
    pub fn enqueue(&self, frame: String) -> Result<(), QueueOverflow> {
        self.sender.try_send(frame).map_err(|_| QueueOverflow)
    }

    pub fn uid(&self) -> String {
        self.connection_id.to_string()
    }
}

/// A snapshot entry for the `who` reply.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Presence {
    pub uid: String,
    pub nick: String,
}

/// A named room, or the singleton null room (`name == None`).
pub struct Room {
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    members: Mutex<HashMap<u64, Arc<Client>>>,
}

#[derive(Debug)]
pub struct NoSuchRoom;
#[derive(Debug)]
pub struct NoSuchMember;

impl Room {
    fn new(name: Option<String>) -> Self {
        Self {
            name,
            created_at: Utc::now(),
            members: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_null_room(&self) -> bool {
        self.name.is_none()
    }

    /// True if `client` is already a member (join is idempotent).
    pub fn contains(&self, client: &Client) -> bool {
        self.members
            .lock()
            .expect("room members mutex poisoned")
            .contains_key(&client.connection_id)
    }

    fn insert(&self, client: Arc<Client>) {
        self.members
            .lock()
            .expect("room members mutex poisoned")
            .insert(client.connection_id, client);
    }

    fn remove(&self, connection_id: u64) -> Option<Arc<Client>> {
        self.members
            .lock()
            .expect("room members mutex poisoned")
            .remove(&connection_id)
    }

    pub fn member_count(&self) -> usize {
        self.members.lock().expect("room members mutex poisoned").len()
    }

    pub fn snapshot(&self) -> Vec<Presence> {
        self.members
            .lock()
            .expect("room members mutex poisoned")
            .values()
            .map(|c| Presence {
                uid: c.uid(),
                nick: c.nick(),
            })
            .collect()
    }

    /// Deliver `frame` to a single member by ConnectionID. Returns the target
    /// client handle when its queue overflowed, so the caller can evict it
    /// (remove from the room, emit `left`, close with 1011) per §4.7.
    pub fn send_unicast(&self, to: u64, frame: String) -> Result<Option<Arc<Client>>, NoSuchMember> {
        let members = self.members.lock().expect("room members mutex poisoned");
        let target = members.get(&to).ok_or(NoSuchMember)?.clone();
        drop(members);
        if target.enqueue(frame).is_err() {
            Ok(Some(target))
        } else {
            Ok(None)
        }
    }

    /// Serialize `frame` once and enqueue the identical bytes on every current
    /// member under the room lock, so concurrent membership changes can never
    /// retroactively include or exclude this frame. Returns the members whose
    /// queue overflowed (caller is responsible for evicting them).
    pub fn send_broadcast(&self, frame: String, exclude: Option<u64>) -> Result<Vec<Arc<Client>>, NoSuchRoom> {
        if self.is_null_room() {
            return Err(NoSuchRoom);
        }
        let members = self.members.lock().expect("room members mutex poisoned");
        let mut overflowed = Vec::new();
        for client in members.values() {
            if exclude == Some(client.connection_id) {
                continue;
            }
            if client.enqueue(frame.clone()).is_err() {
                overflowed.push(client.clone());
            }
        }
        Ok(overflowed)
    }
}

/// Process-wide registry of live named rooms. The null room is a singleton
/// held alongside the table, never inserted into it.
pub struct RoomGroup {
    rooms: DashMap<String, Arc<Room>>,
    // Serializes the create-on-first-join / destroy-on-last-leave transition
    // so "room group lookup" stays a single logical mutex as the design calls for.
    lifecycle: Mutex<()>,
    null_room: Arc<Room>,
}

impl RoomGroup {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            lifecycle: Mutex::new(()),
            null_room: Arc::new(Room::new(None)),
        }
    }

    pub fn null_room(&self) -> Arc<Room> {
        self.null_room.clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.get(name).map(|r| r.clone())
    }

    /// Find-or-create `name`, insert `client`, and return the room plus
    /// whether this join actually changed membership (idempotent otherwise).
    pub fn join(&self, name: &str, client: Arc<Client>) -> (Arc<Room>, bool) {
        let _guard = self.lifecycle.lock().expect("room group lock poisoned");
        let room = self
            .rooms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Room::new(Some(name.to_string()))))
            .clone();
        if room.contains(&client) {
            return (room, false);
        }
        room.insert(client);
        (room, true)
    }

    /// Remove `connection_id` from `room`, deleting the room from the group if
    /// it's now empty (named rooms only — the null room is never removed).
    pub fn leave(&self, room: &Arc<Room>, connection_id: u64) -> bool {
        let _guard = self.lifecycle.lock().expect("room group lock poisoned");
        let removed = room.remove(connection_id).is_some();
        if removed && !room.is_null_room() && room.member_count() == 0 {
            if let Some(name) = &room.name {
                self.rooms.remove(name);
            }
        }
        removed
    }
}

impl Default for RoomGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// The pair of process-wide ID allocators used by the distributor: one for
/// ConnectionIDs, one for MessageIDs, kept separate per SPEC_FULL.md §4.1.
pub struct Allocators {
    pub connections: IdAllocator,
    pub messages: IdAllocator,
}

impl Allocators {
    pub fn new() -> Self {
        Self {
            connections: IdAllocator::new(),
            messages: IdAllocator::new(),
        }
    }
}

impl Default for Allocators {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide registry of every currently open connection, independent of
/// room membership — the null room holds unrouted clients too, but this is
/// what process shutdown (§5: "sends close (1001) to all clients") walks, so
/// it doesn't need to know about rooms at all.
pub struct Connections {
    live: DashMap<u64, Arc<Client>>,
}

impl Connections {
    pub fn new() -> Self {
        Self { live: DashMap::new() }
    }

    pub fn register(&self, client: Arc<Client>) {
        self.live.insert(client.connection_id, client);
    }

    pub fn unregister(&self, connection_id: u64) {
        self.live.remove(&connection_id);
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Request that every currently registered connection close for `reason`.
    pub fn request_close_all(&self, reason: CloseReason) {
        for entry in self.live.iter() {
            entry.value().request_close(reason);
        }
    }
}

impl Default for Connections {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_client(id: u64) -> (Arc<Client>, mpsc::Receiver<String>, watch::Receiver<Option<CloseReason>>) {
        Client::new(id, "127.0.0.1".into(), None, None, None, format!("sess-{id}"))
    }

    #[test]
    fn join_creates_room_lazily_and_is_idempotent() {
        let group = RoomGroup::new();
        assert!(group.get("lobby").is_none());
        let (client, _rx, _close_rx) = make_client(1);
        let (room, changed) = group.join("lobby", client.clone());
        assert!(changed);
        assert!(group.get("lobby").is_some());
        let (_room2, changed_again) = group.join("lobby", client);
        assert!(!changed_again);
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn last_leave_destroys_room_and_rejoin_recreates_it() {
        let group = RoomGroup::new();
        let (client, _rx, _close_rx) = make_client(1);
        let (room, _) = group.join("lobby", client.clone());
        let first_created_at = room.created_at;
        group.leave(&room, client.connection_id);
        assert!(group.get("lobby").is_none());

        let (client2, _rx2, _close_rx2) = make_client(2);
        let (room2, _) = group.join("lobby", client2);
        assert_ne!(room2.created_at, first_created_at);
    }

    #[test]
    fn broadcast_fails_on_null_room() {
        let group = RoomGroup::new();
        let null_room = group.null_room();
        assert!(null_room.send_broadcast("{}".into(), None).is_err());
    }

    #[test]
    fn unicast_permitted_on_null_room() {
        let group = RoomGroup::new();
        let null_room = group.null_room();
        let (client, mut rx, _close_rx) = make_client(1);
        null_room.insert(client.clone());
        let overflowed = null_room.send_unicast(client.connection_id, "hello".into()).unwrap();
        assert!(overflowed.is_none());
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn broadcast_delivers_identical_bytes_to_every_member() {
        let group = RoomGroup::new();
        let (c1, mut rx1, _close1) = make_client(1);
        let (c2, mut rx2, _close2) = make_client(2);
        let (room, _) = group.join("lobby", c1);
        group.join("lobby", c2);
        room.send_broadcast("payload".into(), None).unwrap();
        assert_eq!(rx1.try_recv().unwrap(), "payload");
        assert_eq!(rx2.try_recv().unwrap(), "payload");
    }

    #[test]
    fn overflowed_member_is_reported() {
        let group = RoomGroup::new();
        let (client, rx, _close_rx) = make_client(1);
        // Don't drain rx; fill the queue past capacity.
        let (room, _) = group.join("lobby", client.clone());
        for i in 0..SEND_QUEUE_CAPACITY {
            let _ = room.send_broadcast(format!("m{i}"), None);
        }
        let overflowed = room.send_broadcast("overflow".into(), None).unwrap();
        assert_eq!(
            overflowed.iter().map(|c| c.connection_id).collect::<Vec<_>>(),
            vec![client.connection_id]
        );
        drop(rx);
    }

    #[tokio::test]
    async fn request_close_is_observed_by_a_fresh_receiver() {
        let (client, _rx, mut close_rx) = make_client(1);
        assert!(close_rx.borrow().is_none());
        client.request_close(CloseReason::Overload);
        close_rx.changed().await.unwrap();
        assert_eq!(*close_rx.borrow(), Some(CloseReason::Overload));
    }

    #[test]
    fn connections_registry_tracks_and_broadcasts_close() {
        let registry = Connections::new();
        let (c1, _rx1, mut close1) = make_client(1);
        let (c2, _rx2, mut close2) = make_client(2);
        registry.register(c1.clone());
        registry.register(c2.clone());
        assert_eq!(registry.len(), 2);

        registry.request_close_all(CloseReason::ShuttingDown);
        assert_eq!(*close1.borrow_and_update(), Some(CloseReason::ShuttingDown));
        assert_eq!(*close2.borrow_and_update(), Some(CloseReason::ShuttingDown));

        registry.unregister(c1.connection_id);
        registry.unregister(c2.connection_id);
        assert!(registry.is_empty());
    }
}
