//! The message distributor: decodes inbound frames, stamps outbound
//! envelopes, and dispatches by `type` per spec.md §4.7.

use serde_json::json;
use std::sync::Arc;

use crate::envelope::{decode_inbound, DecodeError, Envelope, SERVER_SENTINEL};
use crate::room::{Allocators, Client, CloseReason, Connections, NoSuchMember, Room, RoomGroup};

/// A frame ready to be written to exactly this originator's connection.
pub struct Reply(pub String);

pub struct Distributor {
    pub groups: RoomGroup,
    pub ids: Allocators,
    /// Every currently open connection, independent of room membership — the
    /// shutdown path (§5) broadcasts a close request through this registry
    /// rather than walking rooms (which wouldn't reach null-room clients).
    pub connections: Connections,
}

impl Distributor {
    pub fn new() -> Self {
        Self {
            groups: RoomGroup::new(),
            ids: Allocators::new(),
            connections: Connections::new(),
        }
    }

    fn stamp(&self, kind: &str, from: &str, data: serde_json::Value) -> Envelope {
        Envelope::new(kind, self.ids.messages.next(), from.to_string(), data)
    }

    /// Build and broadcast a presence event (`joined`, `left`, `nick`) to `room`.
    pub fn emit_presence(&self, room: &Room, kind: &str, client: &Client) {
        if room.is_null_room() {
            return;
        }
        let env = self.stamp(
            kind,
            SERVER_SENTINEL,
            json!({ "uid": client.uid(), "nick": client.nick() }),
        );
        let _ = room.send_broadcast(env.to_json(), None);
    }

    /// Handle one inbound text frame from `client` who currently belongs to
    /// `room`. Returns an optional reply destined only for the originator —
    /// broadcasts/unicasts to other members are delivered directly via their
    /// queues and do not flow back through this return value.
    pub fn handle_frame(&self, room: &Arc<Room>, client: &Arc<Client>, raw: &str) -> Option<Reply> {
        let frame = match decode_inbound(raw) {
            Ok(frame) => frame,
            Err(err) => return Some(self.error_reply(None, err.reason())),
        };

        match frame.kind.as_str() {
            "ping" => {
                let env = self
                    .stamp("pong", SERVER_SENTINEL, json!({}))
                    .with_seq(frame.seq);
                Some(Reply(env.to_json()))
            }
            "unicast" => {
                let Some(to) = frame.to.as_ref().and_then(|s| s.parse::<u64>().ok()) else {
                    return Some(self.error_reply(frame.seq, "no-such-member"));
                };
                let env = self
                    .stamp("unicast", &client.uid(), frame.data)
                    .with_to(to.to_string());
                match room.send_unicast(to, env.to_json()) {
                    Ok(None) => None,
                    Ok(Some(overflowed)) => {
                        self.evict_overflowed(room, &overflowed);
                        None
                    }
                    Err(NoSuchMember) => Some(self.error_reply(frame.seq, "no-such-member")),
                }
            }
            "broadcast" => {
                let env = self.stamp("broadcast", &client.uid(), frame.data);
                let exclude = if frame.exclude_self {
                    Some(client.connection_id)
                } else {
                    None
                };
                match room.send_broadcast(env.to_json(), exclude) {
                    Ok(overflowed) => {
                        for member in &overflowed {
                            self.evict_overflowed(room, member);
                        }
                        None
                    }
                    Err(_no_such_room) => Some(self.error_reply(frame.seq, "no-such-room")),
                }
            }
            "who" => {
                let snapshot = room.snapshot();
                let env = self
                    .stamp("who", SERVER_SENTINEL, json!({ "members": snapshot }))
                    .with_seq(frame.seq);
                Some(Reply(env.to_json()))
            }
            "nick" => {
                let Some(nick) = frame.data.get("nick").and_then(|v| v.as_str()) else {
                    return Some(self.error_reply(frame.seq, "invalid-nick"));
                };
                if nick.len() > 256 || nick.chars().any(|c| c.is_control()) {
                    return Some(self.error_reply(frame.seq, "invalid-nick"));
                }
                client.set_nick(nick.to_string());
                self.emit_presence(room, "nick", client);
                None
            }
            _ => Some(self.error_reply(frame.seq, "unknown-type")),
        }
    }

    /// A client whose send queue overflowed is removed from the room (with a
    /// `left` presence broadcast to the remainder) and its connection is
    /// asked to close with code 1011, per the §4.7 failure semantics. Other
    /// members are unaffected.
    fn evict_overflowed(&self, room: &Arc<Room>, client: &Arc<Client>) {
        if self.groups.leave(room, client.connection_id) {
            self.emit_presence(room, "left", client);
        }
        client.request_close(CloseReason::Overload);
    }

    fn error_reply(&self, seq: Option<i64>, reason: &str) -> Reply {
        let env = self
            .stamp("error", SERVER_SENTINEL, json!({ "reason": reason }))
            .with_seq(seq);
        Reply(env.to_json())
    }
}

impl Default for Distributor {
    fn default() -> Self {
        Self::new()
    }
}
