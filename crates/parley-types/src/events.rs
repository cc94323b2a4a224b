use serde::{Deserialize, Serialize};

use crate::models::{Message, RoomId, User, UserId};

/// Events pushed by the backend over the session channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Another participant posted a message to the joined room
    #[serde(rename = "message received")]
    MessageReceived(Message),

    /// Full presence snapshot, sent once after every join
    #[serde(rename = "users in room")]
    UsersInRoom(Vec<User>),

    #[serde(rename = "user joined")]
    UserJoined(User),

    #[serde(rename = "user left")]
    UserLeft(UserId),

    /// Transient alert meant for a toast, never stored
    #[serde(rename = "notification")]
    Notification(Notification),

    #[serde(rename = "user typing")]
    UserTyping { username: String },

    #[serde(rename = "user stop typing")]
    UserStopTyping { username: String },
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MessageReceived(_) => EventKind::MessageReceived,
            Self::UsersInRoom(_) => EventKind::UsersInRoom,
            Self::UserJoined(_) => EventKind::UserJoined,
            Self::UserLeft(_) => EventKind::UserLeft,
            Self::Notification(_) => EventKind::Notification,
            Self::UserTyping { .. } => EventKind::UserTyping,
            Self::UserStopTyping { .. } => EventKind::UserStopTyping,
        }
    }
}

/// Discriminant of [`ServerEvent`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageReceived,
    UsersInRoom,
    UserJoined,
    UserLeft,
    Notification,
    UserTyping,
    UserStopTyping,
}

impl EventKind {
    /// Every event a joined room listens to.
    pub const ROOM_EVENTS: [EventKind; 7] = [
        EventKind::MessageReceived,
        EventKind::UsersInRoom,
        EventKind::UserJoined,
        EventKind::UserLeft,
        EventKind::Notification,
        EventKind::UserTyping,
        EventKind::UserStopTyping,
    ];

    /// Event name as it appears on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Self::MessageReceived => "message received",
            Self::UsersInRoom => "users in room",
            Self::UserJoined => "user joined",
            Self::UserLeft => "user left",
            Self::Notification => "notification",
            Self::UserTyping => "user typing",
            Self::UserStopTyping => "user stop typing",
        }
    }
}

/// Commands sent FROM client TO backend over the session channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientCommand {
    #[serde(rename = "join room")]
    JoinRoom(RoomId),

    #[serde(rename = "leave room")]
    LeaveRoom(RoomId),

    /// Relay a durably stored message to the other room members
    #[serde(rename = "new message")]
    NewMessage(OutgoingMessage),

    #[serde(rename = "typing")]
    Typing {
        #[serde(rename = "groupId")]
        room_id: RoomId,
        username: String,
    },

    #[serde(rename = "stop typing")]
    StopTyping {
        #[serde(rename = "groupId")]
        room_id: RoomId,
    },
}

/// The canonical message returned by the REST write, tagged with its room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    #[serde(flatten)]
    pub message: Message,
    #[serde(rename = "groupId")]
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    UserJoined,
    #[serde(other)]
    Other,
}
