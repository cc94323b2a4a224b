pub mod api;
pub mod events;
pub mod models;

pub use events::{ClientCommand, EventKind, Notification, NotificationKind, OutgoingMessage, ServerEvent};
pub use models::{Message, MessageId, Room, RoomId, User, UserId};
