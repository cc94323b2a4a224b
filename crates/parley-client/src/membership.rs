use std::future;

use parley_types::{ClientCommand, EventKind, Room, RoomId, ServerEvent};
use tracing::{debug, info};

use crate::channel::{SessionChannel, Subscription};

/// One activation of a room. Holds the room subscription and emits
/// `leave room` exactly once when dropped.
struct RoomGuard {
    channel: SessionChannel,
    room: Room,
    activation: u64,
    subscription: Subscription,
}

impl Drop for RoomGuard {
    fn drop(&mut self) {
        info!(
            "Leaving room {} (activation {})",
            self.room.id, self.activation
        );
        self.channel.emit(ClientCommand::LeaveRoom(self.room.id.clone()));
        // `subscription` is dropped after this body, detaching the handlers
    }
}

/// Outcome of [`RoomMembershipController::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Joined { room_id: RoomId, activation: u64 },
    Cleared,
    /// No channel is attached; nothing happened.
    ChannelUnavailable,
}

/// Binds the session to at most one active room.
#[derive(Default)]
pub struct RoomMembershipController {
    channel: Option<SessionChannel>,
    active: Option<RoomGuard>,
    activations: u64,
}

impl RoomMembershipController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, channel: SessionChannel) {
        self.channel = Some(channel);
    }

    /// Tear down the active room and hand the channel back.
    pub fn detach(&mut self) -> Option<SessionChannel> {
        self.active = None;
        self.channel.take()
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    pub fn channel(&self) -> Option<&SessionChannel> {
        self.channel.as_ref()
    }

    /// Make `room` the active room, or clear it with `None`.
    ///
    /// The previous activation always ends first (`leave room`, handlers
    /// detached), even when `room` is the one already active. The new
    /// subscription is installed in the same step that emits `join room`, so
    /// the `users in room` snapshot cannot be missed.
    pub fn select(&mut self, room: Option<Room>) -> Selection {
        let Some(channel) = self.channel.clone() else {
            debug!("No channel attached, ignoring room selection");
            return Selection::ChannelUnavailable;
        };

        self.active = None;

        let Some(room) = room else {
            return Selection::Cleared;
        };

        self.activations += 1;
        let activation = self.activations;
        let room_id = room.id.clone();

        channel.emit(ClientCommand::JoinRoom(room_id.clone()));
        let subscription = channel.on(&EventKind::ROOM_EVENTS);
        info!("Joined room {} (activation {})", room_id, activation);

        self.active = Some(RoomGuard {
            channel,
            room,
            activation,
            subscription,
        });
        Selection::Joined {
            room_id,
            activation,
        }
    }

    pub fn active_room(&self) -> Option<&Room> {
        self.active.as_ref().map(|guard| &guard.room)
    }

    /// Activation number of the active room, if any.
    pub fn activation(&self) -> Option<u64> {
        self.active.as_ref().map(|guard| guard.activation)
    }

    /// Next event for the active room. Pends while no room is active or the
    /// channel has dropped the subscription.
    pub async fn next_event(&mut self) -> ServerEvent {
        let Some(guard) = self.active.as_mut() else {
            return future::pending().await;
        };
        match guard.subscription.recv().await {
            Some(event) => event,
            None => future::pending().await,
        }
    }
}
