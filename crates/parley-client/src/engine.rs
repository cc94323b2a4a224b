//! The room session engine.
//!
//! [`ChatSession`] owns the membership controller and the per-room trackers
//! and applies everything that happens to them on one cooperative loop:
//! room events, typing expiries, gateway link changes, and the completions
//! of detached REST calls. A history snapshot carries the activation number
//! it was started under and is dropped once the user reselects. A stored
//! message is matched by room instead, since it is durable either way.

use std::sync::Arc;

use parley_types::api::UserProfile;
use parley_types::{ClientCommand, Message, OutgoingMessage, Room, RoomId, ServerEvent, User};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::api::ChatApi;
use crate::channel::{LinkState, SessionChannel};
use crate::config::ClientConfig;
use crate::error::{ApiError, SyncError};
use crate::membership::{RoomMembershipController, Selection};
use crate::message_log::MessageLog;
use crate::notifications::{NotificationDispatcher, NotificationSink, Toast};
use crate::presence::PresenceTracker;
use crate::session::SessionContext;
use crate::typing::{TypingExpiry, TypingIndicatorTracker};

/// Something the front end should redraw for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    HistoryLoaded { room_id: RoomId, count: usize },
    MessageAppended(Message),
    PresenceChanged,
    TypingChanged,
    Notification(Toast),
    Failed(SyncError),
    /// The gateway link dropped; the channel is redialing.
    ChannelDown,
    /// The link is back and the active room has been rejoined.
    ChannelUp,
    /// The channel gave up; no more room events will arrive.
    ChannelClosed,
}

enum Completion {
    Snapshot {
        activation: u64,
        room_id: RoomId,
        result: Result<Vec<Message>, ApiError>,
    },
    Sent {
        room_id: RoomId,
        content: String,
        result: Result<Message, ApiError>,
    },
}

pub struct ChatSession {
    user: User,
    api: Arc<dyn ChatApi>,
    membership: RoomMembershipController,
    log: MessageLog,
    presence: PresenceTracker,
    typing: TypingIndicatorTracker,
    notifications: NotificationDispatcher,
    link: Option<watch::Receiver<LinkState>>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl ChatSession {
    pub fn new(
        session: &SessionContext,
        api: Arc<dyn ChatApi>,
        config: &ClientConfig,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            user: session.user.clone(),
            api,
            membership: RoomMembershipController::new(),
            log: MessageLog::default(),
            presence: PresenceTracker::default(),
            typing: TypingIndicatorTracker::new(
                session.user.username.clone(),
                config.typing_timeout,
            ),
            notifications: NotificationDispatcher::new(sink, config.notification_duration),
            link: None,
            completions_tx,
            completions_rx,
        }
    }

    pub fn attach_channel(&mut self, channel: SessionChannel) {
        self.link = Some(channel.link_state());
        self.membership.attach(channel);
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn active_room(&self) -> Option<&Room> {
        self.membership.active_room()
    }

    pub fn messages(&self) -> &[Message] {
        self.log.messages()
    }

    pub fn present_users(&self) -> &[User] {
        self.presence.users()
    }

    /// Usernames currently typing in the active room, sorted.
    pub fn typing_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.typing.typing_users().map(str::to_owned).collect();
        users.sort();
        users
    }

    pub fn draft(&self) -> &str {
        self.log.draft()
    }

    /// Switch the active room, or leave it with `None`.
    ///
    /// Per-room state is discarded and a history fetch is started for the
    /// new room. Without a channel nothing changes.
    pub fn select(&mut self, room: Option<Room>) -> Selection {
        if !self.membership.has_channel() {
            debug!("Room selection before the channel is attached");
            return Selection::ChannelUnavailable;
        }

        // stop typing must reach the old room before we leave it
        if let Some(stop) = self.typing.reset(None) {
            self.emit(stop);
        }

        let selection = self.membership.select(room);
        let room_id = self.membership.active_room().map(|room| room.id.clone());

        self.presence.clear();
        self.log.reset(room_id.clone());
        self.typing.reset(room_id);

        if let Selection::Joined {
            room_id,
            activation,
        } = &selection
        {
            self.spawn_history(room_id.clone(), *activation);
        }
        selection
    }

    /// `POST /groups/join/{id}`, then select the room. A refusal is shown
    /// as a toast and leaves the selection alone.
    pub async fn join(&mut self, room: Room) -> Result<Selection, SyncError> {
        if let Err(source) = self.api.join_room(&room.id).await {
            return Err(self.report(SyncError::JoinFailure {
                room_id: room.id,
                source,
            }));
        }
        Ok(self.select(Some(room)))
    }

    /// `POST /groups/leave/{id}` for the active room, then clear the selection.
    pub async fn leave(&mut self) -> Result<Selection, SyncError> {
        let Some(room_id) = self.active_room().map(|room| room.id.clone()) else {
            return Ok(Selection::Cleared);
        };
        if let Err(source) = self.api.leave_room(&room_id).await {
            return Err(self.report(SyncError::LeaveFailure { room_id, source }));
        }
        Ok(self.select(None))
    }

    pub async fn rooms(&self) -> Result<Vec<Room>, ApiError> {
        self.api.list_rooms().await
    }

    /// Profile of the session user, including the admin flag.
    pub async fn profile(&self) -> Result<UserProfile, ApiError> {
        self.api.fetch_user(&self.user.id).await
    }

    /// The composer changed. Updates the draft and drives local typing.
    pub fn input(&mut self, text: &str) {
        self.log.set_draft(text);
        if let Some(start) = self.typing.local_input() {
            self.emit(start);
        }
    }

    /// Durably store `content` in the active room. The message is broadcast
    /// and appended only once the write succeeds; see [`Self::next_update`].
    pub fn send(&mut self, content: &str) -> Result<(), SyncError> {
        let Some(room) = self.membership.active_room() else {
            return Err(SyncError::NoActiveRoom);
        };
        if content.trim().is_empty() {
            debug!("Not sending a blank message");
            return Ok(());
        }

        let room_id = room.id.clone();
        let content = content.to_owned();
        let api = self.api.clone();
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = api.create_message(&room_id, &content).await;
            let _ = tx.send(Completion::Sent {
                room_id,
                content,
                result,
            });
        });
        Ok(())
    }

    /// Wait for the next change worth showing.
    pub async fn next_update(&mut self) -> SessionUpdate {
        loop {
            let update = tokio::select! {
                Some(done) = self.completions_rx.recv() => self.on_completion(done),
                event = self.membership.next_event() => self.on_event(event),
                expiry = self.typing.next_expired() => self.on_expiry(expiry),
                state = link_changed(&mut self.link) => self.on_link(state),
            };
            if let Some(update) = update {
                return update;
            }
        }
    }

    /// Leave the active room and disconnect the channel.
    pub fn close(&mut self) {
        self.select(None);
        self.link = None;
        if let Some(channel) = self.membership.detach() {
            channel.disconnect();
        }
    }

    fn emit(&self, command: ClientCommand) {
        if let Some(channel) = self.membership.channel() {
            channel.emit(command);
        }
    }

    fn spawn_history(&self, room_id: RoomId, activation: u64) {
        let api = self.api.clone();
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_messages(&room_id).await;
            let _ = tx.send(Completion::Snapshot {
                activation,
                room_id,
                result,
            });
        });
    }

    fn is_current(&self, activation: u64) -> bool {
        self.membership.activation() == Some(activation)
    }

    fn on_event(&mut self, event: ServerEvent) -> Option<SessionUpdate> {
        match event {
            ServerEvent::MessageReceived(message) => self
                .log
                .append(message.clone())
                .then_some(SessionUpdate::MessageAppended(message)),
            ServerEvent::UsersInRoom(users) => {
                self.presence.replace(users);
                Some(SessionUpdate::PresenceChanged)
            }
            ServerEvent::UserJoined(user) => self
                .presence
                .joined(user)
                .then_some(SessionUpdate::PresenceChanged),
            ServerEvent::UserLeft(user_id) => self
                .presence
                .left(&user_id)
                .then_some(SessionUpdate::PresenceChanged),
            ServerEvent::Notification(notification) => Some(SessionUpdate::Notification(
                self.notifications.on(&notification),
            )),
            ServerEvent::UserTyping { username } => self
                .typing
                .remote_typing(&username)
                .then_some(SessionUpdate::TypingChanged),
            ServerEvent::UserStopTyping { username } => self
                .typing
                .remote_stopped(&username)
                .then_some(SessionUpdate::TypingChanged),
        }
    }

    fn on_link(&mut self, state: LinkState) -> Option<SessionUpdate> {
        match state {
            LinkState::Down => Some(SessionUpdate::ChannelDown),
            LinkState::Closed => {
                warn!("Gateway channel closed");
                self.link = None;
                Some(SessionUpdate::ChannelClosed)
            }
            LinkState::Up => {
                // the new connection has no room membership yet
                if let (Some(room), Some(activation)) =
                    (self.membership.active_room(), self.membership.activation())
                {
                    let room_id = room.id.clone();
                    info!("Rejoining room {} after reconnect", room_id);
                    self.emit(ClientCommand::JoinRoom(room_id.clone()));
                    self.spawn_history(room_id, activation);
                }
                Some(SessionUpdate::ChannelUp)
            }
        }
    }

    fn on_expiry(&mut self, expiry: TypingExpiry) -> Option<SessionUpdate> {
        if let Some(stop) = expiry.stop {
            self.emit(stop);
        }
        Some(SessionUpdate::TypingChanged)
    }

    fn on_completion(&mut self, completion: Completion) -> Option<SessionUpdate> {
        match completion {
            Completion::Snapshot {
                activation,
                room_id,
                result,
            } => {
                if !self.is_current(activation) {
                    debug!("Discarding stale history for room {}", room_id);
                    return None;
                }
                match self.log.load(&room_id, result) {
                    Ok(count) => Some(SessionUpdate::HistoryLoaded { room_id, count }),
                    Err(e) => Some(self.fail(e)),
                }
            }
            Completion::Sent {
                room_id,
                content,
                result,
            } => {
                let message = match result {
                    Ok(message) => message,
                    Err(source) => {
                        return Some(self.fail(SyncError::SendFailure { room_id, source }));
                    }
                };

                // stored, so the room hears about it even if we moved on
                self.emit(ClientCommand::NewMessage(OutgoingMessage {
                    message: message.clone(),
                    room_id: room_id.clone(),
                }));

                if self.log.room_id() != Some(&room_id) {
                    info!("Message {} stored after leaving room {}", message.id, room_id);
                }
                self.log
                    .commit_sent(&room_id, &content, message.clone())
                    .then_some(SessionUpdate::MessageAppended(message))
            }
        }
    }

    fn fail(&self, error: SyncError) -> SessionUpdate {
        SessionUpdate::Failed(self.report(error))
    }

    fn report(&self, error: SyncError) -> SyncError {
        self.notifications.error(&error);
        error
    }
}

/// Next link state, or never once there is no channel to watch.
async fn link_changed(link: &mut Option<watch::Receiver<LinkState>>) -> LinkState {
    match link {
        Some(rx) => match rx.changed().await {
            Ok(()) => *rx.borrow_and_update(),
            Err(_) => {
                *link = None;
                LinkState::Closed
            }
        },
        None => std::future::pending().await,
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(stop) = self.typing.reset(None) {
            self.emit(stop);
        }
    }
}
