use std::collections::HashMap;
use std::future;
use std::time::Duration;

use parley_types::{ClientCommand, RoomId};
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::debug;

/// A typing entry whose idle window elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingExpiry {
    pub username: String,
    /// `stop typing` to emit when the expired entry was the local user.
    pub stop: Option<ClientCommand>,
}

/// Who is typing in the active room.
///
/// Each username is `idle` or `typing`. A typing username owns exactly one
/// timer in the table; every qualifying event re-arms it, and expiry moves the
/// username back to idle.
pub struct TypingIndicatorTracker {
    local_username: String,
    window: Duration,
    room_id: Option<RoomId>,
    timers: DelayQueue<String>,
    keys: HashMap<String, delay_queue::Key>,
    local_typing: bool,
}

impl TypingIndicatorTracker {
    pub fn new(local_username: impl Into<String>, window: Duration) -> Self {
        Self {
            local_username: local_username.into(),
            window,
            room_id: None,
            timers: DelayQueue::new(),
            keys: HashMap::new(),
            local_typing: false,
        }
    }

    pub fn is_typing(&self, username: &str) -> bool {
        self.keys.contains_key(username)
    }

    /// Usernames currently typing, in no particular order.
    pub fn typing_users(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn is_local_typing(&self) -> bool {
        self.local_typing
    }

    /// Cancel every timer and bind to `room_id`. If the local user was typing
    /// in the previous room, returns the `stop typing` that room should get.
    pub fn reset(&mut self, room_id: Option<RoomId>) -> Option<ClientCommand> {
        let stop = match (&self.room_id, self.local_typing) {
            (Some(previous), true) => Some(ClientCommand::StopTyping {
                room_id: previous.clone(),
            }),
            _ => None,
        };

        self.timers.clear();
        self.keys.clear();
        self.local_typing = false;
        self.room_id = room_id;
        stop
    }

    /// A remote `user typing` event. Returns `true` on the idle -> typing edge.
    pub fn remote_typing(&mut self, username: &str) -> bool {
        self.arm(username)
    }

    /// A remote `user stop typing` event. Returns `true` if the user was typing.
    pub fn remote_stopped(&mut self, username: &str) -> bool {
        // our own timer decides when the local user stops
        if username == self.local_username && self.local_typing {
            return false;
        }
        match self.keys.remove(username) {
            Some(key) => {
                self.timers.remove(&key);
                true
            }
            None => false,
        }
    }

    /// The local user produced input. Returns the `typing` command to emit on
    /// the idle -> typing edge; later keystrokes only re-arm the timer.
    pub fn local_input(&mut self) -> Option<ClientCommand> {
        let room_id = self.room_id.clone()?;
        let local = self.local_username.clone();
        self.arm(&local);

        if self.local_typing {
            return None;
        }
        self.local_typing = true;
        Some(ClientCommand::Typing {
            room_id,
            username: local,
        })
    }

    /// Wait for the next entry to expire. Never resolves while nobody is typing.
    pub async fn next_expired(&mut self) -> TypingExpiry {
        if self.keys.is_empty() {
            return future::pending().await;
        }

        let expired = future::poll_fn(|cx| self.timers.poll_expired(cx)).await;
        let Some(expired) = expired else {
            return future::pending().await;
        };

        let username = expired.into_inner();
        self.keys.remove(&username);

        let mut stop = None;
        if username == self.local_username && self.local_typing {
            self.local_typing = false;
            stop = self
                .room_id
                .clone()
                .map(|room_id| ClientCommand::StopTyping { room_id });
        }

        debug!("{} stopped typing", username);
        TypingExpiry { username, stop }
    }

    /// Cancel-and-rearm in one step. Returns `true` if the user was idle.
    fn arm(&mut self, username: &str) -> bool {
        if let Some(key) = self.keys.get(username) {
            self.timers.reset(key, self.window);
            return false;
        }
        let key = self.timers.insert(username.to_owned(), self.window);
        self.keys.insert(username.to_owned(), key);
        true
    }
}
