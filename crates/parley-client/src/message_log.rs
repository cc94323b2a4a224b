use std::collections::HashSet;

use parley_types::{Message, MessageId, RoomId};
use tracing::{debug, warn};

use crate::error::{ApiError, SyncError};

/// Message history of the active room in arrival order.
///
/// The log is seeded by one history snapshot and extended by live events and
/// successful local sends. Timestamps never reorder it, and a message id is
/// kept at most once.
#[derive(Debug, Default)]
pub struct MessageLog {
    room_id: Option<RoomId>,
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
    history_loaded: bool,
    draft: String,
}

impl MessageLog {
    pub fn room_id(&self) -> Option<&RoomId> {
        self.room_id.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn history_loaded(&self) -> bool {
        self.history_loaded
    }

    /// Drop the current history and bind the log to `room_id`. The draft is
    /// the user's unsent text and survives room changes.
    pub fn reset(&mut self, room_id: Option<RoomId>) {
        self.room_id = room_id;
        self.messages.clear();
        self.ids.clear();
        self.history_loaded = false;
    }

    /// Apply the result of a history fetch for `room_id`.
    ///
    /// On success the snapshot becomes the head of the log and any live
    /// messages that arrived while the fetch was in flight are re-appended
    /// after it, minus those the snapshot already contains. On failure the
    /// log gets no history and the error is returned for reporting.
    pub fn load(
        &mut self,
        room_id: &RoomId,
        result: Result<Vec<Message>, ApiError>,
    ) -> Result<usize, SyncError> {
        if self.room_id.as_ref() != Some(room_id) {
            debug!("Ignoring history for room {} (log is bound elsewhere)", room_id);
            return Ok(0);
        }

        let snapshot = result.map_err(|source| {
            warn!("History fetch for room {} failed: {}", room_id, source);
            SyncError::TransientFetch {
                room_id: room_id.clone(),
                source,
            }
        })?;

        let tail = std::mem::take(&mut self.messages);
        self.ids.clear();
        let count = snapshot.len();
        for message in snapshot.into_iter().chain(tail) {
            self.append(message);
        }
        self.history_loaded = true;

        debug!(
            "Loaded {} messages for room {} ({} total)",
            count,
            room_id,
            self.messages.len()
        );
        Ok(count)
    }

    /// Append at the end. Returns `false` for an id already in the log.
    pub fn append(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            debug!("Skipping duplicate message {}", message.id);
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Record a message the backend has durably stored for the local user
    /// in `room_id`. The draft is cleared if it still holds what was sent,
    /// whichever room is bound now. The message is appended only while the
    /// log is bound to `room_id`; the snapshot of a reselected room may
    /// already hold it, and dedup covers that.
    pub fn commit_sent(&mut self, room_id: &RoomId, sent_content: &str, message: Message) -> bool {
        if self.draft == sent_content {
            self.draft.clear();
        }
        if self.room_id.as_ref() != Some(room_id) {
            debug!("Message {} belongs to room {}, not appending", message.id, room_id);
            return false;
        }
        self.append(message)
    }
}
