//! In-memory doubles for the transport and the REST backend.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parley_types::api::UserProfile;
use parley_types::{ClientCommand, Message, MessageId, Room, RoomId, ServerEvent, User, UserId};
use tokio::sync::{Notify, mpsc};

use crate::api::ChatApi;
use crate::error::ApiError;
use crate::notifications::{NotificationSink, Toast};
use crate::session::SessionContext;
use crate::transport::{Connector, ReconnectPolicy, Transport, TransportError};

pub fn me() -> User {
    User::new("u-me", "me")
}

pub fn session() -> SessionContext {
    SessionContext::new(me(), "test-token")
}

pub fn room(id: &str) -> Room {
    Room {
        id: RoomId::from(id),
        name: format!("room {id}"),
        description: String::new(),
    }
}

/// Message whose `createdAt` is `minute` minutes past a fixed hour.
pub fn message(id: &str, sender: &User, content: &str, minute: u32) -> Message {
    Message {
        id: MessageId::from(id),
        sender: sender.clone(),
        content: content.to_owned(),
        created_at: Utc
            .with_ymd_and_hms(2024, 11, 2, 10, minute, 0)
            .single()
            .expect("valid timestamp"),
    }
}

/// Let spawned tasks drain their queues.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Client half of an in-memory gateway connection.
pub struct MemoryTransport {
    to_peer: mpsc::UnboundedSender<String>,
    from_peer: mpsc::UnboundedReceiver<String>,
}

/// Backend half: sees what the client sent and pushes events to it.
pub struct MemoryPeer {
    sent: mpsc::UnboundedReceiver<String>,
    push: mpsc::UnboundedSender<String>,
}

impl MemoryTransport {
    pub fn pair() -> (MemoryTransport, MemoryPeer) {
        let (to_peer, sent) = mpsc::unbounded_channel();
        let (push, from_peer) = mpsc::unbounded_channel();
        (MemoryTransport { to_peer, from_peer }, MemoryPeer { sent, push })
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.to_peer.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.from_peer.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.from_peer.close();
        Ok(())
    }
}

/// Hands out queued transports, then refuses to dial.
pub struct MemoryConnector {
    transports: Mutex<VecDeque<MemoryTransport>>,
}

impl MemoryConnector {
    pub fn new(transports: Vec<MemoryTransport>) -> Self {
        Self {
            transports: Mutex::new(transports.into()),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Transport = MemoryTransport;

    async fn connect(&self) -> Result<MemoryTransport, TransportError> {
        self.transports
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::Closed)
    }
}

pub fn quick_redial() -> ReconnectPolicy {
    ReconnectPolicy {
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_secs(1),
        max_attempts: 3,
    }
}

/// Sink that remembers every toast it was shown.
#[derive(Default)]
pub struct RecordingSink(Mutex<Vec<Toast>>);

impl RecordingSink {
    pub fn shown(&self) -> Vec<Toast> {
        self.0.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn show(&self, toast: &Toast) {
        self.0.lock().unwrap().push(toast.clone());
    }
}

impl MemoryPeer {
    pub fn push(&self, event: &ServerEvent) {
        let frame = serde_json::to_string(event).expect("event serializes");
        self.push_raw(&frame);
    }

    pub fn push_raw(&self, frame: &str) {
        let _ = self.push.send(frame.to_owned());
    }

    /// Next command the client emitted, waiting up to a second.
    pub async fn next_command(&mut self) -> Option<ClientCommand> {
        let frame = tokio::time::timeout(Duration::from_secs(1), self.sent.recv())
            .await
            .ok()??;
        Some(serde_json::from_str(&frame).expect("client frames are valid commands"))
    }

    pub fn try_command(&mut self) -> Option<ClientCommand> {
        let frame = self.sent.try_recv().ok()?;
        Some(serde_json::from_str(&frame).expect("client frames are valid commands"))
    }

    /// Every command emitted so far.
    pub async fn drain_commands(&mut self) -> Vec<ClientCommand> {
        settle().await;
        std::iter::from_fn(|| self.try_command()).collect()
    }
}

/// Scripted REST backend.
#[derive(Default)]
pub struct FakeApi {
    histories: Mutex<HashMap<RoomId, Result<Vec<Message>, ApiError>>>,
    gates: Mutex<HashMap<RoomId, Arc<Notify>>>,
    send_results: Mutex<VecDeque<Result<Message, ApiError>>>,
    writes: Mutex<Vec<(RoomId, String)>>,
    membership_error: Mutex<Option<ApiError>>,
}

impl FakeApi {
    pub fn set_history(&self, room_id: &str, result: Result<Vec<Message>, ApiError>) {
        self.histories
            .lock()
            .unwrap()
            .insert(RoomId::from(room_id), result);
    }

    /// Hold history fetches for `room_id` until the returned gate is notified.
    pub fn gate_history(&self, room_id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(RoomId::from(room_id), gate.clone());
        gate
    }

    pub fn queue_send(&self, result: Result<Message, ApiError>) {
        self.send_results.lock().unwrap().push_back(result);
    }

    pub fn writes(&self) -> Vec<(RoomId, String)> {
        self.writes.lock().unwrap().clone()
    }

    /// Make group join and leave calls fail with `error`.
    pub fn fail_membership(&self, error: ApiError) {
        *self.membership_error.lock().unwrap() = Some(error);
    }

    fn membership_result(&self) -> Result<(), ApiError> {
        match self.membership_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn fetch_messages(&self, room_id: &RoomId) -> Result<Vec<Message>, ApiError> {
        let gate = self.gates.lock().unwrap().get(room_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.histories
            .lock()
            .unwrap()
            .get(room_id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn create_message(&self, room_id: &RoomId, content: &str) -> Result<Message, ApiError> {
        self.writes
            .lock()
            .unwrap()
            .push((room_id.clone(), content.to_owned()));
        self.send_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Request("no scripted send result".into())))
    }

    async fn fetch_user(&self, user_id: &UserId) -> Result<UserProfile, ApiError> {
        Ok(UserProfile {
            user: User::new(user_id.clone(), "someone"),
            is_admin: false,
        })
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, ApiError> {
        Ok(Vec::new())
    }

    async fn join_room(&self, _room_id: &RoomId) -> Result<(), ApiError> {
        self.membership_result()
    }

    async fn leave_room(&self, _room_id: &RoomId) -> Result<(), ApiError> {
        self.membership_result()
    }
}
