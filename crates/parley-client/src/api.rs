use async_trait::async_trait;
use parley_types::api::{MessagesResponse, SendMessageRequest, UserProfile, UserProfileResponse};
use parley_types::{Message, Room, RoomId, UserId};
use tracing::debug;

use crate::error::ApiError;
use crate::session::SessionContext;

/// REST calls the engine depends on.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `GET /messages/{roomId}`: history snapshot, oldest first.
    async fn fetch_messages(&self, room_id: &RoomId) -> Result<Vec<Message>, ApiError>;

    /// `POST /messages`: durable write; returns the canonical message.
    async fn create_message(&self, room_id: &RoomId, content: &str) -> Result<Message, ApiError>;

    /// `GET /users/{userId}`
    async fn fetch_user(&self, user_id: &UserId) -> Result<UserProfile, ApiError>;

    /// `GET /groups`
    async fn list_rooms(&self) -> Result<Vec<Room>, ApiError>;

    /// `POST /groups/join/{groupId}`. Must succeed before the room is selected.
    async fn join_room(&self, room_id: &RoomId) -> Result<(), ApiError>;

    /// `POST /groups/leave/{groupId}`
    async fn leave_room(&self, room_id: &RoomId) -> Result<(), ApiError>;
}

/// [`ChatApi`] over HTTP, authenticated with the session's bearer token.
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    session: SessionContext,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, session: SessionContext) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            session,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_empty(&self, path: &str) -> Result<(), ApiError> {
        self.client
            .post(self.url(path))
            .bearer_auth(self.session.token())
            .json(&serde_json::json!({}))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn fetch_messages(&self, room_id: &RoomId) -> Result<Vec<Message>, ApiError> {
        let resp: MessagesResponse = self
            .client
            .get(self.url(&format!("/messages/{}", room_id)))
            .bearer_auth(self.session.token())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!("Fetched {} messages for room {}", resp.messages.len(), room_id);
        Ok(resp.messages)
    }

    async fn create_message(&self, room_id: &RoomId, content: &str) -> Result<Message, ApiError> {
        let message: Message = self
            .client
            .post(self.url("/messages"))
            .bearer_auth(self.session.token())
            .json(&SendMessageRequest { content, room_id })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!("Stored message {} in room {}", message.id, room_id);
        Ok(message)
    }

    async fn fetch_user(&self, user_id: &UserId) -> Result<UserProfile, ApiError> {
        let resp: UserProfileResponse = self
            .client
            .get(self.url(&format!("/users/{}", user_id)))
            .bearer_auth(self.session.token())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.user)
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, ApiError> {
        let rooms = self
            .client
            .get(self.url("/groups"))
            .bearer_auth(self.session.token())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(rooms)
    }

    async fn join_room(&self, room_id: &RoomId) -> Result<(), ApiError> {
        self.post_empty(&format!("/groups/join/{}", room_id)).await
    }

    async fn leave_room(&self, room_id: &RoomId) -> Result<(), ApiError> {
        self.post_empty(&format!("/groups/leave/{}", room_id)).await
    }
}
