use serde::{Deserialize, Serialize};

use crate::models::{Message, RoomId, User, UserId};

// -- Auth --

/// Profile persisted after login: the identity the client acts as plus the
/// bearer token for REST calls and the channel handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(rename = "_id", alias = "id")]
    pub user_id: UserId,
    pub username: String,
    pub token: String,
}

// -- Messages --

#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub content: &'a str,
    #[serde(rename = "groupId")]
    pub room_id: &'a RoomId,
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<Message>,
}

// -- Users --

#[derive(Debug, Deserialize)]
pub struct UserProfileResponse {
    pub user: UserProfile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    #[serde(rename = "isAdmin", default)]
    pub is_admin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_session_reads_login_payload() {
        let session: StoredSession = serde_json::from_str(
            r#"{"_id": "u1", "username": "alice", "email": "a@example.org", "token": "t0k"}"#,
        )
        .expect("session should parse");
        assert_eq!(session.user_id, UserId::from("u1"));
        assert_eq!(session.token, "t0k");
    }

    #[test]
    fn profile_admin_flag_defaults_to_false() {
        let resp: UserProfileResponse =
            serde_json::from_str(r#"{"user": {"_id": "u1", "username": "alice"}}"#)
                .expect("profile should parse");
        assert!(!resp.user.is_admin);
        assert_eq!(resp.user.user.username, "alice");
    }

    #[test]
    fn send_request_uses_group_id_key() {
        let room = RoomId::from("g1");
        let body = serde_json::to_value(SendMessageRequest {
            content: "hello",
            room_id: &room,
        })
        .expect("request should serialize");
        assert_eq!(body["groupId"], "g1");
        assert_eq!(body["content"], "hello");
    }
}
