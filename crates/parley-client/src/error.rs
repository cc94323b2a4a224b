use parley_types::RoomId;
use thiserror::Error;

/// Broad category of an HTTP failure, used to word user-facing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorCategory {
    /// Missing, expired, or rejected bearer token.
    Auth,
    /// Throttled or timed out by the backend.
    RateLimited,
    /// The request itself was wrong (unknown room, bad body).
    Client,
    /// Backend failure; retrying later may succeed.
    Server,
    /// Anything outside the 4xx/5xx ranges.
    Unexpected,
}

/// Map HTTP status codes to error categories.
pub fn classify_http_status(status: u16) -> HttpErrorCategory {
    match status {
        401 | 403 => HttpErrorCategory::Auth,
        408 | 429 => HttpErrorCategory::RateLimited,
        400..=499 => HttpErrorCategory::Client,
        500..=599 => HttpErrorCategory::Server,
        _ => HttpErrorCategory::Unexpected,
    }
}

/// Failure of a single REST call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("backend answered HTTP {status} ({category:?})")]
    Status {
        status: u16,
        category: HttpErrorCategory,
    },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn from_status(status: u16) -> Self {
        Self::Status {
            status,
            category: classify_http_status(status),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::from_status(status.as_u16())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Recoverable failures surfaced to the presentation layer. None of them
/// tears down the session; the user retries by resending or reselecting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// History snapshot could not be loaded; the log stays empty.
    #[error("could not load messages for room {room_id}: {source}")]
    TransientFetch {
        room_id: RoomId,
        #[source]
        source: ApiError,
    },

    /// Durable write failed; the draft is kept and nothing was broadcast.
    #[error("could not send message to room {room_id}: {source}")]
    SendFailure {
        room_id: RoomId,
        #[source]
        source: ApiError,
    },

    /// Group join was refused; no room was selected.
    #[error("could not join room {room_id}: {source}")]
    JoinFailure {
        room_id: RoomId,
        #[source]
        source: ApiError,
    },

    /// Group leave was refused; the room stays selected.
    #[error("could not leave room {room_id}: {source}")]
    LeaveFailure {
        room_id: RoomId,
        #[source]
        source: ApiError,
    },

    #[error("no room is selected")]
    NoActiveRoom,
}
