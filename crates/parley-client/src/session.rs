use std::path::{Path, PathBuf};

use parley_types::User;
use parley_types::api::StoredSession;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read session file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session file {path} is not a valid login profile")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("session file {0} has an empty token")]
    MissingToken(PathBuf),
}

/// Identity of the authenticated user, read once and handed to the channel
/// and the REST client. Nothing else reads the persisted profile.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user: User,
    token: String,
}

impl SessionContext {
    pub fn new(user: User, token: impl Into<String>) -> Self {
        Self {
            user,
            token: token.into(),
        }
    }

    /// Load the profile written by the login flow.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SessionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let stored: StoredSession =
            serde_json::from_str(&raw).map_err(|source| SessionError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if stored.token.trim().is_empty() {
            return Err(SessionError::MissingToken(path.to_path_buf()));
        }

        info!("Loaded session for {} ({})", stored.username, stored.user_id);
        Ok(Self::from(stored))
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl From<StoredSession> for SessionContext {
    fn from(stored: StoredSession) -> Self {
        Self {
            user: User {
                id: stored.user_id,
                username: stored.username,
            },
            token: stored.token,
        }
    }
}
