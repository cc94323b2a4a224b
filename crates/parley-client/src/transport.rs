use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{info, trace};

use crate::session::SessionContext;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid gateway request: {0}")]
    InvalidRequest(String),

    #[error("transport is closed")]
    Closed,
}

/// Text-frame duplex the session channel runs on. Reconnect policy, if any,
/// lives below this trait.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Next text frame. `None` once the peer has closed the connection.
    /// Must be cancel-safe: the channel pump polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Dials fresh transports so the channel can recover a dropped link.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn connect(&self) -> Result<Self::Transport, TransportError>;
}

/// How the channel redials after losing its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt; doubles on each retry.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Attempts before the channel gives up and closes. Zero never redials.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub const NEVER: Self = Self {
        initial_backoff: Duration::ZERO,
        max_backoff: Duration::ZERO,
        max_attempts: 0,
    };

    /// Delay before attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

/// WebSocket connection to the chat gateway.
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketTransport {
    /// Open the gateway socket. The bearer token is sent on the upgrade
    /// request so the backend can attribute the connection to the user.
    pub async fn connect(url: &str, session: &SessionContext) -> Result<Self, TransportError> {
        let mut request = url.into_client_request()?;
        let bearer = HeaderValue::from_str(&session.bearer())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, response) = connect_async(request).await?;
        info!(
            "{} ({}) connected to gateway {} [{}]",
            session.user.username,
            session.user.id,
            url,
            response.status()
        );

        Ok(Self { stream })
    }
}

/// Dials the gateway with the session's bearer token.
pub struct WebSocketConnector {
    url: String,
    session: SessionContext,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, session: SessionContext) -> Self {
        Self {
            url: url.into(),
            session,
        }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self) -> Result<WebSocketTransport, TransportError> {
        WebSocketTransport::connect(&self.url, &self.session).await
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.stream.send(Message::Text(frame.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        while let Some(msg) = self.stream.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(_)) => return None,
                // tungstenite answers pings on its own
                Ok(other) => trace!("ignoring non-text frame: {:?}", other),
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream.close(None).await?;
        Ok(())
    }
}
