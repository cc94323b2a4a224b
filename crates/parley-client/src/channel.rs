use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parley_types::{ClientCommand, EventKind, ServerEvent, User};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::session::SessionContext;
use crate::transport::{Connector, ReconnectPolicy, Transport, TransportError};

/// State of the link under the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    /// Transport lost; redialing. Nothing is delivered or sent meanwhile.
    Down,
    /// Disconnected, or reconnect attempts exhausted. Final.
    Closed,
}

/// The single event channel of an authenticated session. Cloning yields
/// another handle to the same channel; it is never torn down by room changes.
#[derive(Clone)]
pub struct SessionChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    user: User,
    command_tx: mpsc::UnboundedSender<ClientCommand>,
    registry: Arc<Mutex<Registry>>,
    link: Arc<watch::Sender<LinkState>>,
    shutdown: CancellationToken,
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        // last handle gone
        self.shutdown.cancel();
    }
}

#[derive(Default)]
struct Registry {
    /// subscription id -> (event kinds, sink)
    slots: HashMap<Uuid, Slot>,
}

struct Slot {
    kinds: HashSet<EventKind>,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl SessionChannel {
    /// Bind a channel to a single `transport`. When it drops, the channel
    /// closes for good.
    pub fn connect<T: Transport>(session: &SessionContext, transport: T) -> Self {
        Self::spawn(session, transport, NoRedial(PhantomData), ReconnectPolicy::NEVER)
    }

    /// Dial through `connector` and keep the link up, redialing under
    /// `policy` whenever the transport drops. Subscriptions survive redials.
    pub async fn connect_with<C: Connector>(
        session: &SessionContext,
        connector: C,
        policy: ReconnectPolicy,
    ) -> Result<Self, TransportError> {
        let transport = connector.connect().await?;
        Ok(Self::spawn(session, transport, connector, policy))
    }

    fn spawn<C: Connector>(
        session: &SessionContext,
        transport: C::Transport,
        connector: C,
        policy: ReconnectPolicy,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Mutex::new(Registry::default()));
        let (link, _) = watch::channel(LinkState::Up);
        let link = Arc::new(link);
        let shutdown = CancellationToken::new();

        tokio::spawn(run_pump(
            Pump {
                connector,
                policy,
                command_rx,
                registry: registry.clone(),
                link: link.clone(),
                shutdown: shutdown.clone(),
            },
            transport,
        ));

        info!("Session channel open for {}", session.user.username);

        Self {
            inner: Arc::new(ChannelInner {
                user: session.user.clone(),
                command_tx,
                registry,
                link,
                shutdown,
            }),
        }
    }

    /// Identity the channel was opened for.
    pub fn user(&self) -> &User {
        &self.inner.user
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.link.borrow() == LinkState::Up
    }

    /// Watch link transitions. The current state counts as already seen.
    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.inner.link.subscribe()
    }

    /// Send a command to the backend. Fire-and-forget: dropped when the
    /// channel is down.
    pub fn emit(&self, command: ClientCommand) {
        if !self.is_connected() {
            debug!("Channel down, dropping {:?}", command);
            return;
        }
        let _ = self.inner.command_tx.send(command);
    }

    /// Subscribe to `kinds`. Events arrive on the returned subscription in
    /// delivery order until it is dropped.
    pub fn on(&self, kinds: &[EventKind]) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .registry
            .lock()
            .expect("subscription lock poisoned")
            .slots
            .insert(
                id,
                Slot {
                    kinds: kinds.iter().copied().collect(),
                    tx,
                },
            );

        Subscription {
            id,
            rx,
            registry: self.inner.registry.clone(),
        }
    }

    /// Stop delivering `kind` to every subscription. Subscriptions left with
    /// no kinds are closed.
    pub fn off(&self, kind: EventKind) {
        let mut registry = self.inner.registry.lock().expect("subscription lock poisoned");
        registry.slots.retain(|_, slot| {
            slot.kinds.remove(&kind);
            !slot.kinds.is_empty()
        });
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner
            .registry
            .lock()
            .expect("subscription lock poisoned")
            .slots
            .len()
    }

    /// Close the transport and drop every subscription.
    pub fn disconnect(&self) {
        if self.inner.link.send_replace(LinkState::Closed) != LinkState::Closed {
            info!("Disconnecting session channel for {}", self.inner.user.username);
        }
        self.inner.shutdown.cancel();
        self.inner
            .registry
            .lock()
            .expect("subscription lock poisoned")
            .slots
            .clear();
    }
}

/// Scoped event subscription. Dropping it detaches it from the channel.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
    registry: Arc<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event, or `None` once the channel has detached this subscription.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.slots.remove(&self.id);
        }
    }
}

/// Connector for a channel bound to one fixed transport.
struct NoRedial<T>(PhantomData<fn() -> T>);

#[async_trait]
impl<T: Transport> Connector for NoRedial<T> {
    type Transport = T;

    async fn connect(&self) -> Result<T, TransportError> {
        Err(TransportError::Closed)
    }
}

struct Pump<C> {
    connector: C,
    policy: ReconnectPolicy,
    command_rx: mpsc::UnboundedReceiver<ClientCommand>,
    registry: Arc<Mutex<Registry>>,
    link: Arc<watch::Sender<LinkState>>,
    shutdown: CancellationToken,
}

enum LinkEnd {
    Shutdown,
    Lost,
}

async fn run_pump<C: Connector>(mut pump: Pump<C>, mut transport: C::Transport) {
    loop {
        if let LinkEnd::Shutdown = run_link(&mut pump, &mut transport).await {
            break;
        }

        pump.link.send_if_modified(|state| {
            let lost = *state == LinkState::Up;
            if lost {
                *state = LinkState::Down;
            }
            lost
        });
        match redial(&pump.connector, &pump.policy, &pump.shutdown).await {
            Some(next) => {
                transport = next;
                info!("Gateway link restored");
                pump.link.send_replace(LinkState::Up);
            }
            None => break,
        }
    }

    pump.link.send_replace(LinkState::Closed);
}

async fn run_link<C: Connector>(pump: &mut Pump<C>, transport: &mut C::Transport) -> LinkEnd {
    loop {
        tokio::select! {
            // commands queued before shutdown still go out
            biased;

            command = pump.command_rx.recv() => {
                let Some(command) = command else {
                    // every channel handle is gone
                    let _ = transport.close().await;
                    return LinkEnd::Shutdown;
                };
                let frame = match serde_json::to_string(&command) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Failed to encode {:?}: {}", command, e);
                        continue;
                    }
                };
                debug!("-> {}", frame);
                if let Err(e) = transport.send(frame).await {
                    warn!("Gateway send failed: {}", e);
                    return LinkEnd::Lost;
                }
            }
            _ = pump.shutdown.cancelled() => {
                let _ = transport.close().await;
                return LinkEnd::Shutdown;
            }
            frame = transport.recv() => {
                match frame {
                    Some(Ok(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => dispatch(&pump.registry, event),
                        Err(e) => warn!(
                            "Bad gateway frame: {} -- raw: {}",
                            e,
                            text.chars().take(200).collect::<String>()
                        ),
                    },
                    Some(Err(e)) => {
                        warn!("Gateway receive failed: {}", e);
                        return LinkEnd::Lost;
                    }
                    None => {
                        info!("Gateway closed the connection");
                        return LinkEnd::Lost;
                    }
                }
            }
        }
    }
}

async fn redial<C: Connector>(
    connector: &C,
    policy: &ReconnectPolicy,
    shutdown: &CancellationToken,
) -> Option<C::Transport> {
    for attempt in 1..=policy.max_attempts {
        let backoff = policy.backoff(attempt);
        warn!(
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            "Gateway link lost, reconnecting"
        );

        let dialed = tokio::select! {
            _ = shutdown.cancelled() => return None,
            dialed = async {
                tokio::time::sleep(backoff).await;
                connector.connect().await
            } => dialed,
        };
        match dialed {
            Ok(transport) => return Some(transport),
            Err(e) => warn!(attempt, "Reconnect failed: {}", e),
        }
    }

    if policy.max_attempts > 0 {
        warn!("Giving up on the gateway after {} attempts", policy.max_attempts);
    }
    None
}

fn dispatch(registry: &Mutex<Registry>, event: ServerEvent) {
    let kind = event.kind();
    let mut registry = registry.lock().expect("subscription lock poisoned");

    let mut delivered = 0usize;
    registry.slots.retain(|_, slot| {
        if !slot.kinds.contains(&kind) {
            return true;
        }
        // a closed receiver means the subscription is being dropped
        let alive = slot.tx.send(event.clone()).is_ok();
        delivered += usize::from(alive);
        alive
    });

    if delivered == 0 {
        debug!("No subscriber for '{}'", kind.name());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parley_types::{RoomId, UserId};

    use super::*;
    use crate::testing::{MemoryConnector, MemoryTransport, quick_redial, session, settle};

    #[tokio::test]
    async fn emits_commands_as_named_frames() {
        let (transport, mut peer) = MemoryTransport::pair();
        let channel = SessionChannel::connect(&session(), transport);

        channel.emit(ClientCommand::JoinRoom(RoomId::from("g1")));

        let cmd = peer.next_command().await.expect("peer should get a command");
        assert_eq!(cmd, ClientCommand::JoinRoom(RoomId::from("g1")));
    }

    #[tokio::test]
    async fn routes_events_only_to_matching_subscriptions() {
        let (transport, peer) = MemoryTransport::pair();
        let channel = SessionChannel::connect(&session(), transport);
        let mut presence = channel.on(&[EventKind::UserLeft]);
        let mut typing = channel.on(&[EventKind::UserTyping]);

        peer.push(&ServerEvent::UserLeft(UserId::from("u9")));

        let event = presence.recv().await.expect("presence subscriber gets the event");
        assert_eq!(event, ServerEvent::UserLeft(UserId::from("u9")));
        let nothing = tokio::time::timeout(Duration::from_millis(50), typing.recv()).await;
        assert!(nothing.is_err(), "typing subscriber must not see presence events");
    }

    #[tokio::test]
    async fn dropping_a_subscription_detaches_it() {
        let (transport, _peer) = MemoryTransport::pair();
        let channel = SessionChannel::connect(&session(), transport);

        let sub = channel.on(&EventKind::ROOM_EVENTS);
        assert_eq!(channel.subscription_count(), 1);
        drop(sub);
        assert_eq!(channel.subscription_count(), 0);
    }

    #[tokio::test]
    async fn off_removes_kind_and_closes_empty_subscriptions() {
        let (transport, _peer) = MemoryTransport::pair();
        let channel = SessionChannel::connect(&session(), transport);
        let mut only_typing = channel.on(&[EventKind::UserTyping]);
        let _both = channel.on(&[EventKind::UserTyping, EventKind::UserLeft]);

        channel.off(EventKind::UserTyping);

        assert_eq!(channel.subscription_count(), 1);
        assert_eq!(only_typing.recv().await, None);
    }

    #[tokio::test]
    async fn skips_malformed_frames() {
        let (transport, peer) = MemoryTransport::pair();
        let channel = SessionChannel::connect(&session(), transport);
        let mut sub = channel.on(&[EventKind::UserStopTyping]);

        peer.push_raw("{not json");
        peer.push(&ServerEvent::UserStopTyping {
            username: "bob".into(),
        });

        let event = sub.recv().await.expect("valid frame after a bad one is delivered");
        assert_eq!(event.kind(), EventKind::UserStopTyping);
        assert!(channel.is_connected());
    }

    #[tokio::test]
    async fn disconnect_drops_subscriptions_and_later_emits() {
        let (transport, mut peer) = MemoryTransport::pair();
        let channel = SessionChannel::connect(&session(), transport);
        let mut sub = channel.on(&EventKind::ROOM_EVENTS);

        channel.disconnect();
        channel.emit(ClientCommand::LeaveRoom(RoomId::from("g1")));
        settle().await;

        assert!(!channel.is_connected());
        assert_eq!(sub.recv().await, None);
        assert!(peer.try_command().is_none());
    }

    #[tokio::test]
    async fn peer_close_marks_channel_down() {
        let (transport, peer) = MemoryTransport::pair();
        let channel = SessionChannel::connect(&session(), transport);

        drop(peer);
        settle().await;

        assert!(!channel.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn redials_after_peer_drop_and_keeps_subscriptions() {
        let (first, first_peer) = MemoryTransport::pair();
        let (second, mut second_peer) = MemoryTransport::pair();
        let connector = MemoryConnector::new(vec![first, second]);
        let channel = SessionChannel::connect_with(&session(), connector, quick_redial())
            .await
            .expect("first dial succeeds");
        let mut sub = channel.on(&[EventKind::UserLeft]);
        let mut link = channel.link_state();

        drop(first_peer);
        link.changed().await.expect("drop is reported");
        assert_eq!(*link.borrow_and_update(), LinkState::Down);
        assert!(!channel.is_connected());

        link.changed().await.expect("link comes back");
        assert_eq!(*link.borrow_and_update(), LinkState::Up);

        channel.emit(ClientCommand::JoinRoom(RoomId::from("g1")));
        assert_eq!(
            second_peer.next_command().await,
            Some(ClientCommand::JoinRoom(RoomId::from("g1")))
        );
        second_peer.push(&ServerEvent::UserLeft(UserId::from("u9")));
        assert_eq!(
            sub.recv().await,
            Some(ServerEvent::UserLeft(UserId::from("u9")))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn closes_once_redial_attempts_run_out() {
        let (first, first_peer) = MemoryTransport::pair();
        let channel =
            SessionChannel::connect_with(&session(), MemoryConnector::new(vec![first]), quick_redial())
                .await
                .expect("first dial succeeds");
        let mut link = channel.link_state();

        drop(first_peer);
        while *link.borrow_and_update() != LinkState::Closed {
            link.changed().await.expect("channel keeps the sender alive");
        }

        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn single_transport_channel_closes_on_peer_drop() {
        let (transport, peer) = MemoryTransport::pair();
        let channel = SessionChannel::connect(&session(), transport);

        drop(peer);
        settle().await;

        assert_eq!(*channel.link_state().borrow(), LinkState::Closed);
    }
}
