//! Client connection manager
//!
//! Owns the WebSocket connection of one user to one graph. Once mounted, a
//! driver task connects to the gateway, joins the graph, pumps outbound
//! events and dispatches inbound ones to listeners. If the server side goes
//! away the driver reconnects with exponential backoff; an initial connect
//! error leaves the manager in [`ConnectionStatus::Failed`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::channel::{Listener, ListenerId, Listeners, SyncChannel};
use crate::config::ClientConfig;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::types::{ConnectionId, GraphId, Participant, UserId};

/// How long teardown waits for `leave-graph` to flush before aborting
const TEARDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity a connection is mounted with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionParams {
    pub graph_id: Option<GraphId>,
    pub user_id: Option<UserId>,
    pub token: String,
}

impl SessionParams {
    pub fn new(
        graph_id: impl Into<String>,
        user_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            graph_id: Some(graph_id.into()),
            user_id: Some(user_id.into()),
            token: token.into(),
        }
    }

    fn resolve(self) -> Option<Session> {
        let graph_id = self.graph_id.filter(|id| !id.trim().is_empty())?;
        let user_id = self.user_id.filter(|id| !id.trim().is_empty())?;
        Some(Session {
            graph_id,
            user_id,
            token: self.token,
        })
    }
}

#[derive(Debug, Clone)]
struct Session {
    graph_id: GraphId,
    user_id: UserId,
    token: String,
}

impl Session {
    /// Gateway URL carrying the handshake credentials
    fn url(&self, base: &str) -> String {
        let separator = if base.contains('?') { '&' } else { '?' };
        format!(
            "{}{}userId={}&token={}",
            base,
            separator,
            urlencoding::encode(&self.user_id),
            urlencoding::encode(&self.token)
        )
    }
}

enum Command {
    Emit(ClientEvent),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisconnectReason {
    /// Closed by teardown or reconnect
    Client,
    /// Server closed the socket
    Server,
    Transport,
}

struct ClientState {
    /// Incremented whenever a driver is started or retired; a driver only
    /// touches state while its epoch is current
    epoch: u64,
    status: ConnectionStatus,
    session: Option<Session>,
    outbound: Option<mpsc::UnboundedSender<Command>>,
    driver: Option<JoinHandle<()>>,
    roster: Vec<Participant>,
    connection_id: Option<ConnectionId>,
    last_error: Option<String>,
}

struct Shared {
    config: ClientConfig,
    state: Mutex<ClientState>,
    listeners: Listeners,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl Shared {
    fn with_state<R>(&self, f: impl FnOnce(&mut ClientState) -> R) -> R {
        let mut state = self.state.lock();
        let result = f(&mut state);
        let status = state.status;
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        result
    }

    /// Apply `f` only if `epoch` is still the live driver
    fn update(&self, epoch: u64, f: impl FnOnce(&mut ClientState)) -> bool {
        self.with_state(|state| {
            if state.epoch != epoch {
                return false;
            }
            f(state);
            true
        })
    }

    fn receive(&self, epoch: u64, text: &str) {
        let event: ServerEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                warn!("unreadable server frame: {}", e);
                return;
            }
        };

        let live = self.update(epoch, |state| match &event {
            ServerEvent::Connected { connection_id, .. } => {
                state.connection_id = Some(connection_id.clone());
            }
            ServerEvent::UserJoined { participants, .. }
            | ServerEvent::UserLeft { participants, .. } => {
                state.roster = participants.clone();
            }
            ServerEvent::Error { message, operation } => {
                warn!(operation = %operation, "server rejected event: {}", message);
                state.last_error = Some(message.clone());
            }
            _ => {}
        });

        if live {
            self.listeners.dispatch(&event);
        }
    }
}

/// WebSocket connection to the gateway for one (graph, user) pair
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(ClientState {
                    epoch: 0,
                    status: ConnectionStatus::Disconnected,
                    session: None,
                    outbound: None,
                    driver: None,
                    roster: Vec::new(),
                    connection_id: None,
                    last_error: None,
                }),
                listeners: Listeners::new(),
                status_tx,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Start connecting for the given identity.
    ///
    /// Without a graph id and user id nothing happens and the manager stays
    /// disconnected. Mounting an already mounted manager is ignored; tear it
    /// down first to switch graphs. Must be called within a tokio runtime.
    pub fn mount(&self, params: SessionParams) -> ConnectionStatus {
        let Some(session) = params.resolve() else {
            debug!("graph or user missing, staying disconnected");
            return self.status();
        };
        if self.shared.state.lock().session.is_some() {
            debug!("already mounted");
            return self.status();
        }
        self.start(session)
    }

    /// Drop the current connection and connect again with the mounted
    /// identity. Returns false if nothing is mounted.
    pub async fn reconnect(&self) -> bool {
        let (session, outbound, driver) = self.shared.with_state(|state| {
            state.epoch += 1;
            (
                state.session.clone(),
                state.outbound.take(),
                state.driver.take(),
            )
        });
        let Some(session) = session else {
            return false;
        };

        if let Some(driver) = driver {
            stop_driver(driver, outbound).await;
        }
        self.start(session);
        true
    }

    /// Leave the graph, close the socket and remove every listener.
    ///
    /// Listeners are cleared and the status reset even if the returned
    /// future is dropped before completing.
    pub async fn teardown(&self) {
        let mut guard = TeardownGuard {
            shared: &self.shared,
            driver: None,
        };

        let (session, outbound) = self.shared.with_state(|state| {
            state.epoch += 1;
            guard.driver = state.driver.take();
            (state.session.take(), state.outbound.take())
        });

        if let (Some(session), Some(outbound)) = (session, outbound) {
            let leave = ClientEvent::leave(session.graph_id.as_str(), session.user_id.as_str());
            if outbound.send(Command::Emit(leave)).is_ok() && outbound.send(Command::Close).is_ok() {
                if let Some(driver) = guard.driver.as_mut() {
                    let _ = timeout(TEARDOWN_GRACE, driver).await;
                }
            }
            info!(graph = %session.graph_id, user = %session.user_id, "left graph");
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.state.lock().status
    }

    pub fn connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Receiver that observes every status change
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Wait until the status equals `wanted`, giving up after `within`
    pub async fn wait_for_status(&self, wanted: ConnectionStatus, within: Duration) -> bool {
        let mut status = self.watch_status();
        let reached = matches!(
            timeout(within, status.wait_for(|current| *current == wanted)).await,
            Ok(Ok(_))
        );
        reached
    }

    /// Participants of the mounted graph as last reported by the server
    pub fn roster(&self) -> Vec<Participant> {
        self.shared.state.lock().roster.clone()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.shared.state.lock().connection_id.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.state.lock().last_error.clone()
    }

    pub fn graph_id(&self) -> Option<GraphId> {
        self.shared
            .state
            .lock()
            .session
            .as_ref()
            .map(|s| s.graph_id.clone())
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.shared
            .state
            .lock()
            .session
            .as_ref()
            .map(|s| s.user_id.clone())
    }

    pub fn listener_count(&self) -> usize {
        self.shared.listeners.len()
    }

    fn start(&self, session: Session) -> ConnectionStatus {
        let shared = Arc::clone(&self.shared);
        self.shared.with_state(|state| {
            state.epoch += 1;
            state.status = ConnectionStatus::Connecting;
            state.session = Some(session.clone());
            state.driver = Some(tokio::spawn(drive(shared, session, state.epoch)));
        });
        ConnectionStatus::Connecting
    }
}

impl SyncChannel for ConnectionManager {
    fn is_connected(&self) -> bool {
        self.connected()
    }

    fn emit(&self, event: ClientEvent) -> bool {
        let state = self.shared.state.lock();
        if state.status != ConnectionStatus::Connected {
            return false;
        }
        state
            .outbound
            .as_ref()
            .is_some_and(|tx| tx.send(Command::Emit(event)).is_ok())
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        self.shared.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let driver = self.shared.with_state(|state| {
            state.epoch += 1;
            state.outbound = None;
            state.driver.take()
        });
        if let Some(driver) = driver {
            driver.abort();
        }
    }
}

/// Finishes teardown even when the teardown future is cancelled
struct TeardownGuard<'a> {
    shared: &'a Shared,
    driver: Option<JoinHandle<()>>,
}

impl Drop for TeardownGuard<'_> {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        let removed = self.shared.listeners.clear();
        self.shared.with_state(|state| {
            state.status = ConnectionStatus::Disconnected;
            state.roster.clear();
            state.connection_id = None;
        });
        debug!(removed, "listeners removed");
    }
}

/// Ask a driver to close its socket, aborting it if it does not finish
async fn stop_driver(mut driver: JoinHandle<()>, outbound: Option<mpsc::UnboundedSender<Command>>) {
    match outbound {
        Some(tx) if tx.send(Command::Close).is_ok() => {
            if timeout(TEARDOWN_GRACE, &mut driver).await.is_err() {
                driver.abort();
            }
        }
        _ => driver.abort(),
    }
}

/// Connection loop for one mounted session
async fn drive(shared: Arc<Shared>, session: Session, epoch: u64) {
    let url = session.url(&shared.config.url);
    let mut attempt: u32 = 0;

    loop {
        if attempt > 0 {
            let delay = shared.config.backoff(attempt);
            debug!(attempt, ?delay, "reconnecting");
            sleep(delay).await;
        }
        if !shared.update(epoch, |state| state.status = ConnectionStatus::Connecting) {
            return;
        }

        let stream = match connect_async(url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                let message = format!("Failed to connect: {}", e);
                warn!(graph = %session.graph_id, attempt, "{}", message);
                let give_up = attempt == 0 || attempt >= shared.config.reconnect_attempts;
                shared.update(epoch, |state| {
                    state.last_error = Some(message);
                    if give_up {
                        state.status = ConnectionStatus::Failed;
                    }
                });
                if give_up {
                    return;
                }
                attempt += 1;
                continue;
            }
        };

        info!(graph = %session.graph_id, user = %session.user_id, "connected");

        let (tx, rx) = mpsc::unbounded_channel();
        // join-graph goes out before anything emitted by callers
        let _ = tx.send(Command::Emit(ClientEvent::join(
            session.graph_id.as_str(),
            session.user_id.as_str(),
        )));
        let live = shared.update(epoch, |state| {
            state.status = ConnectionStatus::Connected;
            state.last_error = None;
            state.outbound = Some(tx);
        });
        if !live {
            return;
        }

        let reason = pump(stream, rx, &shared, epoch).await;
        shared.update(epoch, |state| {
            state.status = ConnectionStatus::Disconnected;
            state.outbound = None;
            state.roster.clear();
            state.connection_id = None;
        });

        if reason == DisconnectReason::Client || shared.config.reconnect_attempts == 0 {
            return;
        }
        info!(graph = %session.graph_id, ?reason, "connection lost");
        attempt = 1;
    }
}

/// Move frames between the socket and the command queue until either side
/// closes
async fn pump(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    shared: &Shared,
    epoch: u64,
) -> DisconnectReason {
    let (mut sink, mut frames) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Emit(event)) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("failed to encode {}: {}", event.name(), e);
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        debug!("send failed: {}", e);
                        return DisconnectReason::Transport;
                    }
                }
                Some(Command::Close) | None => {
                    let _ = sink.close().await;
                    return DisconnectReason::Client;
                }
            },

            frame = frames.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.receive(epoch, &text),
                Some(Ok(Message::Close(_))) | None => return DisconnectReason::Server,
                // Pings are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("websocket error: {}", e);
                    return DisconnectReason::Transport;
                }
            },
        }
    }
}
