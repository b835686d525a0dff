//! End-to-end tests: a real gateway on an ephemeral port and real clients

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use graph_sync::api::auth::HandshakeVerifier;
use graph_sync::api::create_router;
use graph_sync::{
    AppState, BatchMode, ClientConfig, ConnectionManager, ConnectionStatus, MindMap, Node,
    OpScheduler, ServerConfig, ServerEvent, SessionParams, SessionRegistry, SyncChannel,
};

const WAIT: Duration = Duration::from_secs(5);

/// Serve the gateway on an ephemeral port; aborting the handle stops accepting
async fn serve(config: ServerConfig) -> (String, Arc<AppState>, JoinHandle<()>) {
    let state = Arc::new(AppState::new(Arc::new(SessionRegistry::new()), config));
    let app = create_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("ws://{}/ws", addr), state, server)
}

async fn spawn_server(config: ServerConfig) -> (String, Arc<AppState>) {
    let (url, state, _server) = serve(config).await;
    (url, state)
}

async fn connect(url: &str, graph_id: &str, user_id: &str) -> Arc<ConnectionManager> {
    connect_with(ClientConfig::new(url), graph_id, user_id).await
}

async fn connect_with(config: ClientConfig, graph_id: &str, user_id: &str) -> Arc<ConnectionManager> {
    let manager = Arc::new(ConnectionManager::new(config));
    manager.mount(SessionParams::new(graph_id, user_id, "token"));
    assert!(
        manager
            .wait_for_status(ConnectionStatus::Connected, WAIT)
            .await,
        "{} never connected: {:?}",
        user_id,
        manager.last_error()
    );
    manager
}

/// Poll `check` until it holds or the wait runs out
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

fn count_events(manager: &ConnectionManager, name: &'static str) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    manager.add_listener(Arc::new(move |event: &ServerEvent| {
        if event.name() == name {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }));
    count
}

#[tokio::test]
async fn test_collaborators_see_each_other() {
    let (url, state) = spawn_server(ServerConfig::default()).await;
    let alice = connect(&url, "m1", "alice").await;
    let bob = connect(&url, "m1", "bob").await;

    assert!(eventually(|| alice.roster().len() == 2 && bob.roster().len() == 2).await);
    assert_eq!(state.registry().participants("m1").len(), 2);
    assert!(alice.connection_id().is_some());

    let config = alice.config().clone();
    let ops_alice = OpScheduler::new(alice.clone(), "m1", "alice", &config);
    let ops_bob = OpScheduler::new(bob.clone(), "m1", "bob", &config);
    let map_bob = Arc::new(Mutex::new(MindMap::new()));
    let _subscription = ops_bob.subscribe(map_bob.clone(), BatchMode::Immediate);
    let acks = count_events(&alice, "operation-success");

    assert!(ops_alice.add_node(Node::new("n1", json!({"label": "Root"})).at(10.0, 20.0)));

    assert!(eventually(|| map_bob.lock().node("n1").is_some()).await);
    assert!(eventually(|| acks.load(Ordering::SeqCst) == 1).await);
}

#[tokio::test]
async fn test_debounced_updates_over_the_wire() {
    let (url, _state) = spawn_server(ServerConfig::default()).await;
    let alice = connect(&url, "m1", "alice").await;
    let bob = connect(&url, "m1", "bob").await;
    assert!(eventually(|| alice.roster().len() == 2).await);

    let config = alice.config().clone();
    let ops_alice = OpScheduler::new(alice.clone(), "m1", "alice", &config);
    let updates = count_events(&bob, "node-updated");

    for i in 0..10 {
        ops_alice.update_node("n1", json!({"data": {"label": format!("draft {}", i)}}));
        sleep(Duration::from_millis(20)).await;
    }

    assert!(eventually(|| updates.load(Ordering::SeqCst) == 1).await);
    sleep(config.debounce_window * 2).await;
    assert_eq!(updates.load(Ordering::SeqCst), 1);
    assert_eq!(ops_alice.pending_updates(), 0);
}

#[tokio::test]
async fn test_teardown_leaves_graph() {
    let (url, state) = spawn_server(ServerConfig::default()).await;
    let alice = connect(&url, "m1", "alice").await;
    let bob = connect(&url, "m1", "bob").await;
    assert!(eventually(|| bob.roster().len() == 2).await);

    alice.teardown().await;

    assert_eq!(alice.status(), ConnectionStatus::Disconnected);
    assert_eq!(alice.listener_count(), 0);
    assert!(!alice.emit(graph_sync::ClientEvent::join("m1", "alice")));
    assert!(eventually(|| bob.roster().len() == 1).await);
    assert!(eventually(|| !state.registry().contains("m1", "alice")).await);
}

#[tokio::test]
async fn test_missing_token_fails_handshake() {
    let (url, state) = spawn_server(ServerConfig::default()).await;
    let manager = ConnectionManager::new(ClientConfig::new(url));

    manager.mount(SessionParams::new("m1", "alice", ""));

    assert!(manager.wait_for_status(ConnectionStatus::Failed, WAIT).await);
    assert!(manager.last_error().is_some());
    assert_eq!(state.registry().participant_count(), 0);
}

#[tokio::test]
async fn test_jwt_handshake() {
    let secret = "0123456789abcdef0123456789abcdef";
    let config = ServerConfig {
        jwt_secret: Some(secret.to_string()),
        ..ServerConfig::default()
    };
    let (url, _state) = spawn_server(config).await;
    let token = HandshakeVerifier::with_secret(secret)
        .issue_token("alice", 3600)
        .unwrap();

    let accepted = ConnectionManager::new(ClientConfig::new(url.clone()));
    accepted.mount(SessionParams::new("m1", "alice", token.clone()));
    assert!(accepted.wait_for_status(ConnectionStatus::Connected, WAIT).await);

    // A token issued to someone else is refused
    let impostor = ConnectionManager::new(ClientConfig::new(url));
    impostor.mount(SessionParams::new("m1", "mallory", token));
    assert!(impostor.wait_for_status(ConnectionStatus::Failed, WAIT).await);
}

#[tokio::test]
async fn test_reconnect_rejoins_with_new_connection() {
    let (url, state) = spawn_server(ServerConfig::default()).await;
    let alice = connect(&url, "m1", "alice").await;
    assert!(eventually(|| alice.connection_id().is_some()).await);
    let first = alice.connection_id();

    assert!(alice.reconnect().await);
    assert!(alice.wait_for_status(ConnectionStatus::Connected, WAIT).await);
    assert!(eventually(|| alice.connection_id().is_some() && alice.connection_id() != first).await);

    assert!(
        eventually(|| {
            let roster = state.registry().participants("m1");
            roster.len() == 1 && Some(roster[0].connection_id.clone()) == alice.connection_id()
        })
        .await
    );
}

fn fast_reconnect(url: &str, attempts: u32) -> ClientConfig {
    ClientConfig::new(url).with_reconnect(
        Duration::from_millis(50),
        Duration::from_millis(200),
        attempts,
    )
}

#[tokio::test]
async fn test_server_drop_triggers_automatic_reconnect() {
    let (url, state) = spawn_server(ServerConfig::default()).await;
    let alice = connect_with(fast_reconnect(&url, 5), "m1", "alice").await;
    assert!(eventually(|| alice.connection_id().is_some()).await);
    let first = alice.connection_id().unwrap();
    let greetings = count_events(&alice, "connected");

    // Evicting the connection server-side closes its socket
    state.router.disconnect(&first);

    assert!(eventually(|| greetings.load(Ordering::SeqCst) >= 1).await);
    assert!(alice.wait_for_status(ConnectionStatus::Connected, WAIT).await);
    assert!(eventually(|| alice.connection_id().is_some_and(|id| id != first)).await);
    assert!(
        eventually(|| {
            let roster = state.registry().participants("m1");
            roster.len() == 1 && Some(roster[0].connection_id.clone()) == alice.connection_id()
        })
        .await
    );
    assert!(eventually(|| alice.roster().len() == 1).await);
}

#[tokio::test]
async fn test_reconnect_gives_up_when_server_is_gone() {
    let (url, state, server) = serve(ServerConfig::default()).await;
    let alice = connect_with(fast_reconnect(&url, 2), "m1", "alice").await;
    assert!(eventually(|| alice.connection_id().is_some()).await);
    let first = alice.connection_id().unwrap();

    // Stop accepting, then drop the live connection
    server.abort();
    let _ = server.await;
    state.router.disconnect(&first);

    assert!(alice.wait_for_status(ConnectionStatus::Failed, WAIT).await);
    assert!(alice.last_error().is_some());
    assert!(!alice.connected());
}
