//! Graph Sync
//!
//! Real-time collaborative editing for mind-map style graphs. Collaborators
//! connect to a WebSocket gateway, join a graph, and see each other's node
//! and edge operations as they happen.
//!
//! # Features
//!
//! - **Session Registry**: Who is editing which graph, keyed by user
//! - **Broadcast Router**: Validates operations and relays them to the other
//!   members of the graph, acknowledging the sender
//! - **Transport Gateway**: Authenticated WebSocket handshake with heartbeat
//! - **Client Engine**: Connection manager with reconnection, debounced
//!   outbound updates, echo filtering and optional inbound batching
//!
//! # Modules
//!
//! - `types`: Nodes, edges, operations, participants and the local `MindMap`
//! - `protocol`: Wire events exchanged with the gateway
//! - `validation`: Inbound event validation
//! - `registry`: Session registry
//! - `api`: Gateway, broadcast router and HTTP routes
//! - `client`: Connection manager and op scheduler
//! - `config`: Server and client configuration
//! - `utils`: Utility functions (timestamps, etc.)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use graph_sync::{AppState, ServerConfig, SessionRegistry};
//!
//! #[tokio::main]
//! async fn main() -> graph_sync::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     let state = Arc::new(AppState::new(Arc::new(SessionRegistry::new()), config.clone()));
//!     let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
//!     axum::serve(listener, graph_sync::api::create_router(state)).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod types;
pub mod utils;
pub mod validation;

// Re-export commonly used items at crate root
pub use api::websocket::{AppState, BroadcastRouter, ConnectionHub};
pub use client::{
    BatchMode, ConnectionManager, ConnectionStatus, GraphSubscriber, OpScheduler, SessionParams,
    Subscription, SyncChannel,
};
pub use config::{ClientConfig, ServerConfig};
pub use error::{Result, SyncError};
pub use protocol::{ClientEvent, ServerEvent};
pub use registry::SessionRegistry;
pub use types::{
    ConnectionId, Edge, GraphId, MindMap, Node, Operation, OperationKind, Participant, Position,
    UserId,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
