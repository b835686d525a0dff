//! WebSocket gateway for collaborative graph editing
//!
//! Provides the `/ws` endpoint. Connections join per-graph groups; operations
//! are relayed to the other members of the group and acknowledged to the
//! sender.
//!
//! ## Features
//! - Handshake authentication (user id + token, optional JWT)
//! - Roster events on join, leave and disconnect
//! - Heartbeat pings with idle timeout
//! - Per-connection FIFO delivery

pub mod handler;
pub mod hub;
pub mod router;
pub mod state;

pub use hub::ConnectionHub;
pub use router::BroadcastRouter;
pub use state::AppState;
