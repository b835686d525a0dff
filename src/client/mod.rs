//! Client sync engine
//!
//! [`ConnectionManager`] owns the socket to the gateway; [`OpScheduler`]
//! turns local edits into outbound events and routes remote operations to a
//! [`GraphSubscriber`].

pub mod channel;
pub mod connection;
pub mod inbound;
pub mod scheduler;
pub mod timers;

pub use channel::{Listener, ListenerId, Listeners, SyncChannel};
pub use connection::{ConnectionManager, ConnectionStatus, SessionParams};
pub use inbound::{BatchMode, GraphSubscriber};
pub use scheduler::{OpScheduler, Subscription};
pub use timers::KeyedTimers;
