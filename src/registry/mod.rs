//! Session registry
//!
//! Process-local bookkeeping of graph rosters. The registry is an explicitly
//! owned object handed to the gateway at construction; replacing it with a
//! shared store only needs the same join/leave/remove_by_connection surface.

mod session;

pub use session::{RosterChange, SessionRegistry};
