//! Validation of inbound client events
//!
//! Malformed events never reach the registry or the fan-out; they become a
//! `ValidationError` reported to the sender only.

mod events;

pub use events::{validate_event, ValidatedEvent};
