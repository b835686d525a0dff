//! Gateway wire protocol
//!
//! Named events in both directions, modelled as tagged enums.

pub mod events;

pub use events::{ClientEvent, ServerEvent, UNKNOWN_OPERATION};
