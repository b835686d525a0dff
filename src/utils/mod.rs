//! Utility functions and helpers

pub mod time;

pub use time::{current_timestamp, current_timestamp_millis};
