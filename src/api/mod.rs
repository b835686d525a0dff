//! API module for the HTTP and WebSocket endpoints
//!
//! This module provides the collaboration gateway and a small read-only REST
//! surface over the session registry.

pub mod auth;
pub mod http;
pub mod websocket;

pub use http::create_router;
