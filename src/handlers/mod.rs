//! HTTP and WebSocket request handlers
//!
//! This module organizes all API handlers into logical groups:
//! - `api` - Root greeting, health check and App Service probe
//! - `incoming_call` - EventGrid webhook answering PSTN calls
//! - `callbacks` - ACS mid-call event callbacks
//! - `outbound` - Operator-triggered outbound calls
//! - `media_ws` - ACS bidirectional media streaming bridge

pub mod api;
pub mod callbacks;
pub mod incoming_call;
pub mod media_ws;
pub mod outbound;

// Re-export commonly used handlers for convenient access
pub use media_ws::media_ws_handler;
