//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `call_setup` - Incoming-call markup and outbound call placement
//! - `media_stream` - Telephony media-stream WebSocket that runs the call bridge

pub mod api;
pub mod call_setup;
pub mod media_stream;

// Re-export commonly used handlers for convenient access
pub use call_setup::{incoming_call, outbound_call};
pub use media_stream::media_stream_handler;
