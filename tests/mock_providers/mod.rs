//! Mock provider servers for integration tests
//!
//! - [`realtime_mock`]: a scripted speech-AI WebSocket endpoint

#![allow(dead_code)]

pub mod realtime_mock;

pub use realtime_mock::{Handshake, MockRealtimeServer};
