//! Telephony leg of the bridge (Twilio Media Streams).
//!
//! The WebSocket itself is owned by the HTTP layer. It feeds inbound frames to
//! the bridge as [`TelephonyLegEvent`]s and drains [`TelephonyRoute`]s produced
//! by the bridge, so the bridge never touches the socket directly.
//!
//! # Audio Format
//!
//! G.711 u-law at 8kHz, base64 encoded. Payloads are relayed without decoding.

pub mod calls;
mod messages;
pub mod twiml;

pub use calls::{CallPlacementError, PlacedCall, TWILIO_API_BASE, TwilioCallClient};
pub use messages::{
    InboundMedia, MarkBody, OutboundMedia, StreamStart, TelephonyError, TwilioInbound,
    TwilioOutbound, parse_inbound,
};
pub use twiml::{MEDIA_STREAM_PATH, connect_stream_twiml};

/// Inbound traffic from the telephony socket reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyLegEvent {
    /// A JSON text frame
    Text(String),
    /// The socket closed or errored
    Closed,
}

/// Outbound traffic for the telephony socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyRoute {
    /// Serialize and send a frame
    Frame(TwilioOutbound),
    /// Send a close frame and stop writing
    Close,
}
