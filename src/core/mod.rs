pub mod bridge;
pub mod realtime;
pub mod session;
pub mod telephony;

// Re-export commonly used types for convenience
pub use bridge::{BridgeOutcome, BridgeState, CallBridge, LegSide};

pub use realtime::{
    BaseRealtime, BoxedRealtime, ConnectionState, OpenAIRealtime, RealtimeConfig, RealtimeError,
    RealtimeEvent, RealtimeResult, create_realtime_provider, get_supported_realtime_providers,
};

pub use session::{Interruption, RESPONSE_MARK_NAME, Session};

pub use telephony::{
    CallPlacementError, PlacedCall, TelephonyLegEvent, TelephonyRoute, TwilioCallClient,
    TwilioInbound, TwilioOutbound, connect_stream_twiml, parse_inbound,
};
