//! Media-stream WebSocket handler
//!
//! The telephony provider opens this socket once per call. The socket is split
//! into a reader task that feeds [`TelephonyLegEvent`]s to the bridge and a
//! writer task that drains [`TelephonyRoute`]s from it, so the bridge loop never
//! awaits socket I/O directly.
//!
//! # Lifecycle
//!
//! 1. Upgrade accepted (bridge is `Connecting`)
//! 2. Briefing snapshot taken and the speech-AI leg connected
//! 3. [`CallBridge::run`] until either leg closes
//! 4. Writer drained and both tasks stopped

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::core::bridge::CallBridge;
use crate::core::realtime::{BoxedRealtime, create_realtime_provider};
use crate::core::telephony::{TelephonyLegEvent, TelephonyRoute};
use crate::state::{AppState, StreamPermit};

/// Channel buffer size for each direction of the telephony leg
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// How long the writer may take to flush after the bridge finishes
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Speech-AI provider used for phone calls
const REALTIME_PROVIDER: &str = "openai";

/// Media-stream WebSocket handler
///
/// `permit` is present when the connection-limit middleware is installed; it is
/// held until the call ends.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    permit: Option<Extension<StreamPermit>>,
) -> Response {
    debug!("Media stream upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_media_stream(socket, state, permit.map(|p| p.0)))
}

async fn handle_media_stream(socket: WebSocket, state: Arc<AppState>, _permit: Option<StreamPermit>) {
    let call_id = uuid::Uuid::new_v4().to_string();
    info!(call_id = %call_id, "Telephony media stream connected");

    let (sender, receiver) = socket.split();
    let (route_tx, route_rx) = mpsc::channel::<TelephonyRoute>(CHANNEL_BUFFER_SIZE);
    let (leg_tx, leg_rx) = mpsc::channel::<TelephonyLegEvent>(CHANNEL_BUFFER_SIZE);

    let sender_task = tokio::spawn(writer_task(sender, route_rx, call_id.clone()));
    let reader_task = tokio::spawn(reader_task(receiver, leg_tx, call_id.clone()));

    match connect_realtime(&state, &call_id).await {
        Some(realtime) => {
            let bridge = CallBridge::new(call_id.clone(), realtime, route_tx);
            bridge.run(leg_rx).await;
        }
        None => {
            let _ = route_tx.send(TelephonyRoute::Close).await;
            drop(route_tx);
        }
    }

    reader_task.abort();

    let writer_abort = sender_task.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, sender_task)
        .await
        .is_err()
    {
        warn!(call_id = %call_id, "Telephony writer did not drain in time");
        writer_abort.abort();
    }

    info!(call_id = %call_id, "Telephony media stream terminated");
}

/// Build and connect the speech-AI leg with the briefing in effect right now.
async fn connect_realtime(state: &AppState, call_id: &str) -> Option<BoxedRealtime> {
    let instructions = state.briefing.snapshot();

    let config = match state.config.realtime_config(instructions.as_str().to_string()) {
        Ok(config) => config,
        Err(e) => {
            error!(call_id, "Cannot start speech-AI leg: {}", e);
            return None;
        }
    };

    let mut realtime = match create_realtime_provider(REALTIME_PROVIDER, config) {
        Ok(provider) => provider,
        Err(e) => {
            error!(call_id, "Failed to create realtime provider: {}", e);
            return None;
        }
    };

    if let Err(e) = realtime.connect().await {
        error!(call_id, "Failed to connect speech-AI leg: {}", e);
        return None;
    }

    debug!(call_id, "Speech-AI leg connected");
    Some(realtime)
}

/// Forward inbound text frames to the bridge until the socket closes.
async fn reader_task(
    mut receiver: SplitStream<WebSocket>,
    leg_tx: mpsc::Sender<TelephonyLegEvent>,
    call_id: String,
) {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if leg_tx
                    .send(TelephonyLegEvent::Text(text.as_str().to_string()))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Ok(Message::Binary(data)) => {
                debug!(call_id = %call_id, bytes = data.len(), "Ignoring binary telephony frame");
            }
            Ok(Message::Close(frame)) => {
                debug!(call_id = %call_id, ?frame, "Telephony sent close frame");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(e) => {
                warn!(call_id = %call_id, "Telephony WebSocket error: {}", e);
                break;
            }
        }
    }

    let _ = leg_tx.send(TelephonyLegEvent::Closed).await;
}

/// Serialize bridge output onto the socket.
async fn writer_task(
    mut sender: SplitSink<WebSocket, Message>,
    mut route_rx: mpsc::Receiver<TelephonyRoute>,
    call_id: String,
) {
    while let Some(route) = route_rx.recv().await {
        let result = match route {
            TelephonyRoute::Frame(frame) => match serde_json::to_string(&frame) {
                Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                Err(e) => {
                    error!(call_id = %call_id, "Failed to serialize telephony frame: {}", e);
                    continue;
                }
            },
            TelephonyRoute::Close => {
                info!(call_id = %call_id, "Closing telephony WebSocket");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        };

        if let Err(e) = result {
            warn!(call_id = %call_id, "Failed to write telephony frame: {}", e);
            break;
        }
    }
}
