//! OpenAI Realtime API client for one phone call.
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: WebSocket with JSON events
//! - Audio: G.711 u-law, base64 encoded, relayed untouched from the telephony leg
//!
//! # Session configuration
//!
//! The `session.update` event is sent as soon as the provider announces
//! `session.created`. If that never arrives the configuration is sent once the
//! settle delay elapses, which matches providers that accept configuration
//! immediately after the socket opens.
//!
//! There is no reconnection: when the socket closes the call is over, and the
//! bridge receives a single [`RealtimeEvent::Closed`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{
    DEFAULT_TEMPERATURE, Modality, OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat,
    OpenAIRealtimeModel, OpenAIRealtimeVoice,
};
use super::messages::{ClientEvent, EventEnvelope, ServerEvent, SessionConfig, TurnDetection};
use crate::core::realtime::base::{
    BaseRealtime, ConnectionState, RealtimeConfig, RealtimeError, RealtimeEvent, RealtimeResult,
};

/// Channel capacity for outbound client events.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Channel capacity for events delivered to the bridge.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How long `disconnect` waits for the close handshake before aborting the task.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// OpenAI Realtime connection for a single call.
pub struct OpenAIRealtime {
    config: RealtimeConfig,
    model: OpenAIRealtimeModel,
    voice: OpenAIRealtimeVoice,
    audio_format: OpenAIRealtimeAudioFormat,
    /// Shared with the connection task
    state: Arc<RwLock<ConnectionState>>,
    connected: Arc<AtomicBool>,
    ws_sender: Option<mpsc::Sender<ClientEvent>>,
    event_rx: Option<mpsc::Receiver<RealtimeEvent>>,
    connection_handle: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl OpenAIRealtime {
    pub fn new(config: RealtimeConfig) -> RealtimeResult<Self> {
        if config.api_key.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        let model = if config.model.is_empty() {
            OpenAIRealtimeModel::default()
        } else {
            OpenAIRealtimeModel::from_str_or_default(&config.model)
        };
        let voice = config
            .voice
            .as_deref()
            .map(OpenAIRealtimeVoice::from_str_or_default)
            .unwrap_or_default();
        let audio_format = config
            .input_audio_format
            .as_deref()
            .map(OpenAIRealtimeAudioFormat::from_str_or_default)
            .unwrap_or_default();

        Ok(Self {
            config,
            model,
            voice,
            audio_format,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            connected: Arc::new(AtomicBool::new(false)),
            ws_sender: None,
            event_rx: None,
            connection_handle: None,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn model(&self) -> OpenAIRealtimeModel {
        self.model
    }

    pub fn voice(&self) -> OpenAIRealtimeVoice {
        self.voice
    }

    /// WebSocket URL with the model query parameter.
    fn build_ws_url(&self) -> String {
        let base = if self.config.url.is_empty() {
            OPENAI_REALTIME_URL
        } else {
            self.config.url.as_str()
        };
        format!("{}?model={}", base, self.model.as_str())
    }

    /// The `session.update` payload for this call.
    pub fn build_session_config(&self) -> SessionConfig {
        let output_format = self
            .config
            .output_audio_format
            .as_deref()
            .map(OpenAIRealtimeAudioFormat::from_str_or_default)
            .unwrap_or(self.audio_format);

        SessionConfig {
            turn_detection: TurnDetection::server_vad(),
            input_audio_format: self.audio_format.as_str().to_string(),
            output_audio_format: output_format.as_str().to_string(),
            voice: self.voice.as_str().to_string(),
            instructions: self.config.instructions.clone(),
            modalities: self
                .config
                .modalities
                .clone()
                .unwrap_or_else(Modality::phone_defaults),
            temperature: Some(self.config.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
        }
    }

    /// Queue an event for the connection task. Never waits: a full queue drops the event.
    fn send_event(&self, event: ClientEvent) -> RealtimeResult<()> {
        let Some(sender) = self.ws_sender.as_ref() else {
            return Err(RealtimeError::NotConnected);
        };
        sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RealtimeError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => RealtimeError::NotConnected,
        })
    }
}

#[async_trait]
impl BaseRealtime for OpenAIRealtime {
    async fn connect(&mut self) -> RealtimeResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.shutdown.is_cancelled() {
            return Err(RealtimeError::ConnectionFailed(
                "connection already closed".to_string(),
            ));
        }

        *self.state.write() = ConnectionState::Connecting;

        let url = self.build_ws_url();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        request.headers_mut().insert("Authorization", auth);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws_stream, _response) = match tokio_tungstenite::connect_async(request).await {
            Ok(connected) => connected,
            Err(e) => {
                *self.state.write() = ConnectionState::Closed;
                return Err(RealtimeError::ConnectionFailed(e.to_string()));
            }
        };

        info!(model = %self.model, "Connected to OpenAI Realtime API");

        let (ws_sink, ws_source) = ws_stream.split();
        let (tx, rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<RealtimeEvent>(EVENT_CHANNEL_CAPACITY);
        self.ws_sender = Some(tx);
        self.event_rx = Some(event_rx);

        self.connected.store(true, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Connected;

        let task = ConnectionTask {
            sink: ws_sink,
            source: ws_source,
            outbound: rx,
            events: event_tx,
            session: self.build_session_config(),
            settle: self.config.settle_delay(),
            wait_for_session_created: self.config.wait_for_session_created,
            connected: self.connected.clone(),
            state: self.state.clone(),
            shutdown: self.shutdown.clone(),
        };
        self.connection_handle = Some(tokio::spawn(task.run()));

        Ok(())
    }

    async fn disconnect(&mut self) -> RealtimeResult<()> {
        self.shutdown.cancel();
        self.ws_sender = None;

        if let Some(mut handle) = self.connection_handle.take()
            && tokio::time::timeout(CLOSE_GRACE, &mut handle).await.is_err()
        {
            warn!("Realtime connection did not close in time, aborting");
            handle.abort();
        }

        self.connected.store(false, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Closed;
        debug!("Disconnected from OpenAI Realtime API");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn get_connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<RealtimeEvent>> {
        self.event_rx.take()
    }

    async fn send_audio(&mut self, payload: String) -> RealtimeResult<()> {
        if !self.is_ready() {
            return Err(RealtimeError::NotConnected);
        }
        self.send_event(ClientEvent::audio_append(payload))
    }

    async fn truncate_item(&mut self, item_id: &str, audio_end_ms: u64) -> RealtimeResult<()> {
        if !self.is_ready() {
            return Err(RealtimeError::NotConnected);
        }
        self.send_event(ClientEvent::truncate(item_id, audio_end_ms))
    }
}

impl Drop for OpenAIRealtime {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// =============================================================================
// Connection Task
// =============================================================================

/// Owns the socket for the lifetime of the connection.
struct ConnectionTask {
    sink: WsSink,
    source: WsSource,
    outbound: mpsc::Receiver<ClientEvent>,
    events: mpsc::Sender<RealtimeEvent>,
    session: SessionConfig,
    settle: Duration,
    wait_for_session_created: bool,
    connected: Arc<AtomicBool>,
    state: Arc<RwLock<ConnectionState>>,
    shutdown: CancellationToken,
}

impl ConnectionTask {
    async fn run(mut self) {
        let settle_timer = tokio::time::sleep(self.settle);
        tokio::pin!(settle_timer);
        let mut configured = false;

        let reason = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    if let Err(e) = self.sink.send(Message::Close(None)).await {
                        debug!("Failed to send close frame: {}", e);
                    }
                    break "closed locally".to_string();
                }

                _ = &mut settle_timer, if !configured => {
                    configured = true;
                    debug!("Settle delay elapsed, sending session configuration");
                    if let Err(e) = self.configure_session().await {
                        break e.to_string();
                    }
                }

                outbound = self.outbound.recv() => {
                    let Some(event) = outbound else {
                        break "outbound channel closed".to_string();
                    };
                    if let Err(e) = send_client_event(&mut self.sink, &event).await {
                        break e.to_string();
                    }
                }

                incoming = self.source.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            let Some(event) = parse_server_event(&text) else {
                                continue;
                            };

                            if !configured
                                && self.wait_for_session_created
                                && matches!(event, ServerEvent::SessionCreated { .. })
                            {
                                configured = true;
                                debug!("Provider session created, sending session configuration");
                                if let Err(e) = self.configure_session().await {
                                    break e.to_string();
                                }
                            }

                            if self.events.send(RealtimeEvent::Server(event)).await.is_err() {
                                break "event receiver dropped".to_string();
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = self.sink.send(Message::Pong(data)).await {
                                error!("Failed to send pong: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(?frame, "Realtime WebSocket closed by provider");
                            break "closed by provider".to_string();
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("Realtime WebSocket error: {}", e);
                            break format!("WebSocket error: {e}");
                        }
                        None => break "stream ended".to_string(),
                    }
                }
            }
        };

        self.connected.store(false, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Closed;
        info!(reason = %reason, "OpenAI Realtime connection task ended");

        // The receiver may already be gone if the bridge initiated the close
        let _ = self.events.send(RealtimeEvent::Closed { reason }).await;
    }

    async fn configure_session(&mut self) -> RealtimeResult<()> {
        let event = ClientEvent::SessionUpdate {
            session: self.session.clone(),
        };
        send_client_event(&mut self.sink, &event).await
    }
}

async fn send_client_event(sink: &mut WsSink, event: &ClientEvent) -> RealtimeResult<()> {
    let json = serde_json::to_string(event)
        .map_err(|e| RealtimeError::SerializationError(e.to_string()))?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| RealtimeError::WebSocketError(e.to_string()))
}

/// Parse a server frame, logging anything that is not handled by the bridge.
fn parse_server_event(text: &str) -> Option<ServerEvent> {
    match serde_json::from_str::<ServerEvent>(text) {
        Ok(ServerEvent::Other) => {
            match serde_json::from_str::<EventEnvelope>(text) {
                Ok(envelope) => debug!(event_type = %envelope.event_type, "Unhandled realtime event"),
                Err(_) => debug!("Unhandled realtime event"),
            }
            Some(ServerEvent::Other)
        }
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Failed to parse server event, dropping frame: {}", e);
            None
        }
    }
}
