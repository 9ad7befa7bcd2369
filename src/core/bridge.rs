//! Bridge orchestrator for one phone call.
//!
//! A [`CallBridge`] owns the [`Session`] and both legs of a call. Its `run` loop
//! is the only place the session is mutated: inbound telephony frames and
//! speech-AI events are handled one at a time on the same task, so the pending
//! mark queue and the in-flight assistant item can never be updated concurrently.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting --start--> Active --either leg closes--> Closing --other leg closed--> Closed
//! ```
//!
//! Closing either leg always closes the other one. There are no retries.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::realtime::{BoxedRealtime, RealtimeEvent, ServerEvent};
use crate::core::session::{RESPONSE_MARK_NAME, Session};
use crate::core::telephony::{
    TelephonyLegEvent, TelephonyRoute, TwilioInbound, TwilioOutbound, parse_inbound,
};

/// Lifecycle of a bridged call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Telephony socket accepted, no `start` yet
    Connecting,
    /// Stream started, both legs exchanging events
    Active,
    /// One leg closed, the other is being closed
    Closing,
    /// Both legs closed
    Closed,
}

/// Which side of the bridge ended the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegSide {
    Telephony,
    Realtime,
}

impl std::fmt::Display for LegSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LegSide::Telephony => f.write_str("telephony"),
            LegSide::Realtime => f.write_str("realtime"),
        }
    }
}

/// Summary of a finished call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOutcome {
    pub call_id: String,
    pub stream_sid: Option<String>,
    pub closed_by: LegSide,
    pub media_frames_in: u64,
    pub audio_deltas_out: u64,
    pub interruptions: u64,
}

/// Per-call orchestrator.
pub struct CallBridge {
    call_id: String,
    session: Session,
    state: BridgeState,
    realtime: BoxedRealtime,
    telephony_tx: mpsc::Sender<TelephonyRoute>,
    telephony_open: bool,
    media_frames_in: u64,
    audio_deltas_out: u64,
    interruptions: u64,
}

impl CallBridge {
    /// Create a bridge around a speech-AI leg that has already been asked to connect.
    pub fn new(
        call_id: impl Into<String>,
        realtime: BoxedRealtime,
        telephony_tx: mpsc::Sender<TelephonyRoute>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            session: Session::new(),
            state: BridgeState::Connecting,
            realtime,
            telephony_tx,
            telephony_open: true,
            media_frames_in: 0,
            audio_deltas_out: 0,
            interruptions: 0,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Drive the call until either leg closes, then close the other one.
    pub async fn run(mut self, mut telephony_rx: mpsc::Receiver<TelephonyLegEvent>) -> BridgeOutcome {
        let Some(mut realtime_rx) = self.realtime.take_event_receiver() else {
            warn!(call_id = %self.call_id, "Realtime leg has no event stream, closing call");
            self.shutdown(LegSide::Realtime).await;
            return self.outcome(LegSide::Realtime);
        };

        let closed_by = loop {
            tokio::select! {
                frame = telephony_rx.recv() => match frame {
                    Some(TelephonyLegEvent::Text(text)) => self.handle_telephony_text(&text).await,
                    Some(TelephonyLegEvent::Closed) | None => {
                        info!(call_id = %self.call_id, "Telephony leg closed");
                        break LegSide::Telephony;
                    }
                },
                event = realtime_rx.recv() => match event {
                    Some(RealtimeEvent::Server(event)) => self.handle_realtime_event(event).await,
                    Some(RealtimeEvent::Closed { reason }) => {
                        info!(call_id = %self.call_id, reason = %reason, "Realtime leg closed");
                        break LegSide::Realtime;
                    }
                    None => {
                        info!(call_id = %self.call_id, "Realtime event stream ended");
                        break LegSide::Realtime;
                    }
                },
            }
        };

        self.shutdown(closed_by).await;
        let outcome = self.outcome(closed_by);
        info!(
            call_id = %outcome.call_id,
            stream_sid = ?outcome.stream_sid,
            closed_by = %outcome.closed_by,
            media_frames_in = outcome.media_frames_in,
            audio_deltas_out = outcome.audio_deltas_out,
            interruptions = outcome.interruptions,
            "Call bridge finished"
        );
        outcome
    }

    /// Decode and handle one telephony text frame. Malformed frames are dropped.
    pub async fn handle_telephony_text(&mut self, text: &str) {
        match parse_inbound(text) {
            Ok(event) => self.handle_telephony_event(event).await,
            Err(e) => warn!(call_id = %self.call_id, "Dropping telephony frame: {}", e),
        }
    }

    pub async fn handle_telephony_event(&mut self, event: TwilioInbound) {
        match event {
            TwilioInbound::Start { start, .. } => {
                info!(
                    call_id = %self.call_id,
                    stream_sid = %start.stream_sid,
                    call_sid = ?start.call_sid,
                    "Incoming stream has started"
                );
                self.session.start(&start.stream_sid);
                if self.state == BridgeState::Connecting {
                    self.state = BridgeState::Active;
                }
            }
            TwilioInbound::Media { media } => {
                self.media_frames_in += 1;
                self.session.record_media(media.timestamp);

                if !self.realtime.is_ready() {
                    debug!(call_id = %self.call_id, "Realtime leg not ready, dropping caller audio");
                    return;
                }
                if let Err(e) = self.realtime.send_audio(media.payload).await {
                    debug!(call_id = %self.call_id, "Caller audio dropped: {}", e);
                }
            }
            TwilioInbound::Mark { .. } => {
                self.session.acknowledge_mark();
            }
            TwilioInbound::Connected { .. } | TwilioInbound::Stop { .. } | TwilioInbound::Unknown => {
                debug!(
                    call_id = %self.call_id,
                    event = event.event_name(),
                    "Received non-media telephony event"
                );
            }
        }
    }

    pub async fn handle_realtime_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::AudioDelta { delta, item_id, .. } => {
                if delta.is_empty() {
                    debug!(call_id = %self.call_id, item_id = ?item_id, "Skipping empty audio delta");
                    return;
                }
                self.forward_assistant_audio(delta, item_id.as_deref()).await;
            }
            ServerEvent::SpeechStarted { .. } => {
                debug!(call_id = %self.call_id, "Caller speech started");
                self.barge_in().await;
            }
            ServerEvent::Error { error } => {
                warn!(
                    call_id = %self.call_id,
                    error_type = %error.error_type,
                    code = ?error.code,
                    "Realtime provider error: {}",
                    error.message
                );
            }
            ServerEvent::SessionCreated { session } | ServerEvent::SessionUpdated { session } => {
                info!(
                    call_id = %self.call_id,
                    session_id = ?session.id,
                    model = ?session.model,
                    "Realtime session event"
                );
            }
            other => {
                debug!(call_id = %self.call_id, event_type = other.event_type(), "Realtime event");
            }
        }
    }

    /// Relay one assistant audio chunk followed by a playback mark.
    async fn forward_assistant_audio(&mut self, payload: String, item_id: Option<&str>) {
        let Some(stream_sid) = self.session.stream_sid().map(str::to_string) else {
            debug!(call_id = %self.call_id, "No stream yet, dropping assistant audio");
            return;
        };

        if !self
            .send_telephony(TwilioOutbound::media(&stream_sid, payload))
            .await
        {
            return;
        }

        if self.session.record_assistant_audio(item_id) {
            debug!(
                call_id = %self.call_id,
                response_start_ms = ?self.session.response_start_timestamp(),
                "Assistant turn started"
            );
        }
        self.audio_deltas_out += 1;

        self.send_telephony(TwilioOutbound::mark(&stream_sid, RESPONSE_MARK_NAME))
            .await;
    }

    /// Cut off assistant speech because the caller started talking.
    ///
    /// Returns `false` without side effects when no assistant audio is in flight.
    pub async fn barge_in(&mut self) -> bool {
        let latest = self.session.latest_media_timestamp();
        let start = self.session.response_start_timestamp();
        let Some(interruption) = self.session.take_interruption() else {
            return false;
        };

        debug!(
            call_id = %self.call_id,
            latest_media_ms = latest,
            response_start_ms = ?start,
            elapsed_ms = interruption.audio_end_ms,
            "Caller interrupted assistant"
        );

        if let Some(item_id) = interruption.item_id.as_deref()
            && let Err(e) = self
                .realtime
                .truncate_item(item_id, interruption.audio_end_ms)
                .await
        {
            warn!(call_id = %self.call_id, item_id, "Failed to truncate assistant item: {}", e);
        }

        if let Some(stream_sid) = self.session.stream_sid().map(str::to_string) {
            self.send_telephony(TwilioOutbound::clear(&stream_sid)).await;
        }

        self.interruptions += 1;
        true
    }

    /// Send a frame to the telephony writer. Returns `false` if the leg is closed.
    async fn send_telephony(&mut self, frame: TwilioOutbound) -> bool {
        if !self.telephony_open {
            return false;
        }
        if self
            .telephony_tx
            .send(TelephonyRoute::Frame(frame))
            .await
            .is_err()
        {
            debug!(call_id = %self.call_id, "Telephony writer gone, dropping frame");
            self.telephony_open = false;
            return false;
        }
        true
    }

    async fn shutdown(&mut self, closed_by: LegSide) {
        self.state = BridgeState::Closing;
        debug!(call_id = %self.call_id, closed_by = %closed_by, "Closing call bridge");

        match closed_by {
            LegSide::Telephony => {
                self.telephony_open = false;
            }
            LegSide::Realtime => {
                if self.telephony_open {
                    let _ = self.telephony_tx.send(TelephonyRoute::Close).await;
                    self.telephony_open = false;
                }
            }
        }

        if let Err(e) = self.realtime.disconnect().await {
            warn!(call_id = %self.call_id, "Failed to disconnect realtime leg: {}", e);
        }

        self.state = BridgeState::Closed;
    }

    fn outcome(&self, closed_by: LegSide) -> BridgeOutcome {
        BridgeOutcome {
            call_id: self.call_id.clone(),
            stream_sid: self.session.stream_sid().map(str::to_string),
            closed_by,
            media_frames_in: self.media_frames_in,
            audio_deltas_out: self.audio_deltas_out,
            interruptions: self.interruptions,
        }
    }
}
