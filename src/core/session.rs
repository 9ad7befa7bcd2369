//! Per-call session state shared by both legs of a bridge.
//!
//! The session is owned by the bridge event loop and only mutated through the
//! methods below, so the "assistant is speaking" fields and the pending mark
//! queue always move together.

use std::collections::VecDeque;

use tracing::{debug, warn};

/// Name of the mark sent after every chunk of assistant audio.
pub const RESPONSE_MARK_NAME: &str = "responsePart";

/// Result of a barge-in: what to tell the speech-AI provider to discard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interruption {
    /// Assistant item being played when the caller started talking
    pub item_id: Option<String>,
    /// How much of that item the caller actually heard
    pub audio_end_ms: u64,
}

/// Mutable record for one call.
#[derive(Debug, Default)]
pub struct Session {
    stream_sid: Option<String>,
    latest_media_timestamp: u64,
    response_start_timestamp: Option<u64>,
    last_assistant_item: Option<String>,
    pending_marks: VecDeque<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Media stream identifier, unset until the telephony `start` event.
    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn latest_media_timestamp(&self) -> u64 {
        self.latest_media_timestamp
    }

    pub fn response_start_timestamp(&self) -> Option<u64> {
        self.response_start_timestamp
    }

    pub fn last_assistant_item(&self) -> Option<&str> {
        self.last_assistant_item.as_deref()
    }

    pub fn pending_marks(&self) -> &VecDeque<String> {
        &self.pending_marks
    }

    pub fn is_assistant_speaking(&self) -> bool {
        self.response_start_timestamp.is_some()
    }

    /// Handle the telephony `start` event.
    ///
    /// The stream identifier is write-once; timing state is reset on every start.
    pub fn start(&mut self, stream_sid: &str) {
        match self.stream_sid.as_deref() {
            None => self.stream_sid = Some(stream_sid.to_string()),
            Some(existing) if existing == stream_sid => {
                debug!(stream_sid, "Duplicate start event for stream");
            }
            Some(existing) => {
                warn!(
                    existing,
                    ignored = stream_sid,
                    "Stream identifier already set, ignoring new value"
                );
            }
        }

        self.latest_media_timestamp = 0;
        self.response_start_timestamp = None;
        self.last_assistant_item = None;
        self.pending_marks.clear();
    }

    /// Advance the session clock from an inbound media frame.
    ///
    /// The clock never moves backwards.
    pub fn record_media(&mut self, timestamp: u64) {
        if timestamp < self.latest_media_timestamp {
            debug!(
                timestamp,
                latest = self.latest_media_timestamp,
                "Out-of-order media timestamp"
            );
            return;
        }
        self.latest_media_timestamp = timestamp;
    }

    /// Pop the oldest pending mark. Unmatched acknowledgements are ignored.
    pub fn acknowledge_mark(&mut self) -> Option<String> {
        let mark = self.pending_marks.pop_front();
        if mark.is_none() {
            debug!("Mark acknowledgement with no pending marks");
        }
        mark
    }

    /// Record a chunk of assistant audio about to be played to the caller.
    ///
    /// Returns `true` when this chunk started a new assistant turn: either no
    /// turn was in flight, or the chunk belongs to a different item than the
    /// one being played. The caller is expected to send a mark named
    /// [`RESPONSE_MARK_NAME`] right after the audio.
    pub fn record_assistant_audio(&mut self, item_id: Option<&str>) -> bool {
        let new_item = matches!(
            (item_id, self.last_assistant_item.as_deref()),
            (Some(next), Some(current)) if next != current
        );
        let first = self.response_start_timestamp.is_none() || new_item;
        if first {
            self.response_start_timestamp = Some(self.latest_media_timestamp);
        }
        if let Some(item_id) = item_id {
            self.last_assistant_item = Some(item_id.to_string());
        }
        self.pending_marks.push_back(RESPONSE_MARK_NAME.to_string());
        first
    }

    /// Consume the in-flight assistant turn if the caller interrupted it.
    ///
    /// Returns `None` (and changes nothing) when no marks are pending or no
    /// assistant audio is in flight.
    pub fn take_interruption(&mut self) -> Option<Interruption> {
        if self.pending_marks.is_empty() {
            return None;
        }
        let start = self.response_start_timestamp?;

        let interruption = Interruption {
            item_id: self.last_assistant_item.take(),
            audio_end_ms: self.latest_media_timestamp.saturating_sub(start),
        };

        self.pending_marks.clear();
        self.response_start_timestamp = None;

        Some(interruption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_sets_stream_sid_once() {
        let mut session = Session::new();
        session.start("SS1");
        session.start("SS2");
        assert_eq!(session.stream_sid(), Some("SS1"));
    }

    #[test]
    fn test_start_resets_timing() {
        let mut session = Session::new();
        session.start("SS1");
        session.record_media(800);
        session.record_assistant_audio(Some("it1"));

        session.start("SS1");
        assert_eq!(session.latest_media_timestamp(), 0);
        assert_eq!(session.response_start_timestamp(), None);
        assert_eq!(session.last_assistant_item(), None);
    }

    #[test]
    fn test_media_timestamp_is_monotonic() {
        let mut session = Session::new();
        for ts in [20, 40, 40, 60, 30, 80] {
            session.record_media(ts);
        }
        assert_eq!(session.latest_media_timestamp(), 80);

        let mut session = Session::new();
        let mut last = 0;
        for ts in [0, 20, 20, 100, 120] {
            session.record_media(ts);
            assert!(session.latest_media_timestamp() >= last);
            assert_eq!(session.latest_media_timestamp(), ts);
            last = ts;
        }
    }

    #[test]
    fn test_first_delta_captures_response_start() {
        let mut session = Session::new();
        session.start("SS1");
        session.record_media(500);

        assert!(session.record_assistant_audio(Some("it1")));
        assert_eq!(session.response_start_timestamp(), Some(500));
        assert_eq!(session.last_assistant_item(), Some("it1"));
        assert_eq!(session.pending_marks().len(), 1);
        assert_eq!(session.pending_marks()[0], RESPONSE_MARK_NAME);

        session.record_media(700);
        assert!(!session.record_assistant_audio(Some("it1")));
        assert_eq!(session.response_start_timestamp(), Some(500));
        assert_eq!(session.pending_marks().len(), 2);
    }

    #[test]
    fn test_delta_without_item_keeps_previous_item() {
        let mut session = Session::new();
        session.record_assistant_audio(Some("it1"));
        session.record_assistant_audio(None);
        assert_eq!(session.last_assistant_item(), Some("it1"));
    }

    #[test]
    fn test_interruption_computes_elapsed_and_resets() {
        let mut session = Session::new();
        session.start("SS1");
        session.record_media(500);
        session.record_assistant_audio(Some("it1"));
        session.record_media(1200);

        let interruption = session.take_interruption().unwrap();
        assert_eq!(
            interruption,
            Interruption {
                item_id: Some("it1".to_string()),
                audio_end_ms: 700,
            }
        );
        assert!(session.pending_marks().is_empty());
        assert_eq!(session.last_assistant_item(), None);
        assert_eq!(session.response_start_timestamp(), None);
        assert!(!session.is_assistant_speaking());
    }

    #[test]
    fn test_interruption_noop_without_activity() {
        let mut session = Session::new();
        session.start("SS1");
        session.record_media(300);
        assert_eq!(session.take_interruption(), None);
        assert_eq!(session.take_interruption(), None);
        assert_eq!(session.latest_media_timestamp(), 300);
    }

    #[test]
    fn test_interruption_noop_when_marks_acknowledged() {
        let mut session = Session::new();
        session.record_media(100);
        session.record_assistant_audio(Some("it1"));
        session.acknowledge_mark();

        assert_eq!(session.take_interruption(), None);
        assert!(session.pending_marks().is_empty());
    }

    #[test]
    fn test_next_item_starts_new_turn() {
        let mut session = Session::new();
        session.start("SS1");
        session.record_media(500);
        assert!(session.record_assistant_audio(Some("it1")));
        session.record_media(1500);
        session.acknowledge_mark();
        assert_eq!(session.take_interruption(), None);

        session.record_media(5000);
        assert!(session.record_assistant_audio(Some("it2")));
        assert_eq!(session.response_start_timestamp(), Some(5000));
        assert_eq!(session.last_assistant_item(), Some("it2"));

        session.record_media(6000);
        assert_eq!(
            session.take_interruption(),
            Some(Interruption {
                item_id: Some("it2".to_string()),
                audio_end_ms: 1000,
            })
        );
    }

    #[test]
    fn test_delta_without_item_continues_turn() {
        let mut session = Session::new();
        session.record_media(200);
        session.record_assistant_audio(Some("it1"));
        session.record_media(400);
        assert!(!session.record_assistant_audio(None));
        assert_eq!(session.response_start_timestamp(), Some(200));
    }

    #[test]
    fn test_start_clears_pending_marks() {
        let mut session = Session::new();
        session.start("SS1");
        session.record_assistant_audio(Some("it1"));
        session.record_assistant_audio(Some("it1"));

        session.start("SS1");
        assert!(session.pending_marks().is_empty());
        assert_eq!(session.take_interruption(), None);
    }

    #[test]
    fn test_mark_ack_never_underflows() {
        let mut session = Session::new();
        session.record_assistant_audio(None);
        assert_eq!(
            session.acknowledge_mark().as_deref(),
            Some(RESPONSE_MARK_NAME)
        );
        assert!(session.pending_marks().is_empty());
        assert_eq!(session.acknowledge_mark(), None);
        assert!(session.pending_marks().is_empty());
    }
}
