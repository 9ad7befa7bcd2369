//! Shared application state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::info;

use crate::config::ServerConfig;
use crate::core::telephony::TwilioCallClient;

/// Maximum agent briefing size (100KB)
pub const MAX_INSTRUCTIONS_SIZE: usize = 100 * 1024;

/// Process-wide agent briefing.
///
/// Each media stream takes one [`snapshot`](Self::snapshot) when it starts and
/// keeps it for the whole call. [`replace`](Self::replace) therefore only affects
/// calls that start afterwards.
#[derive(Debug)]
pub struct AgentBriefing {
    current: ArcSwap<String>,
}

impl AgentBriefing {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial.into()),
        }
    }

    /// The briefing in effect right now.
    pub fn snapshot(&self) -> Arc<String> {
        self.current.load_full()
    }

    /// Install a new briefing for future calls.
    pub fn replace(&self, instructions: impl Into<String>) {
        let instructions = instructions.into();
        info!(bytes = instructions.len(), "Agent briefing replaced");
        self.current.store(Arc::new(instructions));
    }
}

/// Error returned when no media-stream slot is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    GlobalLimitReached,
}

/// A held media-stream slot. The slot is released when the last clone drops.
#[derive(Debug, Clone)]
pub struct StreamPermit {
    _inner: Arc<PermitInner>,
}

#[derive(Debug)]
struct PermitInner {
    counter: Arc<AtomicUsize>,
}

impl Drop for PermitInner {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Application state shared by every handler.
pub struct AppState {
    pub config: ServerConfig,
    pub briefing: AgentBriefing,
    /// Present only when Twilio credentials are configured
    pub twilio: Option<TwilioCallClient>,
    active_streams: Arc<AtomicUsize>,
}

impl AppState {
    pub async fn new(config: ServerConfig) -> Arc<Self> {
        let http = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client, using defaults: {}", e);
                reqwest::Client::new()
            });
        Self::with_http_client(config, http)
    }

    /// Build state around an existing HTTP client.
    pub fn with_http_client(config: ServerConfig, http: reqwest::Client) -> Arc<Self> {
        let twilio = config.twilio_client(http);
        if twilio.is_none() {
            info!("Twilio credentials not configured; outbound calls are disabled");
        }
        Arc::new(Self {
            briefing: AgentBriefing::new(config.agent_instructions.clone()),
            twilio,
            config,
            active_streams: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Number of media streams currently open.
    pub fn ws_connection_count(&self) -> usize {
        self.active_streams.load(Ordering::Acquire)
    }

    /// Reserve a media-stream slot, honouring `max_websocket_connections`.
    pub fn try_acquire_connection(&self) -> Result<StreamPermit, ConnectionLimitError> {
        let max = self.config.max_websocket_connections;
        self.active_streams
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| match max {
                Some(max) if current >= max => None,
                _ => Some(current + 1),
            })
            .map_err(|_| ConnectionLimitError::GlobalLimitReached)?;

        Ok(StreamPermit {
            _inner: Arc::new(PermitInner {
                counter: self.active_streams.clone(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_briefing_snapshot_is_stable() {
        let briefing = AgentBriefing::new("first");
        let snapshot = briefing.snapshot();

        briefing.replace("second");

        assert_eq!(snapshot.as_str(), "first");
        assert_eq!(briefing.snapshot().as_str(), "second");
    }

    #[tokio::test]
    async fn test_connection_permits() {
        let mut config = ServerConfig::default();
        config.max_websocket_connections = Some(2);
        let state = AppState::with_http_client(config, reqwest::Client::new());

        let first = state.try_acquire_connection().unwrap();
        let second = state.try_acquire_connection().unwrap();
        assert_eq!(state.ws_connection_count(), 2);
        assert_eq!(
            state.try_acquire_connection().unwrap_err(),
            ConnectionLimitError::GlobalLimitReached
        );

        let clone = first.clone();
        drop(first);
        assert_eq!(state.ws_connection_count(), 2);
        drop(clone);
        assert_eq!(state.ws_connection_count(), 1);

        drop(second);
        assert_eq!(state.ws_connection_count(), 0);
    }
}
