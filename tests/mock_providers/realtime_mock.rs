//! Scripted realtime WebSocket server
//!
//! Accepts a single connection, records the handshake and every client event,
//! and sends whatever the test scripts through [`MockRealtimeServer::send`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// What the client presented when it connected.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub uri: String,
    pub authorization: Option<String>,
    pub openai_beta: Option<String>,
}

enum MockAction {
    Send(Value),
    Close,
}

pub struct MockRealtimeServer {
    /// Endpoint without query string
    pub url: String,
    handshake: Arc<Mutex<Option<Handshake>>>,
    client_events: mpsc::UnboundedReceiver<Value>,
    script: mpsc::UnboundedSender<MockAction>,
}

impl MockRealtimeServer {
    /// Start a server that announces `session.created` as soon as a client connects.
    pub async fn start() -> Self {
        Self::start_with(true).await
    }

    /// Start a server that never announces `session.created`.
    pub async fn start_silent() -> Self {
        Self::start_with(false).await
    }

    async fn start_with(announce_session: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock realtime server");
        let addr = listener.local_addr().expect("mock server address");

        let handshake = Arc::new(Mutex::new(None));
        let (events_tx, client_events) = mpsc::unbounded_channel();
        let (script, mut script_rx) = mpsc::unbounded_channel();

        let recorded = handshake.clone();
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };

            let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let header = |name: &str| {
                    req.headers()
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                };
                *recorded.lock() = Some(Handshake {
                    uri: req.uri().to_string(),
                    authorization: header("authorization"),
                    openai_beta: header("openai-beta"),
                });
                Ok(resp)
            };

            let Ok(ws_stream) = accept_hdr_async(stream, callback).await else {
                return;
            };
            let (mut write, mut read) = ws_stream.split();

            if announce_session {
                let created = json!({
                    "type": "session.created",
                    "session": {"id": "sess_mock", "model": "gpt-4o-realtime-preview"}
                });
                if write
                    .send(Message::Text(created.to_string().into()))
                    .await
                    .is_err()
                {
                    return;
                }
            }

            loop {
                tokio::select! {
                    action = script_rx.recv() => match action {
                        Some(MockAction::Send(value)) => {
                            if write.send(Message::Text(value.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        Some(MockAction::Close) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    incoming = read.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                                let _ = events_tx.send(value);
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                }
            }
        });

        Self {
            url: format!("ws://{addr}/v1/realtime"),
            handshake,
            client_events,
            script,
        }
    }

    pub fn handshake(&self) -> Option<Handshake> {
        self.handshake.lock().clone()
    }

    /// Push a server event to the client.
    pub fn send(&self, event: Value) {
        let _ = self.script.send(MockAction::Send(event));
    }

    /// Close the connection from the server side.
    pub fn close(&self) {
        let _ = self.script.send(MockAction::Close);
    }

    /// Next client event, panicking if none arrives in time.
    pub async fn next_event(&mut self) -> Value {
        tokio::time::timeout(RECV_TIMEOUT, self.client_events.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("mock server stopped")
    }

    /// Next client event of the given type, skipping others.
    pub async fn next_event_of_type(&mut self, event_type: &str) -> Value {
        loop {
            let event = self.next_event().await;
            if event["type"] == event_type {
                return event;
            }
        }
    }

    /// Whether any client event arrives within `wait`.
    pub async fn has_event_within(&mut self, wait: Duration) -> bool {
        matches!(
            tokio::time::timeout(wait, self.client_events.recv()).await,
            Ok(Some(_))
        )
    }
}
