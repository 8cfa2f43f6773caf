use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::event::{StreamEvent, decode_event};
use crate::sse::SseDecoder;

/// Synthetic error text forwarded when a stream payload fails to decode.
pub const PARSE_ERROR_TEXT: &str = "Failed to parse response";
/// Synthetic error text forwarded when the underlying channel fails.
pub const CONNECTION_LOST_TEXT: &str = "Connection lost";

/// Lifecycle of one streaming connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed(CloseReason),
}

/// Why a connection closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The server sent `End`.
    Completed,
    /// The channel failed: connect error, read error, or EOF without `End`.
    Failed,
    /// The caller cancelled, or the consumer dropped the event receiver.
    Cancelled,
}

/// Failure on the raw byte channel, before event decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportFailure {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("stream read failed: {0}")]
    Read(String),
}

pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportFailure>> + Send + 'static>>;

/// Seam between the transport and the wire.
///
/// The production implementation is `HttpConnector`; tests inject
/// fabricated byte streams.
#[async_trait::async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, question: &str) -> Result<ByteStream, TransportFailure>;
}

/// `StreamConnector` over `GET {base}/chat/stream?message=…`.
pub struct HttpConnector {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpConnector {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl StreamConnector for HttpConnector {
    async fn connect(&self, question: &str) -> Result<ByteStream, TransportFailure> {
        let response = self
            .client
            .get(self.config.route("/chat/stream"))
            .query(&[("message", question)])
            .send()
            .await
            .map_err(|e| TransportFailure::Connect(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportFailure::Connect(format!(
                "stream request failed with status {status}"
            )));
        }
        Ok(Box::pin(response.bytes_stream().map(|item| {
            item.map_err(|e| TransportFailure::Read(e.to_string()))
        })))
    }
}

/// Requests cancellation of a streaming connection.
///
/// Idempotent: repeated calls after the connection closed are no-ops.
#[derive(Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Handle to one live streaming connection.
///
/// Events arrive strictly in server-send order; the connection state is
/// observable through a watch channel.
pub struct TransportHandle {
    request_id: uuid::Uuid,
    events: mpsc::Receiver<StreamEvent>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancelHandle,
}

impl TransportHandle {
    /// Returns the id assigned to this request (for log correlation).
    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }

    /// Waits for and returns the next decoded event.
    ///
    /// Returns `None` once the connection has closed and all buffered
    /// events were consumed.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns a watch receiver for observing state transitions.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Returns a handle that can cancel the connection.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

/// Owns the lifecycle of a single streaming connection.
pub struct StreamTransport;

impl StreamTransport {
    /// Opens a streaming connection for one question.
    ///
    /// Spawns the connection task and returns immediately; connection
    /// progress is visible through the handle's state channel.
    pub fn open(
        connector: Arc<dyn StreamConnector>,
        config: &ClientConfig,
        question: impl Into<String>,
    ) -> TransportHandle {
        Self::open_with_guard(connector, config, question, ())
    }

    /// Like `open`, but carries a value that is dropped exactly when the
    /// connection closes, whatever the reason. The session threads its
    /// in-flight release through here.
    pub(crate) fn open_with_guard<G: Send + 'static>(
        connector: Arc<dyn StreamConnector>,
        config: &ClientConfig,
        question: impl Into<String>,
        guard: G,
    ) -> TransportHandle {
        let request_id = uuid::Uuid::new_v4();
        let (event_tx, event_rx) = mpsc::channel(config.stream_buffer_capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        tokio::spawn(transport_task(
            connector,
            question.into(),
            request_id,
            event_tx,
            state_tx,
            cancel_rx,
            guard,
        ));

        TransportHandle {
            request_id,
            events: event_rx,
            state: state_rx,
            cancel: CancelHandle { tx: cancel_tx },
        }
    }
}

async fn transport_task<G: Send + 'static>(
    connector: Arc<dyn StreamConnector>,
    question: String,
    request_id: uuid::Uuid,
    tx: mpsc::Sender<StreamEvent>,
    state_tx: watch::Sender<ConnectionState>,
    mut cancel_rx: watch::Receiver<bool>,
    guard: G,
) {
    let mut guard = Some(guard);
    let close = |guard: &mut Option<G>, reason: CloseReason| {
        // Release the in-flight guard before the close becomes observable.
        guard.take();
        let _ = state_tx.send(ConnectionState::Closed(reason));
        debug!(request_id = %request_id, ?reason, "stream connection closed");
    };

    let _ = state_tx.send(ConnectionState::Connecting);
    debug!(request_id = %request_id, "opening stream connection");

    let connected = tokio::select! {
        _ = cancel_requested(&mut cancel_rx) => {
            close(&mut guard, CloseReason::Cancelled);
            return;
        }
        // Consumer dropped the event receiver; treat as cancellation.
        _ = tx.closed() => {
            close(&mut guard, CloseReason::Cancelled);
            return;
        }
        connected = connector.connect(&question) => connected,
    };
    let mut bytes = match connected {
        Ok(stream) => stream,
        Err(err) => {
            warn!(request_id = %request_id, error = %err, "stream connect failed");
            let _ = forward(&tx, connection_lost()).await;
            close(&mut guard, CloseReason::Failed);
            return;
        }
    };
    let _ = state_tx.send(ConnectionState::Open);

    let mut decoder = SseDecoder::default();
    loop {
        tokio::select! {
            _ = cancel_requested(&mut cancel_rx) => {
                close(&mut guard, CloseReason::Cancelled);
                return;
            }
            // Without this branch a stalled byte stream would keep the
            // task (and the in-flight guard) alive after the consumer
            // dropped the receiver.
            _ = tx.closed() => {
                close(&mut guard, CloseReason::Cancelled);
                return;
            }
            next = bytes.next() => match next {
                Some(Ok(chunk)) => {
                    for payload in decoder.push_chunk(&chunk) {
                        let event = match decode_event(&payload) {
                            Ok(event) => event,
                            Err(err) => {
                                // Recovered locally: the stream stays open.
                                debug!(request_id = %request_id, error = %err, "undecodable stream payload");
                                StreamEvent::Error {
                                    text: PARSE_ERROR_TEXT.to_string(),
                                }
                            }
                        };
                        let terminal = event.is_terminal();
                        if !forward(&tx, event).await {
                            // Consumer walked away; treat as cancellation.
                            close(&mut guard, CloseReason::Cancelled);
                            return;
                        }
                        if terminal {
                            close(&mut guard, CloseReason::Completed);
                            return;
                        }
                    }
                }
                Some(Err(err)) => {
                    warn!(request_id = %request_id, error = %err, "stream read failed");
                    let _ = forward(&tx, connection_lost()).await;
                    close(&mut guard, CloseReason::Failed);
                    return;
                }
                // EOF without `End`: the server abandoned the stream.
                None => {
                    warn!(request_id = %request_id, "stream ended without end event");
                    let _ = forward(&tx, connection_lost()).await;
                    close(&mut guard, CloseReason::Failed);
                    return;
                }
            }
        }
    }
}

fn connection_lost() -> StreamEvent {
    StreamEvent::Error {
        text: CONNECTION_LOST_TEXT.to_string(),
    }
}

async fn forward(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    tx.send(event).await.is_ok()
}

/// Resolves once cancellation is requested; never resolves if every
/// cancel handle was dropped without firing.
async fn cancel_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}
