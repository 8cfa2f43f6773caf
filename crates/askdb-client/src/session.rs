use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::event::StreamEvent;
use crate::message::{ChatMessage, MessageAssembler, MessageStatus};
use crate::transport::{
    CancelHandle, ConnectionState, HttpConnector, StreamConnector, StreamTransport,
    TransportHandle,
};

/// Owns the one-active-stream invariant for a chat session.
///
/// At most one request (streamed or one-shot) is in flight at a time; a
/// second submission while one is live returns `ClientError::Busy` without
/// opening a connection or touching the current draft. The flag is
/// released exactly when the connection closes, whatever the reason, so a
/// failed request never leaves the session blocked.
pub struct ChatSession {
    connector: Arc<dyn StreamConnector>,
    client: Client,
    config: ClientConfig,
    in_flight: Arc<AtomicBool>,
}

impl ChatSession {
    /// Creates a session talking to the configured backend.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let connector = Arc::new(HttpConnector::new(config.clone())?);
        Self::with_connector(connector, config)
    }

    /// Creates a session with a custom stream connector (used by tests).
    pub fn with_connector(
        connector: Arc<dyn StreamConnector>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let client = Client::new(config.clone())?;
        Ok(Self {
            connector,
            client,
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The REST client this session uses for non-streaming calls.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Whether a request is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Submits a question as a streaming request.
    pub fn submit(&self, question: impl Into<String>) -> Result<ChatStream, ClientError> {
        let guard = self.acquire()?;
        let handle = StreamTransport::open_with_guard(
            self.connector.clone(),
            &self.config,
            question,
            guard,
        );
        debug!(request_id = %handle.request_id(), "chat stream submitted");
        Ok(ChatStream {
            assembler: MessageAssembler::new(),
            handle,
        })
    }

    /// Non-streaming fallback: one POST, one assembled message.
    ///
    /// Guarded by the same in-flight flag as `submit`; the flag is
    /// released on success and on request failure alike.
    pub async fn ask(&self, question: impl Into<String>) -> Result<ChatMessage, ClientError> {
        let _guard = self.acquire()?;
        let reply = self.client.chat(&question.into()).await?;
        Ok(ChatMessage {
            content: reply.answer,
            sql: reply.sql,
            rows: reply.data,
            error_text: reply.error,
            status: MessageStatus::Ended,
        })
    }

    fn acquire(&self) -> Result<InFlightGuard, ClientError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ClientError::Busy);
        }
        Ok(InFlightGuard {
            flag: self.in_flight.clone(),
        })
    }
}

/// Clears the in-flight flag when dropped.
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// One live streaming request: the event receiver paired with the
/// assembler folding its events.
pub struct ChatStream {
    assembler: MessageAssembler,
    handle: TransportHandle,
}

impl ChatStream {
    /// Returns the request id (for log correlation).
    pub fn request_id(&self) -> uuid::Uuid {
        self.handle.request_id()
    }

    /// Waits for the next event, applies it to the draft, and returns it.
    ///
    /// Returns `None` once the connection has closed and all buffered
    /// events were consumed.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        let event = self.handle.next_event().await?;
        self.assembler.apply(&event);
        Some(event)
    }

    /// The live draft message.
    pub fn message(&self) -> &ChatMessage {
        self.assembler.message()
    }

    /// Drains remaining events and returns the final message.
    ///
    /// Safe to call after consuming events manually with `next_event()`.
    pub async fn finish(mut self) -> ChatMessage {
        while self.next_event().await.is_some() {}
        self.assembler.into_message()
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// Watch receiver for observing connection state transitions.
    pub fn state_receiver(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.handle.state_receiver()
    }

    /// Handle that cancels the underlying connection.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.cancel_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Row;
    use crate::transport::testing::{FakeBehavior, FakeConnector, frame};
    use crate::transport::{CloseReason, TransportFailure};
    use std::sync::atomic::AtomicUsize;

    fn session_with(behavior: FakeBehavior) -> (ChatSession, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let connector = Arc::new(FakeConnector {
            calls: calls.clone(),
            behavior,
        });
        let session =
            ChatSession::with_connector(connector, ClientConfig::default()).expect("session");
        (session, calls)
    }

    /// Waits until the spawned transport task has made its connect
    /// attempt, so connector call counts are observable.
    async fn wait_connected(stream: &ChatStream) {
        let mut state = stream.state_receiver();
        state
            .wait_for(|s| !matches!(s, ConnectionState::Idle | ConnectionState::Connecting))
            .await
            .expect("state channel");
    }

    async fn wait_closed(stream: &ChatStream) -> CloseReason {
        let mut state = stream.state_receiver();
        let closed = state
            .wait_for(|s| matches!(s, ConnectionState::Closed(_)))
            .await
            .expect("state channel");
        match *closed {
            ConnectionState::Closed(reason) => reason,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn second_submit_while_streaming_is_busy_and_opens_nothing() {
        let (session, calls) = session_with(FakeBehavior::Pending);
        let stream = session.submit("first").expect("first submit");
        wait_connected(&stream).await;

        assert!(matches!(session.submit("second"), Err(ClientError::Busy)));
        assert!(matches!(
            session.ask("second").await,
            Err(ClientError::Busy)
        ));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(stream.message().content, "");

        stream.cancel_handle().cancel();
        assert_eq!(wait_closed(&stream).await, CloseReason::Cancelled);
        assert!(!session.is_busy());

        // Released flag admits the next request.
        let second = session.submit("third").expect("submit after cancel");
        wait_connected(&second).await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropping_a_stalled_stream_releases_the_flag() {
        let (session, calls) = session_with(FakeBehavior::Pending);
        let stream = session.submit("first").expect("submit");

        let mut state = stream.state_receiver();
        // Wait for `Open` before dropping so the first connect is
        // guaranteed to have happened.
        state
            .wait_for(|s| matches!(s, ConnectionState::Open))
            .await
            .expect("state channel");
        drop(stream);
        let closed = state
            .wait_for(|s| matches!(s, ConnectionState::Closed(_)))
            .await
            .expect("state channel");
        assert_eq!(*closed, ConnectionState::Closed(CloseReason::Cancelled));
        assert!(!session.is_busy());

        let second = session.submit("second").expect("submit after drop");
        wait_connected(&second).await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn full_stream_assembles_message_and_completes() {
        let (session, _calls) = session_with(FakeBehavior::Chunks(vec![
            frame(r#"{"type":"start"}"#),
            frame(r#"{"type":"token","content":"SELECT"}"#),
            frame(r#"{"type":"token","content":" * FROM t"}"#),
            frame(r#"{"type":"sql","content":"SELECT * FROM t"}"#),
            frame(r#"{"type":"data","content":[{"a":1}]}"#),
            frame(r#"{"type":"end"}"#),
        ]));
        let stream = session.submit("show t").expect("submit");
        let mut state = stream.state_receiver();
        let message = stream.finish().await;

        assert_eq!(message.content, "SELECT * FROM t");
        assert_eq!(message.sql.as_deref(), Some("SELECT * FROM t"));
        let expected: Row = serde_json::from_str(r#"{"a":1}"#).expect("row");
        assert_eq!(message.rows, Some(vec![expected]));
        assert_eq!(message.status, MessageStatus::Ended);

        let closed = state
            .wait_for(|s| matches!(s, ConnectionState::Closed(_)))
            .await
            .expect("state channel");
        assert_eq!(*closed, ConnectionState::Closed(CloseReason::Completed));
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn error_only_stream_ends_with_error_text() {
        let (session, _calls) = session_with(FakeBehavior::Chunks(vec![
            frame(r#"{"type":"start"}"#),
            frame(r#"{"type":"error","content":"LLM unavailable"}"#),
            frame(r#"{"type":"end"}"#),
        ]));
        let message = session.submit("q").expect("submit").finish().await;

        assert_eq!(message.error_text.as_deref(), Some("LLM unavailable"));
        assert_eq!(message.display_text(), "LLM unavailable");
        assert_eq!(message.sql, None);
        assert_eq!(message.rows, None);
        assert_eq!(message.status, MessageStatus::Ended);
    }

    #[tokio::test]
    async fn failed_stream_releases_the_flag_for_the_next_request() {
        let (session, calls) = session_with(FakeBehavior::Chunks(vec![
            frame(r#"{"type":"start"}"#),
            Err(TransportFailure::Read("reset".into())),
        ]));
        let stream = session.submit("q").expect("submit");
        let message = stream.finish().await;

        assert_eq!(message.error_text.as_deref(), Some("Connection lost"));
        assert!(!session.is_busy());
        let retry = session.submit("again").expect("submit after failure");
        wait_connected(&retry).await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn draft_is_readable_while_streaming() {
        let (session, _calls) = session_with(FakeBehavior::Chunks(vec![
            frame(r#"{"type":"start"}"#),
            frame(r#"{"type":"token","content":"hi"}"#),
            frame(r#"{"type":"end"}"#),
        ]));
        let mut stream = session.submit("q").expect("submit");

        assert_eq!(stream.next_event().await, Some(StreamEvent::Start));
        assert_eq!(stream.message().status, MessageStatus::Streaming);
        assert_eq!(
            stream.next_event().await,
            Some(StreamEvent::Token { text: "hi".into() })
        );
        assert_eq!(stream.message().content, "hi");
        let message = stream.finish().await;
        assert!(message.is_ended());
    }
}
