//! Streaming client for a conversational-SQL backend.
//!
//! A question goes up as one streaming request; answer tokens, the
//! generated SQL, and result rows come back as typed events that are
//! folded into a single `ChatMessage`. Presentation state for result sets
//! lives in `ResultsView`, independent of how the rows were obtained.
//!
//! # Streaming usage
//!
//! ```no_run
//! use askdb_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let session = ChatSession::new(ClientConfig::from_env())?;
//!
//! let mut stream = session.submit("How many customers are there?")?;
//! while let Some(event) = stream.next_event().await {
//!     if let StreamEvent::Token { text } = event {
//!         print!("{text}");
//!     }
//! }
//! let message = stream.finish().await;
//! println!("\nsql: {:?}", message.sql);
//! # Ok(())
//! # }
//! ```

/// REST surface of the backend and its reply types.
pub mod client;
/// Client configuration.
pub mod config;
/// Public error types used by the client API.
pub mod error;
/// Typed stream events and the payload decoder.
pub mod event;
/// Periodic backend reachability probe.
pub mod health;
/// Message draft and the event-folding assembler.
pub mod message;
/// Common imports for typical usage.
pub mod prelude;
/// Presentation state for accumulated result sets.
pub mod results;
/// Chat session with the one-active-stream guard.
pub mod session;
/// SSE frame splitting.
pub mod sse;
/// Streaming connection lifecycle and the connector seam.
pub mod transport;

pub use client::{ChatReply, Client, ColumnInfo, SampleReply, SqlReply, TableDetail};
pub use config::ClientConfig;
pub use error::ClientError;
pub use event::{DecodeFailure, Row, StreamEvent, decode_event};
pub use health::{HealthPoller, HealthProbe, HealthStatus};
pub use message::{ChatMessage, MessageAssembler, MessageStatus};
pub use results::{ResultSet, ResultsView, ViewMode, format_cell};
pub use session::{ChatSession, ChatStream};
pub use transport::{
    CONNECTION_LOST_TEXT, CancelHandle, CloseReason, ConnectionState, HttpConnector,
    PARSE_ERROR_TEXT, StreamConnector, StreamTransport, TransportFailure, TransportHandle,
};
