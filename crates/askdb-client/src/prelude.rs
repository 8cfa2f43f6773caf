//! Common imports for typical client usage.
//!
//! This module intentionally exports the most frequently used session and
//! view types so examples and application code need fewer import lines.
pub use crate::{
    ChatMessage, ChatSession, ChatStream, Client, ClientConfig, ClientError, CloseReason,
    ConnectionState, HealthPoller, HealthStatus, MessageStatus, ResultsView, Row, StreamEvent,
    ViewMode,
};
