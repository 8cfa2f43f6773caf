/// Top-level error type for the public client API.
///
/// Failures that happen inside an established stream are not represented
/// here: they are recovered in-stream as synthetic `StreamEvent::Error`
/// events and land on `ChatMessage::error_text`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// A request was submitted while another one is still in flight.
    #[error("a request is already in flight")]
    Busy,
    /// A REST call failed: non-2xx status or a network-level failure.
    #[error("request failed{}: {message}", fmt_status(.status))]
    Request {
        status: Option<u16>,
        message: String,
    },
    /// A REST response did not match its documented shape.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Creates a request error from an optional HTTP status and a message.
    pub fn request(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Request {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {code})"),
        None => String::new(),
    }
}
