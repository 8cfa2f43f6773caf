use serde::Deserialize;

/// One record of a result set: column name to arbitrary JSON value.
///
/// `serde_json` is built with `preserve_order`, so the key order of the
/// first row is the column order of the whole result set.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Typed stream events for one chat request.
///
/// One logical stream carries zero-or-one `Start`, any interleaving of
/// `Token`/`Sql`/`Data`/`Error`, and at most one `End`, which is terminal.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// The server has begun answering.
    Start,
    /// Incremental fragment of the natural-language answer.
    Token { text: String },
    /// The generated SQL query (last write wins).
    Sql { text: String },
    /// Query results (last write wins).
    Data { rows: Vec<Row> },
    /// An error message; does not terminate the stream by itself.
    Error { text: String },
    /// Terminal event; the stream is complete.
    End,
}

impl StreamEvent {
    /// Returns true for the terminal `End` event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }
}

/// A stream payload failed to decode into a `StreamEvent`.
///
/// Never escapes the transport: it is recovered there as a synthetic
/// `Error` event and the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to decode stream payload: {message}")]
pub struct DecodeFailure {
    pub message: String,
}

impl DecodeFailure {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Private wire shape; `content` varies by `type` and is validated per kind.
#[derive(Deserialize)]
struct WireFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: serde_json::Value,
}

/// Decodes one raw stream payload into a typed event.
///
/// Pure and deterministic: any parse failure, unknown `type`, or content
/// of the wrong shape yields `DecodeFailure` rather than panicking.
pub fn decode_event(payload: &str) -> Result<StreamEvent, DecodeFailure> {
    let frame: WireFrame = serde_json::from_str(payload)
        .map_err(|e| DecodeFailure::new(format!("invalid JSON payload: {e}")))?;

    match frame.kind.as_str() {
        "start" => Ok(StreamEvent::Start),
        "end" => Ok(StreamEvent::End),
        "token" => text_content(&frame, "token").map(|text| StreamEvent::Token { text }),
        "sql" => text_content(&frame, "sql").map(|text| StreamEvent::Sql { text }),
        "error" => text_content(&frame, "error").map(|text| StreamEvent::Error { text }),
        "data" => rows_content(frame.content).map(|rows| StreamEvent::Data { rows }),
        other => Err(DecodeFailure::new(format!("unknown event type `{other}`"))),
    }
}

fn text_content(frame: &WireFrame, kind: &str) -> Result<String, DecodeFailure> {
    match &frame.content {
        serde_json::Value::String(text) => Ok(text.clone()),
        other => Err(DecodeFailure::new(format!(
            "`{kind}` content must be a string, got {}",
            value_kind(other)
        ))),
    }
}

fn rows_content(content: serde_json::Value) -> Result<Vec<Row>, DecodeFailure> {
    let serde_json::Value::Array(items) = content else {
        return Err(DecodeFailure::new(format!(
            "`data` content must be an array, got {}",
            value_kind(&content)
        )));
    };
    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        match item {
            serde_json::Value::Object(row) => rows.push(row),
            other => {
                return Err(DecodeFailure::new(format!(
                    "`data` rows must be objects, got {}",
                    value_kind(&other)
                )));
            }
        }
    }
    Ok(rows)
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
