use crate::event::{Row, StreamEvent};

/// Lifecycle of one chat message draft.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Streaming,
    Ended,
}

/// One assembled answer: text, generated SQL, and result rows.
///
/// Mutable only through `MessageAssembler` while streaming; immutable the
/// instant `status` reaches `Ended`.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ChatMessage {
    /// Append-only concatenation of `Token` fragments, in arrival order.
    pub content: String,
    /// Generated SQL; last write wins.
    pub sql: Option<String>,
    /// Result rows; last write wins.
    pub rows: Option<Vec<Row>>,
    /// Most recent error text. When set it replaces `content` for display
    /// but leaves `sql` and `rows` intact.
    pub error_text: Option<String>,
    pub status: MessageStatus,
}

impl ChatMessage {
    pub(crate) fn new() -> Self {
        Self {
            content: String::new(),
            sql: None,
            rows: None,
            error_text: None,
            status: MessageStatus::Pending,
        }
    }

    /// The text to present: `error_text` when set, `content` otherwise.
    pub fn display_text(&self) -> &str {
        self.error_text.as_deref().unwrap_or(&self.content)
    }

    pub fn is_ended(&self) -> bool {
        self.status == MessageStatus::Ended
    }
}

/// Folds the ordered event sequence of one request into a `ChatMessage`.
#[derive(Debug)]
pub struct MessageAssembler {
    message: ChatMessage,
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self {
            message: ChatMessage::new(),
        }
    }

    /// Applies one event to the draft, in arrival order.
    ///
    /// Returns `false` without touching the draft once the message has
    /// ended; late deliveries after `End` are rejected. `Start` is
    /// advisory: events arriving before it are still applied.
    pub fn apply(&mut self, event: &StreamEvent) -> bool {
        if self.message.status == MessageStatus::Ended {
            return false;
        }
        match event {
            StreamEvent::Start => {
                if self.message.status == MessageStatus::Pending {
                    self.message.status = MessageStatus::Streaming;
                }
            }
            StreamEvent::Token { text } => self.message.content.push_str(text),
            StreamEvent::Sql { text } => self.message.sql = Some(text.clone()),
            StreamEvent::Data { rows } => self.message.rows = Some(rows.clone()),
            StreamEvent::Error { text } => self.message.error_text = Some(text.clone()),
            StreamEvent::End => self.message.status = MessageStatus::Ended,
        }
        true
    }

    /// The live draft.
    pub fn message(&self) -> &ChatMessage {
        &self.message
    }

    /// Consumes the assembler, yielding the message as assembled so far.
    pub fn into_message(self) -> ChatMessage {
        self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_all(events: &[StreamEvent]) -> ChatMessage {
        let mut assembler = MessageAssembler::new();
        for event in events {
            assembler.apply(event);
        }
        assembler.into_message()
    }

    #[test]
    fn content_is_ordered_token_concatenation() {
        let message = apply_all(&[
            StreamEvent::Start,
            StreamEvent::Token { text: "one ".into() },
            StreamEvent::Token { text: "two ".into() },
            StreamEvent::Token { text: "three".into() },
            StreamEvent::End,
        ]);
        assert_eq!(message.content, "one two three");
        assert_eq!(message.status, MessageStatus::Ended);
    }

    #[test]
    fn repeated_sql_and_data_are_last_write_wins() {
        let first_row: Row = serde_json::from_str(r#"{"a":1}"#).expect("row");
        let second_row: Row = serde_json::from_str(r#"{"a":2}"#).expect("row");
        let message = apply_all(&[
            StreamEvent::Start,
            StreamEvent::Sql {
                text: "SELECT 1".into(),
            },
            StreamEvent::Data {
                rows: vec![first_row],
            },
            StreamEvent::Token { text: "x".into() },
            StreamEvent::Sql {
                text: "SELECT 2".into(),
            },
            StreamEvent::Data {
                rows: vec![second_row.clone()],
            },
            StreamEvent::End,
        ]);
        assert_eq!(message.sql.as_deref(), Some("SELECT 2"));
        assert_eq!(message.rows, Some(vec![second_row]));
    }

    #[test]
    fn error_text_takes_display_precedence_without_clearing_results() {
        let row: Row = serde_json::from_str(r#"{"a":1}"#).expect("row");
        let message = apply_all(&[
            StreamEvent::Start,
            StreamEvent::Token {
                text: "partial".into(),
            },
            StreamEvent::Sql {
                text: "SELECT 1".into(),
            },
            StreamEvent::Data {
                rows: vec![row.clone()],
            },
            StreamEvent::Error {
                text: "query timed out".into(),
            },
            StreamEvent::End,
        ]);
        assert_eq!(message.display_text(), "query timed out");
        assert_eq!(message.content, "partial");
        assert_eq!(message.sql.as_deref(), Some("SELECT 1"));
        assert_eq!(message.rows, Some(vec![row]));
    }

    #[test]
    fn error_does_not_terminate_and_trailing_events_still_apply() {
        let message = apply_all(&[
            StreamEvent::Start,
            StreamEvent::Error {
                text: "transient".into(),
            },
            StreamEvent::Sql {
                text: "SELECT 1".into(),
            },
            StreamEvent::End,
        ]);
        assert_eq!(message.sql.as_deref(), Some("SELECT 1"));
        assert_eq!(message.status, MessageStatus::Ended);
    }

    #[test]
    fn events_before_start_are_applied_without_promoting_status() {
        let mut assembler = MessageAssembler::new();
        assert!(assembler.apply(&StreamEvent::Token {
            text: "early".into()
        }));
        assert_eq!(assembler.message().status, MessageStatus::Pending);
        assert_eq!(assembler.message().content, "early");
        assert!(assembler.apply(&StreamEvent::Start));
        assert_eq!(assembler.message().status, MessageStatus::Streaming);
    }

    #[test]
    fn events_after_end_are_rejected_and_leave_the_message_untouched() {
        let mut assembler = MessageAssembler::new();
        assembler.apply(&StreamEvent::Start);
        assembler.apply(&StreamEvent::Token { text: "a".into() });
        assembler.apply(&StreamEvent::End);
        let before = assembler.message().clone();

        assert!(!assembler.apply(&StreamEvent::Token {
            text: "late".into()
        }));
        assert!(!assembler.apply(&StreamEvent::Error {
            text: "late".into()
        }));
        assert_eq!(assembler.message(), &before);
    }

    #[test]
    fn error_only_stream_leaves_sql_and_rows_unset() {
        let message = apply_all(&[
            StreamEvent::Start,
            StreamEvent::Error {
                text: "LLM unavailable".into(),
            },
            StreamEvent::End,
        ]);
        assert_eq!(message.error_text.as_deref(), Some("LLM unavailable"));
        assert_eq!(message.sql, None);
        assert_eq!(message.rows, None);
        assert_eq!(message.status, MessageStatus::Ended);
    }
}
