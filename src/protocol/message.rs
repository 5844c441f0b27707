//! Incoming message decoding.
//!
//! Every text frame from the browser is either a reply or an event. The two
//! are told apart by the presence of an `id` field, and decoded into a typed
//! [`Message`] before reaching correlation or event dispatch.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, from_value};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::{Event, Response};

// ============================================================================
// Message
// ============================================================================

/// A decoded incoming message.
#[derive(Debug, Clone)]
pub enum Message {
    /// Reply to a command (has an `id`).
    Response(Response),
    /// Unsolicited notification (no `id`).
    Event(Event),
    /// Reply whose `id` is readable but whose body is not a valid reply.
    /// The request it answers still has to be settled.
    MalformedReply {
        /// Id of the request the reply answers.
        id: RequestId,
        /// Why the body was rejected.
        reason: String,
    },
}

impl Message {
    /// Decodes a raw text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame is not JSON, or a field has the wrong
    ///   type and no numeric `id` identifies the request it answers
    /// - [`Error::InvalidMessage`] if the frame is neither a reply nor an event
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;

        let Value::Object(ref object) = value else {
            return Err(Error::invalid_message("message is not an object"));
        };

        if let Some(id) = object.get("id") {
            let id = id.as_u64().map(RequestId::new);
            return match (from_value::<Response>(value), id) {
                (Ok(response), _) => Ok(Self::Response(response)),
                (Err(e), Some(id)) => Ok(Self::MalformedReply {
                    id,
                    reason: format!("malformed reply: {e}: {text}"),
                }),
                (Err(e), None) => Err(e.into()),
            };
        }

        if object.contains_key("method") {
            return Ok(Self::Event(from_value(value)?));
        }

        Err(Error::invalid_message("message has neither id nor method"))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_is_discriminated_by_id() {
        let message = Message::parse(r#"{"id": 4, "result": {}}"#).expect("parse");
        assert!(matches!(message, Message::Response(ref r) if r.id == RequestId::new(4)));
    }

    #[test]
    fn test_event_has_no_id() {
        let message =
            Message::parse(r#"{"method": "Page.loadEventFired", "params": {"timestamp": 1.5}}"#)
                .expect("parse");
        assert!(matches!(message, Message::Event(ref e) if e.method == "Page.loadEventFired"));
    }

    #[test]
    fn test_bad_reply_keeps_its_id() {
        let message =
            Message::parse(r#"{"id": 9, "error": {"message": "no code"}}"#).expect("parse");
        match message {
            Message::MalformedReply { id, reason } => {
                assert_eq!(id, RequestId::new(9));
                assert!(reason.contains("no code"));
            }
            other => panic!("expected a malformed reply, got {other:?}"),
        }

        assert!(matches!(
            Message::parse(r#"{"id": "x", "result": {}}"#),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(Message::parse("not json"), Err(Error::Json(_))));
        assert!(matches!(
            Message::parse("[1, 2]"),
            Err(Error::InvalidMessage { .. })
        ));
        assert!(matches!(
            Message::parse(r#"{"params": {}}"#),
            Err(Error::InvalidMessage { .. })
        ));
    }
}
