//! Server-sent event framing and payload classification.
//!
//! [`records`] frames a response body into record payloads using
//! `eventsource-stream`. [`parse_payload`] decides once what a payload
//! carries, so nothing downstream inspects its shape again.

use crate::error::{Error, Result};
use crate::ingest::client::ByteStream;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::pin::Pin;

/// Payload that ends the stream successfully.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Record payloads in arrival order.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Appended after the body so a trailing record with no blank line is
/// still dispatched when the connection closes.
const CLOSE_TERMINATOR: &[u8] = b"\n\n";

/// Frame a response body into the `data` payload of each record.
///
/// Multi-line data is joined with `\n`. Records without data (comments,
/// keep-alives, bare `event:` lines) are skipped. Bytes split anywhere,
/// including inside a multi-byte character, are reassembled.
#[must_use]
pub fn records(body: ByteStream) -> RecordStream {
    let closed = body.chain(stream::once(async { Ok(CLOSE_TERMINATOR.to_vec()) }));
    let framed = closed.eventsource().filter_map(|item| async move {
        match item {
            Ok(event) if event.data.is_empty() => None,
            Ok(event) => Some(Ok(event.data)),
            Err(EventStreamError::Transport(e)) => Some(Err(e)),
            Err(e) => Some(Err(Error::StreamFailure(format!(
                "malformed event stream: {e}"
            )))),
        }
    });
    Box::pin(framed)
}

/// What one record carried.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPayload {
    /// The stream is complete.
    Done,
    /// Text to append to the reply.
    Delta(String),
    /// Per-source auxiliary answers.
    AuxiliaryAnswers(BTreeMap<String, Value>),
    /// Audit events.
    AuditEvents(Vec<Value>),
    /// Not structured data; the raw text is applied as a delta.
    Unparsed(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RecordBody {
    delta: Option<String>,
    content: Option<String>,
    text: Option<String>,
    token: Option<String>,
    #[serde(alias = "auxiliaryAnswers")]
    auxiliary_answers: Option<BTreeMap<String, Value>>,
    #[serde(alias = "auditEvents")]
    audit_events: Option<Vec<Value>>,
}

/// Classify one record payload.
///
/// A JSON object may carry several fields and yields them in a fixed
/// order: delta, auxiliary answers, audit events.
#[must_use]
pub fn parse_payload(data: &str) -> Vec<StreamPayload> {
    if data.trim() == DONE_SENTINEL {
        return vec![StreamPayload::Done];
    }

    let value = match serde_json::from_str::<Value>(data) {
        Ok(value) => value,
        Err(_) => return vec![StreamPayload::Unparsed(data.to_string())],
    };

    match value {
        Value::String(text) => vec![StreamPayload::Delta(text)],
        Value::Object(_) => match serde_json::from_value::<RecordBody>(value) {
            Ok(body) => body.into_payloads(),
            Err(_) => vec![StreamPayload::Unparsed(data.to_string())],
        },
        _ => vec![StreamPayload::Unparsed(data.to_string())],
    }
}

impl RecordBody {
    fn into_payloads(self) -> Vec<StreamPayload> {
        let mut payloads = Vec::new();
        if let Some(text) = self
            .delta
            .or(self.content)
            .or(self.text)
            .or(self.token)
        {
            payloads.push(StreamPayload::Delta(text));
        }
        if let Some(answers) = self.auxiliary_answers {
            payloads.push(StreamPayload::AuxiliaryAnswers(answers));
        }
        if let Some(events) = self.audit_events {
            payloads.push(StreamPayload::AuditEvents(events));
        }
        payloads
    }
}
