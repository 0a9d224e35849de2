//! Folds an upstream reply into one placeholder message.
//!
//! Three outcomes are handled: a streamed reply, a single-shot fallback
//! reply, and failure. Whatever happens, the placeholder is left settled
//! (`Sent` or `Error`) when [`Pipeline::run`] returns, unless the
//! conversation itself was purged meanwhile.

use crate::core::{MessagePatch, MessageStatus};
use crate::error::Result;
use crate::ingest::client::{ByteStream, ChatRequest, StreamOpen, Transport};
use crate::ingest::sse::{StreamPayload, parse_payload, records};
use crate::store::ConversationStore;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Content shown when a reply failed before any text arrived.
pub const FAILURE_TEXT: &str = "Sorry, something went wrong. Please try again.";

/// Content shown when a reply was stopped before any text arrived.
pub const CANCELLED_TEXT: &str = "Response cancelled.";

/// The message a pipeline writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Conversation holding the placeholder.
    pub conversation_id: String,
    /// The placeholder message.
    pub message_id: String,
}

impl Target {
    /// Create a target.
    #[must_use]
    pub fn new(conversation_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
        }
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Streamed reply completed.
    Streamed,
    /// Fallback reply completed.
    Completed,
    /// Reply failed; the placeholder carries the diagnostic.
    Failed(String),
    /// Reply was cancelled.
    Cancelled,
    /// The conversation or placeholder disappeared mid-reply.
    Discarded,
}

impl IngestOutcome {
    /// Whether a full reply was stored.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Streamed | Self::Completed)
    }
}

/// Handle that stops an in-flight reply.
///
/// Clones share the same underlying token.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Create a fresh handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call at any time, any number of times.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// Whether to keep consuming after applying a record.
enum Flow {
    Continue,
    Done,
    Gone,
}

/// Streams replies into the store.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<ConversationStore>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline over a store and transport.
    #[must_use]
    pub fn new(store: Arc<ConversationStore>, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    /// Request a reply and write it into `target`.
    ///
    /// `on_responding` runs once, when the first record of the reply arrives.
    ///
    /// # Errors
    ///
    /// Only persistence failures are returned; network and parse failures
    /// are recorded on the placeholder and reported as
    /// [`IngestOutcome::Failed`].
    pub async fn run<F>(
        &self,
        target: &Target,
        request: &ChatRequest,
        cancel: &CancelHandle,
        mut on_responding: F,
    ) -> Result<IngestOutcome>
    where
        F: FnMut() + Send,
    {
        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return self.cancelled(target),
            opened = self.transport.open_stream(request) => opened,
        };

        match opened {
            Ok(StreamOpen::Events(stream)) => {
                self.consume(target, stream, cancel, &mut on_responding)
                    .await
            }
            Ok(StreamOpen::NotEventStream) => {
                debug!(conversation = %target.conversation_id, "endpoint did not stream, using fallback");
                self.fallback(target, request, cancel, &mut on_responding)
                    .await
            }
            Err(e) => {
                warn!(conversation = %target.conversation_id, error = %e, "stream unavailable, using fallback");
                self.fallback(target, request, cancel, &mut on_responding)
                    .await
            }
        }
    }

    async fn consume<F>(
        &self,
        target: &Target,
        stream: ByteStream,
        cancel: &CancelHandle,
        on_responding: &mut F,
    ) -> Result<IngestOutcome>
    where
        F: FnMut() + Send,
    {
        let mut framed = records(stream);
        let mut reply = String::new();
        let mut responding = false;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return self.cancelled(target),
                next = framed.next() => next,
            };

            let data = match next {
                Some(Ok(data)) => data,
                Some(Err(e)) => return self.failed(target, &reply, &e.to_string()),
                // Connection closed without a sentinel.
                None => return self.settle(target, IngestOutcome::Streamed),
            };

            if !responding {
                responding = true;
                on_responding();
            }

            match self.apply(target, &data, &mut reply)? {
                Flow::Continue => {}
                Flow::Done => return self.settle(target, IngestOutcome::Streamed),
                Flow::Gone => return Ok(IngestOutcome::Discarded),
            }
        }
    }

    /// Apply one record payload, in arrival order.
    fn apply(&self, target: &Target, data: &str, reply: &mut String) -> Result<Flow> {
        for payload in parse_payload(data) {
            let patch = match payload {
                StreamPayload::Done => return Ok(Flow::Done),
                StreamPayload::Delta(text) | StreamPayload::Unparsed(text) => {
                    reply.push_str(&text);
                    MessagePatch::content(reply.clone(), MessageStatus::Streaming)
                }
                StreamPayload::AuxiliaryAnswers(answers) => MessagePatch {
                    auxiliary_answers: Some(answers),
                    ..MessagePatch::default()
                },
                StreamPayload::AuditEvents(events) => MessagePatch {
                    audit_events: Some(events),
                    ..MessagePatch::default()
                },
            };
            if !self.write(target, patch)? {
                return Ok(Flow::Gone);
            }
        }
        Ok(Flow::Continue)
    }

    async fn fallback<F>(
        &self,
        target: &Target,
        request: &ChatRequest,
        cancel: &CancelHandle,
        on_responding: &mut F,
    ) -> Result<IngestOutcome>
    where
        F: FnMut() + Send,
    {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return self.cancelled(target),
            response = self.transport.complete(request) => response,
        };

        match response {
            Ok(response) => {
                on_responding();
                let patch = MessagePatch {
                    content: Some(response.answer),
                    status: Some(MessageStatus::Sent),
                    auxiliary_answers: Some(response.auxiliary_answers),
                    audit_events: Some(response.audit_events),
                    ..MessagePatch::default()
                };
                if !self.write(target, patch)? {
                    return Ok(IngestOutcome::Discarded);
                }
                info!(conversation = %target.conversation_id, "fallback reply stored");
                Ok(IngestOutcome::Completed)
            }
            Err(e) => self.failed(target, "", &e.to_string()),
        }
    }

    fn settle(&self, target: &Target, outcome: IngestOutcome) -> Result<IngestOutcome> {
        if !self.write(target, MessagePatch::status(MessageStatus::Sent))? {
            return Ok(IngestOutcome::Discarded);
        }
        info!(conversation = %target.conversation_id, "streamed reply stored");
        Ok(outcome)
    }

    fn failed(&self, target: &Target, partial: &str, diagnostic: &str) -> Result<IngestOutcome> {
        warn!(conversation = %target.conversation_id, error = %diagnostic, "reply failed");
        let mut patch = MessagePatch::status(MessageStatus::Error);
        patch.error = Some(diagnostic.to_string());
        if partial.is_empty() {
            patch.content = Some(FAILURE_TEXT.to_string());
        }
        if !self.write(target, patch)? {
            return Ok(IngestOutcome::Discarded);
        }
        Ok(IngestOutcome::Failed(diagnostic.to_string()))
    }

    fn cancelled(&self, target: &Target) -> Result<IngestOutcome> {
        let Some(conversation) = self.store.get(&target.conversation_id)? else {
            return Ok(IngestOutcome::Discarded);
        };
        let Some(message) = conversation.message(&target.message_id) else {
            return Ok(IngestOutcome::Discarded);
        };
        if message.status == Some(MessageStatus::Sent) {
            return Ok(IngestOutcome::Streamed);
        }

        let mut patch = MessagePatch::status(MessageStatus::Error);
        patch.error = Some("cancelled".to_string());
        if message.content.is_empty() {
            patch.content = Some(CANCELLED_TEXT.to_string());
        }
        if !self.write(target, patch)? {
            return Ok(IngestOutcome::Discarded);
        }
        info!(conversation = %target.conversation_id, "reply cancelled");
        Ok(IngestOutcome::Cancelled)
    }

    /// Write a patch; `false` means the conversation or message is gone.
    fn write(&self, target: &Target, patch: MessagePatch) -> Result<bool> {
        let updated =
            self.store
                .update_message(&target.conversation_id, &target.message_id, patch)?;
        match updated {
            Some(conversation) if conversation.message(&target.message_id).is_some() => Ok(true),
            _ => {
                debug!(conversation = %target.conversation_id, "placeholder gone, dropping reply");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::RetentionConfig;
    use crate::core::{Conversation, Message};
    use crate::error::Error;
    use crate::ingest::client::ChatResponse;
    use crate::storage::MemoryBackend;
    use async_trait::async_trait;
    use futures::channel::mpsc;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Transport that replays scripted responses.
    #[derive(Default)]
    struct ScriptedTransport {
        stream: Mutex<Option<Result<StreamOpen>>>,
        complete: Mutex<Option<Result<ChatResponse>>>,
    }

    impl ScriptedTransport {
        fn streaming(chunks: Vec<Result<Vec<u8>>>) -> Self {
            let stream: ByteStream = Box::pin(futures::stream::iter(chunks));
            Self {
                stream: Mutex::new(Some(Ok(StreamOpen::Events(stream)))),
                complete: Mutex::new(None),
            }
        }

        fn live(stream: ByteStream) -> Self {
            Self {
                stream: Mutex::new(Some(Ok(StreamOpen::Events(stream)))),
                complete: Mutex::new(None),
            }
        }

        fn fallback(open: Result<StreamOpen>, complete: Result<ChatResponse>) -> Self {
            Self {
                stream: Mutex::new(Some(open)),
                complete: Mutex::new(Some(complete)),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn open_stream(&self, _request: &ChatRequest) -> Result<StreamOpen> {
            self.stream
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Ok(StreamOpen::NotEventStream))
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse> {
            self.complete
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(Error::StreamFailure("no fallback scripted".to_string())))
        }
    }

    fn store() -> Arc<ConversationStore> {
        Arc::new(
            ConversationStore::open(
                Arc::new(MemoryBackend::new()),
                Arc::new(SystemClock::new()),
                RetentionConfig::default(),
            )
            .unwrap(),
        )
    }

    fn seed(store: &ConversationStore) -> Target {
        let conv = store.create(None).unwrap();
        store
            .append_message(&conv.id, Message::user("Hi", Vec::new()))
            .unwrap();
        let placeholder = Message::placeholder();
        let target = Target::new(conv.id.clone(), placeholder.id.clone());
        store.append_message(&conv.id, placeholder).unwrap();
        target
    }

    fn request() -> ChatRequest {
        ChatRequest {
            prompt: "Hi".to_string(),
            conversation_context: Vec::new(),
        }
    }

    fn placeholder(store: &ConversationStore, target: &Target) -> Message {
        let conv: Conversation = store.get(&target.conversation_id).unwrap().unwrap();
        conv.message(&target.message_id).unwrap().clone()
    }

    fn chunk(s: &str) -> Result<Vec<u8>> {
        Ok(s.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn stream_in_one_read() {
        let store = store();
        let target = seed(&store);
        let transport = ScriptedTransport::streaming(vec![chunk(
            "data: Hel\n\ndata: lo \n\ndata: [DONE]\n\n",
        )]);
        let pipeline = Pipeline::new(store.clone(), Arc::new(transport));

        let outcome = pipeline
            .run(&target, &request(), &CancelHandle::new(), || {})
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Streamed);

        let msg = placeholder(&store, &target);
        assert_eq!(msg.content, "Hello ");
        assert_eq!(msg.status, Some(MessageStatus::Sent));
    }

    #[tokio::test]
    async fn stream_in_two_reads_split_mid_record() {
        let store = store();
        let target = seed(&store);
        let transport = ScriptedTransport::streaming(vec![
            chunk("data: Hel\n\nda"),
            chunk("ta: lo \n\ndata: [DONE]\n\n"),
        ]);
        let pipeline = Pipeline::new(store.clone(), Arc::new(transport));

        pipeline
            .run(&target, &request(), &CancelHandle::new(), || {})
            .await
            .unwrap();

        let msg = placeholder(&store, &target);
        assert_eq!(msg.content, "Hello ");
        assert_eq!(msg.status, Some(MessageStatus::Sent));
    }

    #[tokio::test]
    async fn carriage_return_records_are_applied() {
        let store = store();
        let target = seed(&store);
        let transport = ScriptedTransport::streaming(vec![chunk("data: Hel\r\rdata: lo\r\r")]);
        let pipeline = Pipeline::new(store.clone(), Arc::new(transport));

        let outcome = pipeline
            .run(&target, &request(), &CancelHandle::new(), || {})
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Streamed);

        let msg = placeholder(&store, &target);
        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.status, Some(MessageStatus::Sent));
    }

    #[tokio::test]
    async fn connection_close_without_sentinel_is_sent() {
        let store = store();
        let target = seed(&store);
        let transport = ScriptedTransport::streaming(vec![chunk("data: {\"delta\":\"He\"}\n\ndata: llo")]);
        let pipeline = Pipeline::new(store.clone(), Arc::new(transport));

        let outcome = pipeline
            .run(&target, &request(), &CancelHandle::new(), || {})
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Streamed);
        assert_eq!(placeholder(&store, &target).content, "Hello");
    }

    #[tokio::test]
    async fn error_mid_stream_keeps_partial_content() {
        let store = store();
        let target = seed(&store);
        let transport = ScriptedTransport::streaming(vec![
            chunk("data: Par\n\n"),
            Err(Error::StreamFailure("connection reset".to_string())),
        ]);
        let pipeline = Pipeline::new(store.clone(), Arc::new(transport));

        let outcome = pipeline
            .run(&target, &request(), &CancelHandle::new(), || {})
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Failed(_)));

        let msg = placeholder(&store, &target);
        assert_eq!(msg.content, "Par");
        assert_eq!(msg.status, Some(MessageStatus::Error));
        assert!(msg.error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn error_before_any_text_writes_failure_text() {
        let store = store();
        let target = seed(&store);
        let transport = ScriptedTransport::streaming(vec![Err(Error::StreamFailure(
            "reset".to_string(),
        ))]);
        let pipeline = Pipeline::new(store.clone(), Arc::new(transport));

        pipeline
            .run(&target, &request(), &CancelHandle::new(), || {})
            .await
            .unwrap();
        let msg = placeholder(&store, &target);
        assert_eq!(msg.content, FAILURE_TEXT);
        assert_eq!(msg.status, Some(MessageStatus::Error));
    }

    #[tokio::test]
    async fn side_channels_do_not_disturb_content() {
        let store = store();
        let target = seed(&store);
        let transport = ScriptedTransport::streaming(vec![chunk(concat!(
            "data: {\"delta\":\"An\"}\n\n",
            "data: {\"auxiliaryAnswers\":{\"web\":\"w\"}}\n\n",
            "data: {\"auditEvents\":[{\"step\":1}]}\n\n",
            "data: {\"delta\":\"swer\"}\n\n",
            "data: [DONE]\n\n",
        ))]);
        let pipeline = Pipeline::new(store.clone(), Arc::new(transport));

        pipeline
            .run(&target, &request(), &CancelHandle::new(), || {})
            .await
            .unwrap();
        let msg = placeholder(&store, &target);
        assert_eq!(msg.content, "Answer");
        assert_eq!(msg.auxiliary_answers["web"], json!("w"));
        assert_eq!(msg.audit_events, vec![json!({"step": 1})]);
    }

    #[tokio::test]
    async fn each_delta_is_written_in_order() {
        let store = store();
        let target = seed(&store);
        let mut sub = store.subscribe();
        let transport = ScriptedTransport::streaming(vec![chunk(
            "data: a\n\ndata: b\n\ndata: c\n\ndata: [DONE]\n\n",
        )]);
        let pipeline = Pipeline::new(store.clone(), Arc::new(transport));

        pipeline
            .run(&target, &request(), &CancelHandle::new(), || {})
            .await
            .unwrap();

        // Three deltas plus the final status write.
        let mut writes = 0;
        while sub.try_recv().is_some() {
            writes += 1;
        }
        assert_eq!(writes, 4);
    }

    #[tokio::test]
    async fn non_stream_response_uses_fallback() {
        let store = store();
        let target = seed(&store);
        let mut answers = BTreeMap::new();
        answers.insert("kb".to_string(), json!("aux"));
        let transport = ScriptedTransport::fallback(
            Ok(StreamOpen::NotEventStream),
            Ok(ChatResponse {
                answer: "Full answer".to_string(),
                auxiliary_answers: answers,
                audit_events: vec![json!("e")],
            }),
        );
        let pipeline = Pipeline::new(store.clone(), Arc::new(transport));

        let mut responded = 0;
        let outcome = pipeline
            .run(&target, &request(), &CancelHandle::new(), || responded += 1)
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Completed);
        assert_eq!(responded, 1);

        let msg = placeholder(&store, &target);
        assert_eq!(msg.content, "Full answer");
        assert_eq!(msg.status, Some(MessageStatus::Sent));
        assert_eq!(msg.auxiliary_answers["kb"], json!("aux"));
        assert_eq!(msg.audit_events.len(), 1);
    }

    #[tokio::test]
    async fn failed_stream_open_uses_fallback() {
        let store = store();
        let target = seed(&store);
        let transport = ScriptedTransport::fallback(
            Err(Error::StreamFailure("refused".to_string())),
            Ok(ChatResponse {
                answer: "ok".to_string(),
                auxiliary_answers: BTreeMap::new(),
                audit_events: Vec::new(),
            }),
        );
        let pipeline = Pipeline::new(store.clone(), Arc::new(transport));

        let outcome = pipeline
            .run(&target, &request(), &CancelHandle::new(), || {})
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Completed);
        assert_eq!(placeholder(&store, &target).content, "ok");
    }

    #[tokio::test]
    async fn fallback_failure_writes_error_bubble() {
        let store = store();
        let target = seed(&store);
        let transport = ScriptedTransport::fallback(
            Ok(StreamOpen::NotEventStream),
            Err(Error::StreamFailure("endpoint returned 500".to_string())),
        );
        let pipeline = Pipeline::new(store.clone(), Arc::new(transport));

        let outcome = pipeline
            .run(&target, &request(), &CancelHandle::new(), || {})
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Failed(_)));

        let conv = store.get(&target.conversation_id).unwrap().unwrap();
        assert!(!conv.has_open_reply());
        let msg = placeholder(&store, &target);
        assert_eq!(msg.content, FAILURE_TEXT);
        assert_eq!(msg.status, Some(MessageStatus::Error));
    }

    #[tokio::test]
    async fn cancel_keeps_partial_content() {
        let store = store();
        let target = seed(&store);
        let (tx, rx) = mpsc::unbounded::<Result<Vec<u8>>>();
        let pipeline = Pipeline::new(store.clone(), Arc::new(ScriptedTransport::live(Box::pin(rx))));
        let cancel = CancelHandle::new();
        let mut sub = store.subscribe();

        let task = {
            let pipeline = pipeline.clone();
            let target = target.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { pipeline.run(&target, &request(), &cancel, || {}).await })
        };

        tx.unbounded_send(chunk("data: Par\n\n")).unwrap();
        while sub.recv().await.is_some() {
            if placeholder(&store, &target).content == "Par" {
                break;
            }
        }

        cancel.cancel();
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, IngestOutcome::Cancelled);

        let msg = placeholder(&store, &target);
        assert_eq!(msg.content, "Par");
        assert_eq!(msg.status, Some(MessageStatus::Error));
        assert_eq!(msg.error.as_deref(), Some("cancelled"));
        drop(tx);
    }

    #[tokio::test]
    async fn cancel_before_open_writes_cancelled_text() {
        let store = store();
        let target = seed(&store);
        let pipeline = Pipeline::new(
            store.clone(),
            Arc::new(ScriptedTransport::streaming(vec![chunk("data: x\n\n")])),
        );
        let cancel = CancelHandle::new();
        cancel.cancel();

        let outcome = pipeline
            .run(&target, &request(), &cancel, || {})
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Cancelled);
        assert_eq!(placeholder(&store, &target).content, CANCELLED_TEXT);
    }

    #[tokio::test]
    async fn cancel_after_completion_is_noop() {
        let store = store();
        let target = seed(&store);
        let transport = ScriptedTransport::streaming(vec![chunk("data: done\n\ndata: [DONE]\n\n")]);
        let pipeline = Pipeline::new(store.clone(), Arc::new(transport));
        let cancel = CancelHandle::new();

        pipeline
            .run(&target, &request(), &cancel, || {})
            .await
            .unwrap();
        let before = store.get(&target.conversation_id).unwrap().unwrap();
        cancel.cancel();
        let after = store.get(&target.conversation_id).unwrap().unwrap();
        assert_eq!(before, after);
        assert_eq!(placeholder(&store, &target).status, Some(MessageStatus::Sent));
    }

    #[tokio::test]
    async fn purge_mid_stream_discards_reply() {
        let store = store();
        let target = seed(&store);
        let (tx, rx) = mpsc::unbounded::<Result<Vec<u8>>>();
        let pipeline = Pipeline::new(store.clone(), Arc::new(ScriptedTransport::live(Box::pin(rx))));

        let task = {
            let pipeline = pipeline.clone();
            let target = target.clone();
            tokio::spawn(async move {
                pipeline
                    .run(&target, &request(), &CancelHandle::new(), || {})
                    .await
            })
        };

        assert!(store.purge(&target.conversation_id).unwrap());
        tx.unbounded_send(chunk("data: late\n\n")).unwrap();

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, IngestOutcome::Discarded);
        assert!(store.get(&target.conversation_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn on_responding_fires_once() {
        let store = store();
        let target = seed(&store);
        let transport = ScriptedTransport::streaming(vec![
            chunk("data: a\n\n"),
            chunk("data: b\n\n"),
            chunk("data: [DONE]\n\n"),
        ]);
        let pipeline = Pipeline::new(store.clone(), Arc::new(transport));

        let mut calls = 0;
        pipeline
            .run(&target, &request(), &CancelHandle::new(), || calls += 1)
            .await
            .unwrap();
        assert_eq!(calls, 1);
    }
}
