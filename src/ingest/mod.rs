//! Streaming reply ingestion: transport, framing, and the pipeline that
//! writes replies into the store.

pub mod client;
pub mod pipeline;
pub mod sse;

pub use client::{
    ByteStream, ChatRequest, ChatResponse, ContextMessage, HttpTransport, StreamOpen, Transport,
};
pub use pipeline::{CANCELLED_TEXT, CancelHandle, FAILURE_TEXT, IngestOutcome, Pipeline, Target};
pub use sse::{DONE_SENTINEL, RecordStream, StreamPayload, parse_payload, records};
