//! Streaming event adapter for chat UIs.
//!
//! Consumes the events an LLM orchestration engine emits while it streams a
//! response, calls tools and resumes from checkpoints, and re-emits them as
//! an ordered stream of UI message frames.
//!
//! # Usage
//!
//! ```no_run
//! use chatstream_adapter::prelude::*;
//! use futures::stream;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let adapter = StreamAdapter::builder("claude-sonnet")
//!     .tool_display_name("build_parametric_model", "cad")
//!     .build()?;
//!
//! let events = decode_stream(stream::iter(vec![
//!     serde_json::json!({"event": "on_chat_model_start"}),
//!     serde_json::json!({"event": "on_chat_model_stream", "data": {"chunk": {"content": "Hi"}}}),
//!     serde_json::json!({"event": "on_chat_model_end", "data": {"output": {}}}),
//! ]));
//!
//! let mut frames: Vec<DownstreamFrame> = Vec::new();
//! let summary = adapter.run(events, &mut frames).await?;
//! for frame in &frames {
//!     print!("{}", frame.to_sse()?);
//! }
//! println!("{} frames", summary.frames_emitted);
//! # Ok(())
//! # }
//! ```

/// Adapter entry point and builder.
pub mod adapter;
/// Observer hooks invoked during a turn.
pub mod callbacks;
/// Reasoning tag classification of raw model text.
pub mod classifier;
/// Per-adapter configuration.
pub mod config;
/// Structured content parts of model output.
pub mod content;
/// Tool call correlation state machine.
pub mod correlator;
/// Public error types.
pub mod errors;
/// Upstream engine events.
pub mod event;
/// Downstream UI frames and their wire encodings.
pub mod frame;
/// Logging initialization.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Turn driving loop, spawned turn stream and cancellation handle.
pub mod run;
/// Frame sink abstraction.
pub mod sink;
/// Text/reasoning span tracking.
pub mod span;
/// Per-turn state and event dispatch.
pub mod turn;
/// Token usage accounting.
pub mod usage;

pub use adapter::{StreamAdapter, StreamAdapterBuilder};
pub use callbacks::{DEFAULT_ERROR_MESSAGE, NoopCallbacks, TurnCallbacks};
pub use classifier::{
    ClassifiedPiece, Classification, ContentClassifier, ContentKind, ReasoningAccumulator,
    ThinkTagClassifier,
};
pub use config::{AdapterConfig, ToolResultParser};
pub use content::{ContentPart, MessageContent};
pub use correlator::ToolCallState;
pub use errors::{AdapterError, SinkClosed, TurnError};
pub use event::{
    EventMetadata, ModelChunk, ModelOutput, ToolCallAnnouncement, ToolCallArgDelta, ToolEnd,
    ToolStart, UpstreamEvent,
};
pub use frame::{DownstreamFrame, FinishMetadata, FinishReason, SSE_DONE};
pub use observability::init_observability;
pub use run::{AbortHandle, TurnStream, TurnSummary, decode_stream};
pub use sink::FrameSink;
pub use span::SpanState;
pub use turn::TurnState;
pub use usage::{RawUsage, Usage, UsageAggregator};
