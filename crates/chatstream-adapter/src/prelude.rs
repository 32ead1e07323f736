//! Common imports for typical adapter usage.
pub use crate::{
    AbortHandle, AdapterError, DownstreamFrame, FrameSink, StreamAdapter, StreamAdapterBuilder,
    TurnCallbacks, TurnError, TurnStream, TurnSummary, UpstreamEvent, Usage, decode_stream,
};
