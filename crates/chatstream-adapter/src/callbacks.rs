use serde_json::Value;

use crate::errors::AdapterError;
use crate::event::{ModelChunk, ModelOutput, UpstreamEvent};
use crate::usage::Usage;

/// Text of the terminal error frame when [`TurnCallbacks::on_error`] is not
/// overridden.
pub const DEFAULT_ERROR_MESSAGE: &str = "An error occurred while generating the response.";

/// Observer hooks invoked while a turn is adapted.
///
/// Every method has a no-op default. Hooks observe only; they cannot change
/// the frames being emitted.
///
/// Order for one event:
/// 1. [`on_event`](Self::on_event), before the event is dispatched and
///    before any of its frames exist. It is the one generic hook that does
///    not follow the domain hook.
/// 2. The domain hook (`on_chat_model_*`, `on_tool_start`, `on_tool_end`),
///    after the event's frames are produced.
/// 3. [`on_usage_update`](Self::on_usage_update), after `on_chat_model_end`.
///
/// [`on_message_complete`](Self::on_message_complete) runs once, before the
/// `finish` frame.
pub trait TurnCallbacks: Send + Sync {
    /// Every upstream event, before dispatch.
    fn on_event(&self, _event: &UpstreamEvent) {}

    fn on_chat_model_start(&self, _name: Option<&str>) {}

    fn on_chat_model_stream(&self, _chunk: &ModelChunk) {}

    fn on_chat_model_end(&self, _output: &ModelOutput) {}

    /// A live tool start, with the display name and the parsed input.
    fn on_tool_start(&self, _tool_name: &str, _input: &Value) {}

    /// A live tool end, with the display name and the normalized output.
    fn on_tool_end(&self, _tool_name: &str, _output: &Value) {}

    /// Usage of one model call.
    fn on_usage_update(&self, _usage: &Usage) {}

    /// Aggregate usage once the turn finished successfully.
    fn on_message_complete(&self, _totals: &Usage) {}

    /// Turns a fatal error into the user-visible error text.
    fn on_error(&self, _error: &AdapterError) -> String {
        DEFAULT_ERROR_MESSAGE.to_string()
    }
}

/// Callbacks that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCallbacks;

impl TurnCallbacks for NoopCallbacks {}
