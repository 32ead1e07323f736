//! Upstream events emitted by the orchestration engine while it streams a
//! response, runs tools and resumes from checkpoints.
//!
//! Events arrive as JSON objects tagged by an `event` discriminant:
//!
//! ```text
//! { "event": "on_chat_model_stream", "name": "...", "run_id": "...",
//!   "data": { "chunk": { ... } }, "metadata": { ... } }
//! ```
//!
//! [`UpstreamEvent::from_value`] is the only place a discriminant is
//! interpreted; anything outside the known set fails with
//! [`AdapterError::UnknownEvent`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::content::MessageContent;
use crate::errors::AdapterError;
use crate::usage::RawUsage;

/// A tool call announced by the model, as seen in a stream chunk or in the
/// final model output.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ToolCallAnnouncement {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub args: Option<Value>,
}

/// An incremental fragment of a tool call's JSON arguments.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ToolCallArgDelta {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub args: Option<String>,
    #[serde(default)]
    pub index: Option<i64>,
}

/// Payload of a model stream event.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ModelChunk {
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: MessageContent,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tool_calls: Vec<ToolCallAnnouncement>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tool_call_chunks: Vec<ToolCallArgDelta>,
}

/// Provider metadata attached to a finished model call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Payload of a model end event.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ModelOutput {
    #[serde(default, deserialize_with = "crate::usage::lenient_object")]
    pub usage_metadata: Option<RawUsage>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tool_calls: Vec<ToolCallAnnouncement>,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

/// Event metadata the adapter cares about. Other keys are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct EventMetadata {
    /// Set when the event is replayed from a checkpoint.
    #[serde(default)]
    pub resuming: bool,
}

/// A tool is about to run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolStart {
    /// Raw tool name as registered with the engine.
    pub name: Option<String>,
    /// Raw input payload, possibly JSON encoded inside an `input` string.
    pub input: Value,
    pub metadata: EventMetadata,
}

/// A tool finished running.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolEnd {
    pub name: Option<String>,
    /// Raw tool output, usually a message object with a `content` field.
    pub output: Value,
    pub metadata: EventMetadata,
}

/// Every event the engine may emit.
///
/// Only the first five variants produce frames. The rest are accepted and
/// ignored.
#[derive(Clone, Debug, PartialEq)]
pub enum UpstreamEvent {
    ModelStart { name: Option<String> },
    ModelStream(ModelChunk),
    ModelEnd(ModelOutput),
    ToolStart(ToolStart),
    ToolEnd(ToolEnd),
    ChainStart,
    ChainStream,
    ChainEnd,
    LlmStart,
    LlmStream,
    LlmEnd,
    PromptStart,
    PromptStream,
    PromptEnd,
    ParserStart,
    ParserStream,
    ParserEnd,
    CustomEvent,
}

impl UpstreamEvent {
    /// Decodes a raw engine event.
    pub fn from_value(value: &Value) -> Result<Self, AdapterError> {
        let event = match value.get("event") {
            Some(Value::String(name)) => name.as_str(),
            Some(other) => return Err(AdapterError::unknown_event(other.to_string())),
            None => return Err(AdapterError::unknown_event("<missing>")),
        };
        let data = value.get("data");
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);

        let decoded = match event {
            "on_chat_model_start" => UpstreamEvent::ModelStart { name },
            "on_chat_model_stream" => {
                let chunk = data
                    .and_then(|d| d.get("chunk"))
                    .ok_or_else(|| AdapterError::invalid_event(event, "missing data.chunk"))?;
                UpstreamEvent::ModelStream(decode(event, chunk)?)
            }
            "on_chat_model_end" => match data.and_then(|d| d.get("output")) {
                Some(output) if !output.is_null() => UpstreamEvent::ModelEnd(decode(event, output)?),
                _ => UpstreamEvent::ModelEnd(ModelOutput::default()),
            },
            "on_tool_start" => UpstreamEvent::ToolStart(ToolStart {
                name,
                input: field_or_null(data, "input"),
                metadata: metadata(event, value)?,
            }),
            "on_tool_end" => UpstreamEvent::ToolEnd(ToolEnd {
                name,
                output: field_or_null(data, "output"),
                metadata: metadata(event, value)?,
            }),
            "on_chain_start" => UpstreamEvent::ChainStart,
            "on_chain_stream" => UpstreamEvent::ChainStream,
            "on_chain_end" => UpstreamEvent::ChainEnd,
            "on_llm_start" => UpstreamEvent::LlmStart,
            "on_llm_stream" => UpstreamEvent::LlmStream,
            "on_llm_end" => UpstreamEvent::LlmEnd,
            "on_prompt_start" => UpstreamEvent::PromptStart,
            "on_prompt_stream" => UpstreamEvent::PromptStream,
            "on_prompt_end" => UpstreamEvent::PromptEnd,
            "on_parser_start" => UpstreamEvent::ParserStart,
            "on_parser_stream" => UpstreamEvent::ParserStream,
            "on_parser_end" => UpstreamEvent::ParserEnd,
            "on_custom_event" => UpstreamEvent::CustomEvent,
            other => return Err(AdapterError::unknown_event(other)),
        };
        Ok(decoded)
    }

    /// The engine discriminant for this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModelStart { .. } => "on_chat_model_start",
            Self::ModelStream(_) => "on_chat_model_stream",
            Self::ModelEnd(_) => "on_chat_model_end",
            Self::ToolStart(_) => "on_tool_start",
            Self::ToolEnd(_) => "on_tool_end",
            Self::ChainStart => "on_chain_start",
            Self::ChainStream => "on_chain_stream",
            Self::ChainEnd => "on_chain_end",
            Self::LlmStart => "on_llm_start",
            Self::LlmStream => "on_llm_stream",
            Self::LlmEnd => "on_llm_end",
            Self::PromptStart => "on_prompt_start",
            Self::PromptStream => "on_prompt_stream",
            Self::PromptEnd => "on_prompt_end",
            Self::ParserStart => "on_parser_start",
            Self::ParserStream => "on_parser_stream",
            Self::ParserEnd => "on_parser_end",
            Self::CustomEvent => "on_custom_event",
        }
    }

    /// A model stream event carrying plain text.
    pub fn text_chunk(text: impl Into<String>) -> Self {
        UpstreamEvent::ModelStream(ModelChunk {
            content: MessageContent::Text(text.into()),
            ..ModelChunk::default()
        })
    }

    /// A model end event with the given input/output token counts.
    pub fn model_end(input_tokens: u64, output_tokens: u64) -> Self {
        UpstreamEvent::ModelEnd(ModelOutput {
            usage_metadata: Some(RawUsage {
                input_tokens: Some(input_tokens),
                output_tokens: Some(output_tokens),
                input_token_details: None,
            }),
            ..ModelOutput::default()
        })
    }
}

impl TryFrom<Value> for UpstreamEvent {
    type Error = AdapterError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        UpstreamEvent::from_value(&value)
    }
}

fn decode<T: DeserializeOwned>(event: &str, value: &Value) -> Result<T, AdapterError> {
    T::deserialize(value).map_err(|e| AdapterError::invalid_event(event, e.to_string()))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn field_or_null(data: Option<&Value>, key: &str) -> Value {
    data.and_then(|d| d.get(key)).cloned().unwrap_or(Value::Null)
}

fn metadata(event: &str, value: &Value) -> Result<EventMetadata, AdapterError> {
    match value.get("metadata") {
        Some(meta) if !meta.is_null() => decode(event, meta),
        _ => Ok(EventMetadata::default()),
    }
}
