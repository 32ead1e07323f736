use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AdapterError;

/// Content carried by one model stream chunk.
///
/// Models either stream raw text or a list of typed parts. Parts stay as raw
/// JSON until they are processed so that a bad part only fails once every
/// part before it has produced its frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Value>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Text(value.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        MessageContent::Text(value)
    }
}

/// One typed piece of structured model output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentPart {
    /// Plain answer text. `None` means the `text` field was absent.
    Text { text: Option<String> },
    /// Reasoning text, or a signature that closes the reasoning block.
    Thinking {
        thinking: Option<String>,
        signature: Option<String>,
    },
    /// Reasoning the provider redacted; forwarded as opaque data.
    RedactedThinking { data: String },
    /// Streaming tool arguments; tool calls are tracked from `tool_call_chunks`.
    InputJsonDelta,
    /// Tool invocation block; tool calls are tracked from `tool_calls`.
    ToolUse,
}

impl ContentPart {
    /// Decodes one part by its `type` discriminant.
    pub fn from_value(value: &Value) -> Result<Self, AdapterError> {
        let Some(part_type) = value.get("type").and_then(Value::as_str) else {
            return Err(AdapterError::unknown_part(match value.get("type") {
                Some(other) => other.to_string(),
                None => "<missing>".to_string(),
            }));
        };
        match part_type {
            "text" => Ok(ContentPart::Text {
                text: string_field(value, "text"),
            }),
            "thinking" => Ok(ContentPart::Thinking {
                thinking: string_field(value, "thinking"),
                signature: string_field(value, "signature"),
            }),
            "redacted_thinking" => match string_field(value, "data") {
                Some(data) => Ok(ContentPart::RedactedThinking { data }),
                None => Err(AdapterError::MalformedPart {
                    part_type: "redacted_thinking",
                    field: "data",
                }),
            },
            "input_json_delta" => Ok(ContentPart::InputJsonDelta),
            "tool_use" => Ok(ContentPart::ToolUse),
            other => Err(AdapterError::unknown_part(other)),
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(ToOwned::to_owned)
}
