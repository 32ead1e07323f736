//! Client-facing frames of the UI message stream.
//!
//! Frames serialize as `{"type": "<kebab-case>", ...camelCase fields}`. The
//! transport (SSE, NDJSON, websocket) is the caller's business; [`DownstreamFrame::to_sse`]
//! and [`DownstreamFrame::to_ndjson`] cover the two common encodings.
//!
//! ```text
//! start-step
//! text-start { id }
//! text-delta { id, delta }*
//! text-end { id }
//! finish-step
//! finish { finishReason, messageMetadata }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::usage::Usage;

/// Terminator written after the last SSE frame.
pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// Frames written to the chat UI, in emission order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DownstreamFrame {
    /// A model call began.
    StartStep,
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    ReasoningStart {
        id: String,
    },
    ReasoningDelta {
        id: String,
        delta: String,
    },
    ReasoningEnd {
        id: String,
    },
    /// Opaque reasoning content the provider redacted.
    RedactedReasoningDelta {
        id: String,
        data: String,
    },
    ToolInputStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
    },
    ToolInputDelta {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "inputTextDelta")]
        input_text_delta: String,
    },
    ToolInputAvailable {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: Value,
    },
    ToolOutputAvailable {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        output: Value,
    },
    /// A model call and its tool call (if any) are complete.
    FinishStep,
    /// Last frame of a successful turn.
    Finish {
        #[serde(rename = "finishReason")]
        finish_reason: FinishReason,
        #[serde(rename = "messageMetadata")]
        message_metadata: FinishMetadata,
    },
    /// Last frame of a failed turn.
    Error {
        #[serde(rename = "errorText")]
        error_text: String,
    },
}

impl DownstreamFrame {
    /// The wire `type` tag of this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartStep => "start-step",
            Self::TextStart { .. } => "text-start",
            Self::TextDelta { .. } => "text-delta",
            Self::TextEnd { .. } => "text-end",
            Self::ReasoningStart { .. } => "reasoning-start",
            Self::ReasoningDelta { .. } => "reasoning-delta",
            Self::ReasoningEnd { .. } => "reasoning-end",
            Self::RedactedReasoningDelta { .. } => "redacted-reasoning-delta",
            Self::ToolInputStart { .. } => "tool-input-start",
            Self::ToolInputDelta { .. } => "tool-input-delta",
            Self::ToolInputAvailable { .. } => "tool-input-available",
            Self::ToolOutputAvailable { .. } => "tool-output-available",
            Self::FinishStep => "finish-step",
            Self::Finish { .. } => "finish",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this frame ends the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error { .. })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Encodes the frame as one SSE record.
    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", self.to_json()?))
    }

    /// Encodes the frame as one NDJSON line.
    pub fn to_ndjson(&self) -> Result<String, serde_json::Error> {
        let mut line = self.to_json()?;
        line.push('\n');
        Ok(line)
    }
}

/// Why the turn finished.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
    Other,
}

impl FinishReason {
    /// Maps a provider stop reason onto the protocol's finish reasons.
    pub fn from_provider(reason: &str) -> Self {
        match reason {
            "end_turn" | "stop" | "stop_sequence" => Self::Stop,
            "max_tokens" | "length" => Self::Length,
            "tool_use" | "tool_calls" => Self::ToolCalls,
            "content_filter" | "refusal" => Self::ContentFilter,
            _ => Self::Other,
        }
    }
}

/// Metadata attached to the `finish` frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishMetadata {
    pub model_id: String,
    pub usage: Usage,
}
