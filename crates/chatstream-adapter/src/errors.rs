/// Fatal errors raised while turning upstream events into frames.
///
/// Any of these aborts the whole turn. The driving loop catches it once,
/// hands it to [`TurnCallbacks::on_error`](crate::TurnCallbacks::on_error)
/// and writes the returned text as the terminal `error` frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// The upstream event discriminant is not part of the known set.
    #[error("unknown upstream event: {event}")]
    UnknownEvent { event: String },
    /// A known event carried a payload with an unexpected shape.
    #[error("invalid {event} payload: {message}")]
    InvalidEvent { event: String, message: String },
    /// A content part discriminant is not part of the known set.
    #[error("unknown content part type: {part_type}")]
    UnknownPart { part_type: String },
    /// A content part is missing the field its type requires.
    #[error("malformed {part_type} content part: missing `{field}`")]
    MalformedPart {
        part_type: &'static str,
        field: &'static str,
    },
    /// Neither the display mapping nor the raw tool name produced a name.
    #[error("tool call announced without a tool name")]
    MissingToolName,
    /// Tool arguments arrived while no tool call was open.
    #[error("tool call arguments received before any tool call was announced")]
    DanglingToolDelta,
    /// A live (non-resumed) tool event found no open tool call to attach to.
    #[error("{event} received with no open tool call")]
    EmptyToolCorrelation { event: &'static str },
    /// The upstream event source itself failed.
    #[error("upstream error: {0}")]
    Upstream(String),
    /// Invalid adapter configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl AdapterError {
    pub(crate) fn unknown_event(event: impl Into<String>) -> Self {
        Self::UnknownEvent {
            event: event.into(),
        }
    }

    pub(crate) fn invalid_event(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEvent {
            event: event.into(),
            message: message.into(),
        }
    }

    pub(crate) fn unknown_part(part_type: impl Into<String>) -> Self {
        Self::UnknownPart {
            part_type: part_type.into(),
        }
    }

    /// Creates an error for a failing upstream event source.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// Stable machine-readable code, used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownEvent { .. } => "stream.unknown_event",
            Self::InvalidEvent { .. } => "stream.invalid_event",
            Self::UnknownPart { .. } => "stream.unknown_part",
            Self::MalformedPart { .. } => "stream.malformed_part",
            Self::MissingToolName => "tool.missing_name",
            Self::DanglingToolDelta => "tool.dangling_delta",
            Self::EmptyToolCorrelation { .. } => "tool.empty_correlation",
            Self::Upstream(_) => "stream.upstream",
            Self::Config(_) => "config",
        }
    }
}

/// Returned by a [`FrameSink`](crate::FrameSink) once its consumer is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame sink closed")]
pub struct SinkClosed;

/// Terminal failure of a single turn.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    /// A fatal adapter error aborted the turn. `message` is the text that was
    /// written as the terminal error frame.
    #[error("turn failed: {message}")]
    Failed {
        message: String,
        #[source]
        source: AdapterError,
    },
    /// The turn was aborted by the caller.
    #[error("turn cancelled")]
    Cancelled,
    /// The downstream consumer disconnected.
    #[error("downstream sink closed")]
    SinkClosed,
}

impl TurnError {
    /// Returns the adapter error behind a failed turn, if any.
    pub fn adapter_error(&self) -> Option<&AdapterError> {
        match self {
            Self::Failed { source, .. } => Some(source),
            Self::Cancelled | Self::SinkClosed => None,
        }
    }
}

impl From<SinkClosed> for TurnError {
    fn from(_: SinkClosed) -> Self {
        TurnError::SinkClosed
    }
}
