//! Per-turn state and event dispatch.
//!
//! [`TurnState`] owns everything one chat turn mutates: the classifier
//! accumulator, open spans, the tool call being correlated and the usage
//! totals. It is built fresh for each turn and driven one event at a time;
//! frames are appended to the caller's buffer in emission order.
//!
//! A step normally ends on the model end event. When a tool call is still
//! open at that point the step's finish is deferred:
//!
//! ```text
//! tool-input-available  text-end/reasoning-end  tool-output-available  finish-step
//! ```

use std::sync::Arc;

use tracing::{debug, warn};

use crate::callbacks::TurnCallbacks;
use crate::classifier::{ClassifiedPiece, ContentClassifier, ContentKind, ReasoningAccumulator};
use crate::config::AdapterConfig;
use crate::content::{ContentPart, MessageContent};
use crate::correlator::ToolCallState;
use crate::errors::AdapterError;
use crate::event::{ModelChunk, ModelOutput, ToolEnd, ToolStart, UpstreamEvent};
use crate::frame::{DownstreamFrame, FinishMetadata, FinishReason};
use crate::span::SpanState;
use crate::usage::{Usage, UsageAggregator};

/// Mutable state of one streamed turn.
pub struct TurnState {
    config: Arc<AdapterConfig>,
    callbacks: Arc<dyn TurnCallbacks>,
    classifier: Arc<dyn ContentClassifier>,
    accumulator: ReasoningAccumulator,
    spans: SpanState,
    tools: ToolCallState,
    usage: UsageAggregator,
    steps: u32,
    step_open: bool,
    finish_reason: FinishReason,
}

impl TurnState {
    pub fn new(
        config: Arc<AdapterConfig>,
        callbacks: Arc<dyn TurnCallbacks>,
        classifier: Arc<dyn ContentClassifier>,
    ) -> Self {
        Self {
            config,
            callbacks,
            classifier,
            accumulator: ReasoningAccumulator::default(),
            spans: SpanState::default(),
            tools: ToolCallState::default(),
            usage: UsageAggregator::default(),
            steps: 0,
            step_open: false,
            finish_reason: FinishReason::default(),
        }
    }

    /// Processes one upstream event.
    pub fn handle(
        &mut self,
        event: &UpstreamEvent,
        out: &mut Vec<DownstreamFrame>,
    ) -> Result<(), AdapterError> {
        self.callbacks.on_event(event);
        match event {
            UpstreamEvent::ModelStart { name } => {
                self.model_start(out);
                self.callbacks.on_chat_model_start(name.as_deref());
            }
            UpstreamEvent::ModelStream(chunk) => {
                self.model_stream(chunk, out)?;
                self.callbacks.on_chat_model_stream(chunk);
            }
            UpstreamEvent::ModelEnd(output) => self.model_end(output, out)?,
            UpstreamEvent::ToolStart(start) => self.tool_start(start, out)?,
            UpstreamEvent::ToolEnd(end) => self.tool_end(end, out)?,
            UpstreamEvent::ChainStart
            | UpstreamEvent::ChainStream
            | UpstreamEvent::ChainEnd
            | UpstreamEvent::LlmStart
            | UpstreamEvent::LlmStream
            | UpstreamEvent::LlmEnd
            | UpstreamEvent::PromptStart
            | UpstreamEvent::PromptStream
            | UpstreamEvent::PromptEnd
            | UpstreamEvent::ParserStart
            | UpstreamEvent::ParserStream
            | UpstreamEvent::ParserEnd
            | UpstreamEvent::CustomEvent => {}
        }
        Ok(())
    }

    /// Closes the turn after the upstream source is exhausted and emits the
    /// `finish` frame.
    pub fn finish(&mut self, out: &mut Vec<DownstreamFrame>) {
        self.flush_classifier(out);
        if self.tools.pending_finish_step {
            warn!(
                event = "turn.source_ended_with_pending_tool",
                domain = "turn",
                tool_call_id = self.tools.current_tool_call_id.as_deref().unwrap_or_default(),
                "upstream ended before the open tool call finished"
            );
            self.tools.pending_finish_step = false;
            self.finish_step(out);
        } else if self.step_open || self.spans.any_open() {
            self.finish_step(out);
        }

        let totals = self.usage.totals();
        self.callbacks.on_message_complete(&totals);
        debug!(
            event = "turn.finished",
            domain = "turn",
            steps = self.steps,
            model_calls = self.usage.calls(),
            input_tokens = totals.input_tokens,
            output_tokens = totals.output_tokens
        );
        out.push(DownstreamFrame::Finish {
            finish_reason: self.finish_reason,
            message_metadata: FinishMetadata {
                model_id: self.config.model_id.clone(),
                usage: totals,
            },
        });
    }

    /// User-visible text for a fatal error, as chosen by the callbacks.
    pub fn error_text(&self, error: &AdapterError) -> String {
        self.callbacks.on_error(error)
    }

    /// Number of model calls started so far.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn usage(&self) -> Usage {
        self.usage.totals()
    }

    pub fn finish_reason(&self) -> FinishReason {
        self.finish_reason
    }

    pub fn tool_calls(&self) -> &ToolCallState {
        &self.tools
    }

    pub fn spans(&self) -> &SpanState {
        &self.spans
    }

    fn model_start(&mut self, out: &mut Vec<DownstreamFrame>) {
        self.steps = self.steps.saturating_add(1);
        self.step_open = true;
        self.accumulator = ReasoningAccumulator::default();
        debug!(event = "turn.step_started", domain = "turn", step = self.steps);
        out.push(DownstreamFrame::StartStep);
    }

    fn model_stream(
        &mut self,
        chunk: &ModelChunk,
        out: &mut Vec<DownstreamFrame>,
    ) -> Result<(), AdapterError> {
        match &chunk.content {
            MessageContent::Text(text) => self.classify(text, out),
            MessageContent::Parts(parts) => {
                for part in parts {
                    let part = ContentPart::from_value(part)?;
                    self.content_part(part, out)?;
                }
            }
        }
        if let Some(announcement) = chunk.tool_calls.first() {
            self.tools.announce(&self.config, announcement, out)?;
        }
        if let Some(delta) = chunk.tool_call_chunks.first() {
            self.tools.argument_delta(delta, out)?;
        }
        Ok(())
    }

    fn content_part(
        &mut self,
        part: ContentPart,
        out: &mut Vec<DownstreamFrame>,
    ) -> Result<(), AdapterError> {
        match part {
            ContentPart::Text { text: Some(text) } => self.spans.text_delta(text, out),
            ContentPart::Text { text: None } => {
                return Err(AdapterError::MalformedPart {
                    part_type: "text",
                    field: "text",
                });
            }
            ContentPart::Thinking {
                thinking: None,
                signature: None,
            } => {
                return Err(AdapterError::MalformedPart {
                    part_type: "thinking",
                    field: "thinking",
                });
            }
            ContentPart::Thinking {
                thinking,
                signature,
            } => {
                if let Some(thinking) = thinking {
                    self.spans.reasoning_delta(thinking, out);
                }
                if signature.is_some() {
                    self.spans.end_reasoning(out);
                }
            }
            ContentPart::RedactedThinking { data } => self.spans.redacted_reasoning(data, out),
            ContentPart::InputJsonDelta | ContentPart::ToolUse => {}
        }
        Ok(())
    }

    fn classify(&mut self, text: &str, out: &mut Vec<DownstreamFrame>) {
        let accumulator = std::mem::take(&mut self.accumulator);
        let classified = self.classifier.classify(text, accumulator);
        self.accumulator = classified.accumulator;
        if let Some(piece) = classified.emit {
            self.emit_piece(piece, out);
        }
    }

    fn flush_classifier(&mut self, out: &mut Vec<DownstreamFrame>) {
        let accumulator = std::mem::take(&mut self.accumulator);
        if accumulator.buffer.is_empty() {
            return;
        }
        for piece in self.classifier.flush(accumulator) {
            self.emit_piece(piece, out);
        }
    }

    fn emit_piece(&mut self, piece: ClassifiedPiece, out: &mut Vec<DownstreamFrame>) {
        match piece.kind {
            ContentKind::Text => self.spans.text_delta(piece.content, out),
            ContentKind::Reasoning => self.spans.reasoning_delta(piece.content, out),
        }
    }

    fn model_end(
        &mut self,
        output: &ModelOutput,
        out: &mut Vec<DownstreamFrame>,
    ) -> Result<(), AdapterError> {
        self.flush_classifier(out);
        let usage = self.usage.record(output.usage_metadata.as_ref());
        if let Some(reason) = output.response_metadata.as_ref().and_then(|meta| {
            meta.stop_reason
                .as_deref()
                .or(meta.finish_reason.as_deref())
        }) {
            self.finish_reason = FinishReason::from_provider(reason);
        }
        if let Some(announcement) = output.tool_calls.first() {
            self.tools.record_unannounced(&self.config, announcement)?;
        }

        if self.tools.has_open_call() {
            self.tools.pending_finish_step = true;
            debug!(
                event = "turn.finish_step_deferred",
                domain = "turn",
                step = self.steps,
                tool_call_id = self.tools.current_tool_call_id.as_deref().unwrap_or_default()
            );
        } else {
            self.finish_step(out);
        }

        self.callbacks.on_chat_model_end(output);
        self.callbacks.on_usage_update(&usage);
        Ok(())
    }

    fn tool_start(
        &mut self,
        start: &ToolStart,
        out: &mut Vec<DownstreamFrame>,
    ) -> Result<(), AdapterError> {
        let Some(tool) = self.tools.tool_start(start, out)? else {
            return Ok(());
        };
        if self.tools.pending_finish_step {
            self.spans.close_all(out);
        }
        self.callbacks.on_tool_start(&tool.tool_name, &tool.payload);
        Ok(())
    }

    fn tool_end(
        &mut self,
        end: &ToolEnd,
        out: &mut Vec<DownstreamFrame>,
    ) -> Result<(), AdapterError> {
        let Some(tool) = self.tools.tool_end(&self.config, end, out)? else {
            return Ok(());
        };
        if self.tools.pending_finish_step {
            self.tools.pending_finish_step = false;
            self.finish_step(out);
        }
        self.callbacks.on_tool_end(&tool.tool_name, &tool.payload);
        Ok(())
    }

    fn finish_step(&mut self, out: &mut Vec<DownstreamFrame>) {
        self.spans.close_all(out);
        self.step_open = false;
        out.push(DownstreamFrame::FinishStep);
    }
}
