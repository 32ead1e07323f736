//! Tool call correlation.
//!
//! One tool call reaches the adapter as four independently timed signals:
//! the announcement in a stream chunk, argument fragments in later chunks,
//! the tool start and the tool end. [`ToolCallState`] stitches them into a
//! single client-side lifecycle:
//!
//! ```text
//! tool-input-start  tool-input-delta*  tool-input-available  tool-output-available
//! ```
//!
//! At most one call is open at a time. Tool events replayed from a checkpoint
//! arrive without their stream chunks; with an empty state they are skipped.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::AdapterConfig;
use crate::errors::AdapterError;
use crate::event::{ToolCallAnnouncement, ToolCallArgDelta, ToolEnd, ToolStart};
use crate::frame::DownstreamFrame;

/// Correlation state of the currently open tool call.
///
/// `tool_input_start_sent` implies `current_tool_call_id` is set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolCallState {
    pub current_tool_call_id: Option<String>,
    pub current_tool_name: Option<String>,
    pub tool_input_start_sent: bool,
    /// Set when a step ended while this call was open; the step's finish is
    /// released by the tool end.
    pub pending_finish_step: bool,
}

/// A tool call that passed correlation, handed to the tool callbacks.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelatedTool {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Parsed input on start, normalized output on end.
    pub payload: Value,
}

impl ToolCallState {
    pub fn has_open_call(&self) -> bool {
        self.current_tool_call_id.is_some()
    }

    /// Opens a call from a streamed announcement and emits `tool-input-start`.
    ///
    /// Announcements without an id are ignored.
    pub fn announce(
        &mut self,
        config: &AdapterConfig,
        announcement: &ToolCallAnnouncement,
        out: &mut Vec<DownstreamFrame>,
    ) -> Result<(), AdapterError> {
        if !has_id(announcement) {
            return Ok(());
        }
        let tool_name = config
            .display_name(announcement.name.as_deref())
            .ok_or(AdapterError::MissingToolName)?;
        if let Some(previous) = &self.current_tool_call_id {
            warn!(
                event = "tool.call_replaced",
                domain = "tool",
                previous_tool_call_id = %previous,
                tool_name = %tool_name,
                "tool call announced while another call was still open"
            );
        }
        let tool_call_id = new_tool_call_id();
        debug!(
            event = "tool.call_announced",
            domain = "tool",
            tool_call_id = %tool_call_id,
            tool_name = %tool_name
        );
        out.push(DownstreamFrame::ToolInputStart {
            tool_call_id: tool_call_id.clone(),
            tool_name: tool_name.clone(),
        });
        self.current_tool_call_id = Some(tool_call_id);
        self.current_tool_name = Some(tool_name);
        self.tool_input_start_sent = true;
        Ok(())
    }

    /// Records a call that was never streamed (it only appears in the final
    /// model output). Nothing is emitted until the tool starts.
    pub fn record_unannounced(
        &mut self,
        config: &AdapterConfig,
        announcement: &ToolCallAnnouncement,
    ) -> Result<(), AdapterError> {
        if self.has_open_call() || !has_id(announcement) {
            return Ok(());
        }
        let tool_name = config
            .display_name(announcement.name.as_deref())
            .ok_or(AdapterError::MissingToolName)?;
        let tool_call_id = new_tool_call_id();
        debug!(
            event = "tool.call_recorded",
            domain = "tool",
            tool_call_id = %tool_call_id,
            tool_name = %tool_name
        );
        self.current_tool_call_id = Some(tool_call_id);
        self.current_tool_name = Some(tool_name);
        self.tool_input_start_sent = false;
        Ok(())
    }

    /// Forwards an argument fragment of the open call.
    pub fn argument_delta(
        &mut self,
        delta: &ToolCallArgDelta,
        out: &mut Vec<DownstreamFrame>,
    ) -> Result<(), AdapterError> {
        let tool_call_id = self
            .current_tool_call_id
            .as_ref()
            .ok_or(AdapterError::DanglingToolDelta)?;
        match delta.args.as_deref() {
            Some(args) if !args.is_empty() => {
                out.push(DownstreamFrame::ToolInputDelta {
                    tool_call_id: tool_call_id.clone(),
                    input_text_delta: args.to_string(),
                });
            }
            _ => {}
        }
        Ok(())
    }

    /// Handles a tool start: catches up on `tool-input-start`/`tool-input-delta`
    /// if they were never sent, then emits `tool-input-available`.
    ///
    /// Returns `None` when the event is a checkpoint replay with nothing to
    /// correlate.
    pub fn tool_start(
        &mut self,
        event: &ToolStart,
        out: &mut Vec<DownstreamFrame>,
    ) -> Result<Option<CorrelatedTool>, AdapterError> {
        if self.skip_replayed(event.metadata.resuming, "on_tool_start") {
            return Ok(None);
        }
        let (Some(tool_call_id), Some(tool_name)) =
            (self.current_tool_call_id.clone(), self.current_tool_name.clone())
        else {
            return Err(AdapterError::EmptyToolCorrelation {
                event: "on_tool_start",
            });
        };

        let (raw_input, input) = parse_tool_input(&event.input);
        if !self.tool_input_start_sent {
            out.push(DownstreamFrame::ToolInputStart {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
            });
            if !raw_input.is_empty() {
                out.push(DownstreamFrame::ToolInputDelta {
                    tool_call_id: tool_call_id.clone(),
                    input_text_delta: raw_input,
                });
            }
            self.tool_input_start_sent = true;
        }
        out.push(DownstreamFrame::ToolInputAvailable {
            tool_call_id: tool_call_id.clone(),
            tool_name: tool_name.clone(),
            input: input.clone(),
        });
        Ok(Some(CorrelatedTool {
            tool_call_id,
            tool_name,
            payload: input,
        }))
    }

    /// Handles a tool end: closes the call and emits `tool-output-available`.
    pub fn tool_end(
        &mut self,
        config: &AdapterConfig,
        event: &ToolEnd,
        out: &mut Vec<DownstreamFrame>,
    ) -> Result<Option<CorrelatedTool>, AdapterError> {
        if self.skip_replayed(event.metadata.resuming, "on_tool_end") {
            return Ok(None);
        }
        let tool_call_id = self.current_tool_call_id.take();
        let tool_name = self.current_tool_name.take();
        self.tool_input_start_sent = false;
        let (Some(tool_call_id), Some(tool_name)) = (tool_call_id, tool_name) else {
            return Err(AdapterError::EmptyToolCorrelation {
                event: "on_tool_end",
            });
        };

        let (raw_output, identity) = tool_output_content(&event.output);
        let output = config
            .parse_tool_result(&tool_name, &raw_output)
            .unwrap_or(identity);
        let output = normalize_output(output);
        out.push(DownstreamFrame::ToolOutputAvailable {
            tool_call_id: tool_call_id.clone(),
            output: output.clone(),
        });
        Ok(Some(CorrelatedTool {
            tool_call_id,
            tool_name,
            payload: output,
        }))
    }

    fn skip_replayed(&self, resuming: bool, event: &'static str) -> bool {
        let empty = self.current_tool_call_id.is_none() && self.current_tool_name.is_none();
        if resuming && empty {
            debug!(
                event = "tool.replay_skipped",
                domain = "tool",
                upstream_event = event,
                "skipping tool event replayed from checkpoint"
            );
            return true;
        }
        false
    }
}

fn has_id(announcement: &ToolCallAnnouncement) -> bool {
    announcement
        .id
        .as_deref()
        .is_some_and(|id| !id.trim().is_empty())
}

fn new_tool_call_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Extracts the raw argument text and the parsed input of a tool start.
///
/// The raw payload is `input.input` when that is a string, otherwise the
/// whole value. Strings are parsed as JSON; text that is not JSON is wrapped
/// as `{"input": text}`.
pub fn parse_tool_input(input: &Value) -> (String, Value) {
    let raw = match input.get("input") {
        Some(Value::String(_)) => &input["input"],
        _ => input,
    };
    match raw {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed) => (text.clone(), parsed),
            Err(err) => {
                warn!(
                    event = "tool.input_not_json",
                    domain = "tool",
                    error = %err,
                    input_len = text.len() as u64,
                    "tool input is not JSON; wrapping raw text"
                );
                let mut wrapped = Map::new();
                wrapped.insert("input".to_string(), Value::String(text.clone()));
                (text.clone(), Value::Object(wrapped))
            }
        },
        Value::Null => (String::new(), Value::Object(Map::new())),
        other => (other.to_string(), other.clone()),
    }
}

/// Splits a tool output into the text handed to a result parser and the
/// value used when no parser is registered.
fn tool_output_content(output: &Value) -> (String, Value) {
    let content = match output {
        Value::Object(map) if map.contains_key("content") => &map["content"],
        other => other,
    };
    match content {
        Value::String(text) => (text.clone(), content.clone()),
        Value::Null => (String::new(), Value::Null),
        other => (other.to_string(), other.clone()),
    }
}

fn normalize_output(output: Value) -> Value {
    match &output {
        Value::Null => Value::String(String::new()),
        Value::Object(map) if map.is_empty() => Value::String(String::new()),
        _ => output,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::event::EventMetadata;
    use serde_json::json;

    fn announcement(id: Option<&str>, name: &str) -> ToolCallAnnouncement {
        ToolCallAnnouncement {
            id: id.map(ToOwned::to_owned),
            name: Some(name.to_string()),
            args: None,
        }
    }

    fn start(input: Value, resuming: bool) -> ToolStart {
        ToolStart {
            name: Some("search".into()),
            input,
            metadata: EventMetadata { resuming },
        }
    }

    fn end(output: Value, resuming: bool) -> ToolEnd {
        ToolEnd {
            name: Some("search".into()),
            output,
            metadata: EventMetadata { resuming },
        }
    }

    fn kinds(frames: &[DownstreamFrame]) -> Vec<&'static str> {
        frames.iter().map(DownstreamFrame::kind).collect()
    }

    #[test]
    fn streamed_call_lifecycle() {
        let config = AdapterConfig::new("m");
        let mut state = ToolCallState::default();
        let mut out = Vec::new();
        state
            .announce(&config, &announcement(Some("c1"), "search"), &mut out)
            .expect("announce");
        assert!(state.tool_input_start_sent);
        state
            .argument_delta(
                &ToolCallArgDelta {
                    args: Some("{\"q\":\"x\"}".into()),
                    ..ToolCallArgDelta::default()
                },
                &mut out,
            )
            .expect("delta");
        let started = state
            .tool_start(&start(json!({"input": "{\"q\":\"x\"}"}), false), &mut out)
            .expect("start")
            .expect("live");
        assert_eq!(started.payload, json!({"q": "x"}));
        let ended = state
            .tool_end(&config, &end(json!({"content": "result"}), false), &mut out)
            .expect("end")
            .expect("live");
        assert_eq!(ended.payload, json!("result"));
        assert_eq!(
            kinds(&out),
            vec![
                "tool-input-start",
                "tool-input-delta",
                "tool-input-available",
                "tool-output-available"
            ]
        );
        assert_eq!(state, ToolCallState::default());

        let ids: Vec<&str> = out
            .iter()
            .map(|f| match f {
                DownstreamFrame::ToolInputStart { tool_call_id, .. }
                | DownstreamFrame::ToolInputDelta { tool_call_id, .. }
                | DownstreamFrame::ToolInputAvailable { tool_call_id, .. }
                | DownstreamFrame::ToolOutputAvailable { tool_call_id, .. } => {
                    tool_call_id.as_str()
                }
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_ne!(ids[0], "c1");
    }

    #[test]
    fn announcement_maps_display_name() {
        let mut config = AdapterConfig::new("m");
        config
            .tool_type_map
            .insert("build_parametric_model".into(), "cad".into());
        let mut state = ToolCallState::default();
        let mut out = Vec::new();
        state
            .announce(
                &config,
                &announcement(Some("c1"), "build_parametric_model"),
                &mut out,
            )
            .expect("announce");
        assert!(matches!(
            &out[0],
            DownstreamFrame::ToolInputStart { tool_name, .. } if tool_name == "cad"
        ));
    }

    #[test]
    fn announcement_without_id_is_ignored() {
        let config = AdapterConfig::new("m");
        let mut state = ToolCallState::default();
        let mut out = Vec::new();
        state
            .announce(&config, &announcement(None, "search"), &mut out)
            .expect("no-op");
        assert!(out.is_empty());
        assert!(!state.has_open_call());
    }

    #[test]
    fn announcement_without_name_fails() {
        let config = AdapterConfig::new("m");
        let mut state = ToolCallState::default();
        let mut out = Vec::new();
        let err = state
            .announce(&config, &announcement(Some("c1"), ""), &mut out)
            .expect_err("missing name");
        assert_eq!(err, AdapterError::MissingToolName);
    }

    #[test]
    fn delta_before_announcement_fails() {
        let mut state = ToolCallState::default();
        let mut out = Vec::new();
        let err = state
            .argument_delta(&ToolCallArgDelta::default(), &mut out)
            .expect_err("dangling");
        assert_eq!(err, AdapterError::DanglingToolDelta);
    }

    #[test]
    fn unannounced_call_catches_up_on_start() {
        let config = AdapterConfig::new("m");
        let mut state = ToolCallState::default();
        state
            .record_unannounced(&config, &announcement(Some("c9"), "search"))
            .expect("record");
        assert!(state.has_open_call());
        assert!(!state.tool_input_start_sent);

        let mut out = Vec::new();
        state
            .tool_start(&start(json!({"input": "{\"q\":1}"}), false), &mut out)
            .expect("start");
        assert_eq!(
            kinds(&out),
            vec!["tool-input-start", "tool-input-delta", "tool-input-available"]
        );
        assert!(matches!(
            &out[1],
            DownstreamFrame::ToolInputDelta { input_text_delta, .. } if input_text_delta == "{\"q\":1}"
        ));
    }

    #[test]
    fn record_unannounced_keeps_an_open_call() {
        let config = AdapterConfig::new("m");
        let mut state = ToolCallState::default();
        let mut out = Vec::new();
        state
            .announce(&config, &announcement(Some("c1"), "search"), &mut out)
            .expect("announce");
        let before = state.clone();
        state
            .record_unannounced(&config, &announcement(Some("c2"), "other"))
            .expect("record");
        assert_eq!(state, before);
    }

    #[test]
    fn replayed_events_with_empty_state_are_silent() {
        let config = AdapterConfig::new("m");
        let mut state = ToolCallState::default();
        let mut out = Vec::new();
        assert_eq!(
            state
                .tool_start(&start(json!({"input": "{}"}), true), &mut out)
                .expect("skip"),
            None
        );
        assert_eq!(
            state
                .tool_end(&config, &end(json!({"content": "x"}), true), &mut out)
                .expect("skip"),
            None
        );
        assert!(out.is_empty());
    }

    #[test]
    fn live_events_with_empty_state_fail() {
        let config = AdapterConfig::new("m");
        let mut state = ToolCallState::default();
        let mut out = Vec::new();
        let err = state
            .tool_start(&start(json!({}), false), &mut out)
            .expect_err("empty");
        assert_eq!(
            err,
            AdapterError::EmptyToolCorrelation {
                event: "on_tool_start"
            }
        );
        let err = state
            .tool_end(&config, &end(json!({}), false), &mut out)
            .expect_err("empty");
        assert_eq!(
            err,
            AdapterError::EmptyToolCorrelation {
                event: "on_tool_end"
            }
        );
    }

    #[test]
    fn resumed_event_with_open_call_takes_live_path() {
        let config = AdapterConfig::new("m");
        let mut state = ToolCallState::default();
        let mut out = Vec::new();
        state
            .announce(&config, &announcement(Some("c1"), "search"), &mut out)
            .expect("announce");
        let started = state
            .tool_start(&start(json!({"input": "{}"}), true), &mut out)
            .expect("start");
        assert!(started.is_some());
    }

    #[test]
    fn non_json_input_is_wrapped() {
        let (raw, parsed) = parse_tool_input(&json!({"input": "find gears"}));
        assert_eq!(raw, "find gears");
        assert_eq!(parsed, json!({"input": "find gears"}));
        let (raw, parsed) = parse_tool_input(&json!({"q": 1}));
        assert_eq!(raw, "{\"q\":1}");
        assert_eq!(parsed, json!({"q": 1}));
        let (raw, parsed) = parse_tool_input(&Value::Null);
        assert!(raw.is_empty());
        assert_eq!(parsed, json!({}));
    }

    #[test]
    fn outputs_are_parsed_and_normalized() {
        let mut config = AdapterConfig::new("m");
        config.parse_tool_results.insert(
            "search".into(),
            Arc::new(|raw: &str| serde_json::from_str(raw).unwrap_or(Value::Null)),
        );
        for (output, expected) in [
            (json!({"content": "{\"hits\":2}"}), json!({"hits": 2})),
            (json!({"content": "not json"}), json!("")),
            (json!({"content": "{}"}), json!("")),
        ] {
            let mut state = ToolCallState {
                current_tool_call_id: Some("id".into()),
                current_tool_name: Some("search".into()),
                ..ToolCallState::default()
            };
            let mut out = Vec::new();
            let ended = state
                .tool_end(&config, &end(output, false), &mut out)
                .expect("end")
                .expect("live");
            assert_eq!(ended.payload, expected);
        }
    }

    #[test]
    fn identity_output_passes_through() {
        let config = AdapterConfig::new("m");
        for (output, expected) in [
            (json!("plain"), json!("plain")),
            (json!({"content": null}), json!("")),
            (Value::Null, json!("")),
            (json!({}), json!("")),
            (json!({"content": [{"type": "text", "text": "a"}]}), json!([{"type": "text", "text": "a"}])),
        ] {
            let mut state = ToolCallState {
                current_tool_call_id: Some("id".into()),
                current_tool_name: Some("search".into()),
                ..ToolCallState::default()
            };
            let mut out = Vec::new();
            state
                .tool_end(&config, &end(output, false), &mut out)
                .expect("end");
            assert!(matches!(
                &out[0],
                DownstreamFrame::ToolOutputAvailable { output, .. } if *output == expected
            ));
        }
    }
}
