use std::collections::HashMap;
use std::sync::Arc;

use futures::Stream;
use serde_json::Value;
use tracing::debug;

use crate::callbacks::{NoopCallbacks, TurnCallbacks};
use crate::classifier::{ContentClassifier, ThinkTagClassifier};
use crate::config::{AdapterConfig, DEFAULT_FRAME_BUFFER_CAPACITY, ToolResultParser};
use crate::errors::{AdapterError, TurnError};
use crate::event::UpstreamEvent;
use crate::run::{self, TurnStream, TurnSummary};
use crate::sink::FrameSink;
use crate::turn::TurnState;

/// Entry point for adapting upstream event streams into UI frames.
///
/// An adapter is cheap to clone and holds no per-turn state; every call to
/// [`run`](Self::run) or [`start`](Self::start) starts from a fresh turn.
#[derive(Clone)]
pub struct StreamAdapter {
    config: Arc<AdapterConfig>,
    callbacks: Arc<dyn TurnCallbacks>,
    classifier: Arc<dyn ContentClassifier>,
}

impl StreamAdapter {
    /// Starts a builder for an adapter reporting `model_id` in `finish` frames.
    pub fn builder(model_id: impl Into<String>) -> StreamAdapterBuilder {
        StreamAdapterBuilder::new(model_id)
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Fresh state for one turn.
    pub fn new_turn(&self) -> TurnState {
        TurnState::new(
            self.config.clone(),
            self.callbacks.clone(),
            self.classifier.clone(),
        )
    }

    /// Drives one turn on the current task, writing frames to `sink`.
    ///
    /// Returns after the `finish` frame (or the terminal `error` frame) has
    /// been written.
    pub async fn run<E, S>(&self, events: E, sink: &mut S) -> Result<TurnSummary, TurnError>
    where
        E: Stream<Item = Result<UpstreamEvent, AdapterError>> + Send,
        S: FrameSink + ?Sized,
    {
        let turn_id = uuid::Uuid::new_v4();
        debug!(
            event = "adapter.run",
            domain = "adapter",
            turn_id = %turn_id,
            model_id = %self.config.model_id
        );
        run::drive(turn_id, self.new_turn(), events, sink, None).await
    }

    /// Spawns the turn onto the tokio runtime and returns a frame stream.
    pub fn start<E>(&self, events: E) -> TurnStream
    where
        E: Stream<Item = Result<UpstreamEvent, AdapterError>> + Send + 'static,
    {
        let turn_id = uuid::Uuid::new_v4();
        debug!(
            event = "adapter.start",
            domain = "adapter",
            turn_id = %turn_id,
            model_id = %self.config.model_id,
            frame_buffer_capacity = self.config.frame_buffer_capacity as u64
        );
        run::spawn_turn(
            turn_id,
            self.new_turn(),
            events,
            self.config.frame_buffer_capacity,
        )
    }
}

/// Builder used to configure a [`StreamAdapter`].
pub struct StreamAdapterBuilder {
    model_id: String,
    tool_type_map: HashMap<String, String>,
    parse_tool_results: HashMap<String, ToolResultParser>,
    callbacks: Option<Arc<dyn TurnCallbacks>>,
    classifier: Option<Arc<dyn ContentClassifier>>,
    frame_buffer_capacity: usize,
}

impl StreamAdapterBuilder {
    fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            tool_type_map: HashMap::new(),
            parse_tool_results: HashMap::new(),
            callbacks: None,
            classifier: None,
            frame_buffer_capacity: DEFAULT_FRAME_BUFFER_CAPACITY,
        }
    }

    /// Replaces the raw tool name -> display name mapping.
    pub fn tool_type_map(mut self, map: HashMap<String, String>) -> Self {
        self.tool_type_map = map;
        self
    }

    /// Adds one raw tool name -> display name mapping.
    pub fn tool_display_name(mut self, raw: impl Into<String>, display: impl Into<String>) -> Self {
        self.tool_type_map.insert(raw.into(), display.into());
        self
    }

    /// Registers an output parser for the tool shown as `tool_name`.
    pub fn parse_tool_result<F>(mut self, tool_name: impl Into<String>, parser: F) -> Self
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        self.parse_tool_results
            .insert(tool_name.into(), Arc::new(parser));
        self
    }

    pub fn callbacks(mut self, callbacks: Arc<dyn TurnCallbacks>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    /// Replaces the default `<think>` tag classifier.
    pub fn classifier(mut self, classifier: Arc<dyn ContentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Sets the bounded frame buffer between a spawned turn and its consumer.
    pub fn frame_buffer_capacity(mut self, capacity: usize) -> Self {
        self.frame_buffer_capacity = capacity;
        self
    }

    /// Validates the configuration and builds the adapter.
    pub fn build(self) -> Result<StreamAdapter, AdapterError> {
        if self.model_id.trim().is_empty() {
            return Err(AdapterError::Config("model_id must not be empty".into()));
        }
        if self.frame_buffer_capacity == 0 {
            return Err(AdapterError::Config(
                "frame_buffer_capacity must be greater than 0".into(),
            ));
        }
        if let Some((raw, _)) = self
            .tool_type_map
            .iter()
            .find(|(raw, _)| raw.trim().is_empty())
        {
            return Err(AdapterError::Config(format!(
                "tool_type_map contains an empty raw tool name ({raw:?})"
            )));
        }

        let config = AdapterConfig {
            model_id: self.model_id,
            tool_type_map: self.tool_type_map,
            parse_tool_results: self.parse_tool_results,
            frame_buffer_capacity: self.frame_buffer_capacity,
        };
        Ok(StreamAdapter {
            config: Arc::new(config),
            callbacks: self.callbacks.unwrap_or_else(|| Arc::new(NoopCallbacks)),
            classifier: self
                .classifier
                .unwrap_or_else(|| Arc::new(ThinkTagClassifier::default())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DownstreamFrame;
    use futures::stream;
    use serde_json::json;

    #[test]
    fn build_rejects_empty_model_id() {
        let result = StreamAdapter::builder("  ").build();
        assert!(
            matches!(result, Err(AdapterError::Config(message)) if message.contains("model_id"))
        );
    }

    #[test]
    fn build_rejects_zero_buffer() {
        let result = StreamAdapter::builder("m").frame_buffer_capacity(0).build();
        assert!(
            matches!(result, Err(AdapterError::Config(message)) if message.contains("frame_buffer_capacity"))
        );
    }

    #[test]
    fn build_rejects_empty_raw_tool_name() {
        let result = StreamAdapter::builder("m").tool_display_name("", "cad").build();
        assert!(matches!(result, Err(AdapterError::Config(_))));
    }

    #[test]
    fn builder_settings_reach_config() {
        let adapter = StreamAdapter::builder("claude")
            .tool_display_name("build_parametric_model", "cad")
            .parse_tool_result("cad", |raw| json!({"raw": raw}))
            .frame_buffer_capacity(8)
            .build()
            .expect("adapter");
        let config = adapter.config();
        assert_eq!(config.model_id, "claude");
        assert_eq!(config.frame_buffer_capacity, 8);
        assert_eq!(
            config.display_name(Some("build_parametric_model")).as_deref(),
            Some("cad")
        );
        assert_eq!(
            config.parse_tool_result("cad", "x"),
            Some(json!({"raw": "x"}))
        );
    }

    #[tokio::test]
    async fn turns_do_not_share_state() {
        let adapter = StreamAdapter::builder("m").build().expect("adapter");
        let announce = UpstreamEvent::from_value(&json!({
            "event": "on_chat_model_stream",
            "data": {"chunk": {"content": "", "tool_calls": [{"id": "c1", "name": "search"}]}}
        }))
        .expect("decode");

        let mut first: Vec<DownstreamFrame> = Vec::new();
        adapter
            .run(stream::iter(vec![Ok(announce)]), &mut first)
            .await
            .expect("first turn");

        // A live tool end in a new turn must not see the first turn's call.
        let end = UpstreamEvent::from_value(&json!({
            "event": "on_tool_end",
            "data": {"output": {"content": "x"}}
        }))
        .expect("decode");
        let mut second: Vec<DownstreamFrame> = Vec::new();
        let err = adapter
            .run(stream::iter(vec![Ok(end)]), &mut second)
            .await
            .expect_err("no open call");
        assert!(matches!(
            err.adapter_error(),
            Some(AdapterError::EmptyToolCorrelation { .. })
        ));
    }
}
