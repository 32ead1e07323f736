use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Parses a tool's raw text output into the value sent to the client.
pub type ToolResultParser = Arc<dyn Fn(&str) -> Value + Send + Sync>;

/// Default bounded frame buffer between a spawned turn and its consumer.
pub const DEFAULT_FRAME_BUFFER_CAPACITY: usize = 128;

/// Per-adapter settings shared by every turn.
#[derive(Clone)]
pub struct AdapterConfig {
    /// Model id reported in the `finish` frame metadata.
    pub model_id: String,
    /// Raw tool name -> name shown to the client.
    pub tool_type_map: HashMap<String, String>,
    /// Display tool name -> output parser. Tools without a parser pass their
    /// output through unchanged.
    pub parse_tool_results: HashMap<String, ToolResultParser>,
    /// Bounded frame buffer size used by spawned turns.
    pub frame_buffer_capacity: usize,
}

impl AdapterConfig {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            tool_type_map: HashMap::new(),
            parse_tool_results: HashMap::new(),
            frame_buffer_capacity: DEFAULT_FRAME_BUFFER_CAPACITY,
        }
    }

    /// Maps a raw tool name to its display name, falling back to the raw name.
    /// Returns `None` when both are empty.
    pub fn display_name(&self, raw: Option<&str>) -> Option<String> {
        let raw = raw.map(str::trim).unwrap_or_default();
        let mapped = self
            .tool_type_map
            .get(raw)
            .map(|name| name.trim())
            .filter(|name| !name.is_empty());
        match mapped {
            Some(name) => Some(name.to_string()),
            None if !raw.is_empty() => Some(raw.to_string()),
            None => None,
        }
    }

    /// Runs the output parser registered for `tool_name`, if any.
    pub fn parse_tool_result(&self, tool_name: &str, raw: &str) -> Option<Value> {
        self.parse_tool_results
            .get(tool_name)
            .map(|parser| parser(raw))
    }
}

impl fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parsers: Vec<&String> = self.parse_tool_results.keys().collect();
        parsers.sort();
        f.debug_struct("AdapterConfig")
            .field("model_id", &self.model_id)
            .field("tool_type_map", &self.tool_type_map)
            .field("parse_tool_results", &parsers)
            .field("frame_buffer_capacity", &self.frame_buffer_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_buffer_capacity() {
        assert_eq!(AdapterConfig::new("m").frame_buffer_capacity, 128);
    }

    #[test]
    fn display_name_prefers_mapping_then_raw() {
        let mut config = AdapterConfig::new("m");
        config
            .tool_type_map
            .insert("build_parametric_model".into(), "cad".into());
        config.tool_type_map.insert("blank".into(), "  ".into());

        assert_eq!(
            config.display_name(Some("build_parametric_model")).as_deref(),
            Some("cad")
        );
        assert_eq!(config.display_name(Some("search")).as_deref(), Some("search"));
        assert_eq!(config.display_name(Some("blank")).as_deref(), Some("blank"));
        assert_eq!(config.display_name(Some("")), None);
        assert_eq!(config.display_name(None), None);
    }

    #[test]
    fn parser_lookup_is_by_display_name() {
        let mut config = AdapterConfig::new("m");
        let parser: ToolResultParser = Arc::new(|raw: &str| Value::String(raw.to_uppercase()));
        config.parse_tool_results.insert("cad".into(), parser);
        assert_eq!(
            config.parse_tool_result("cad", "ok"),
            Some(Value::String("OK".into()))
        );
        assert_eq!(config.parse_tool_result("search", "ok"), None);
        assert!(format!("{config:?}").contains("cad"));
    }
}
