use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "chatstream.logs.jsonl";

/// Logging settings read from the environment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub enabled: bool,
    /// `CHATSTREAM_LOG_LEVEL`; `RUST_LOG` applies when unset or invalid.
    pub log_level: Option<String>,
    /// JSONL log file. Console output goes to stderr when unset.
    pub json_log_path: Option<PathBuf>,
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = [
            "CHATSTREAM_OBSERVABILITY_ENABLED",
            "CHATSTREAM_OBSERVABILITY",
        ]
        .iter()
        .find_map(|key| lookup(key))
        .map(|value| parse_bool_env(&value).unwrap_or(true))
        .unwrap_or(true);
        Self {
            enabled,
            log_level: lookup("CHATSTREAM_LOG_LEVEL").filter(|v| !v.trim().is_empty()),
            json_log_path: lookup("CHATSTREAM_JSON_LOG_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        if let Some(level) = &self.log_level
            && let Ok(filter) = EnvFilter::try_new(level)
        {
            return filter;
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Splits a log file path into the directory and file name handed to the
/// appender.
fn log_file_parts(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    (dir, file_name)
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `CHATSTREAM_OBSERVABILITY_ENABLED` / `CHATSTREAM_OBSERVABILITY`: optional enable/disable flag (default enabled).
/// - `CHATSTREAM_LOG_LEVEL`: optional level/filter override (`info`, `debug`, `chatstream_adapter=debug`, ...).
/// - `CHATSTREAM_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file.
///   If unset, logs go to stderr in a compact console format; stdout is left for frames.
/// - `RUST_LOG`: filter used when `CHATSTREAM_LOG_LEVEL` is unset.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let config = ObservabilityConfig::from_env();
        if !config.enabled {
            return;
        }

        let env_filter = config.env_filter();
        if let Some(path) = &config.json_log_path {
            let (dir, file_name) = log_file_parts(path);
            let _ = std::fs::create_dir_all(&dir);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> ObservabilityConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ObservabilityConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn enabled_by_default() {
        assert_eq!(
            config(&[]),
            ObservabilityConfig {
                enabled: true,
                log_level: None,
                json_log_path: None,
            }
        );
    }

    #[test]
    fn explicit_flag_wins_and_garbage_keeps_enabled() {
        assert!(!config(&[("CHATSTREAM_OBSERVABILITY_ENABLED", "off")]).enabled);
        assert!(!config(&[("CHATSTREAM_OBSERVABILITY", "0")]).enabled);
        assert!(config(&[("CHATSTREAM_OBSERVABILITY", "maybe")]).enabled);
        assert!(
            config(&[
                ("CHATSTREAM_OBSERVABILITY_ENABLED", "yes"),
                ("CHATSTREAM_OBSERVABILITY", "no"),
            ])
            .enabled
        );
    }

    #[test]
    fn blank_values_are_ignored() {
        let cfg = config(&[("CHATSTREAM_LOG_LEVEL", " "), ("CHATSTREAM_JSON_LOG_PATH", "")]);
        assert_eq!(cfg.log_level, None);
        assert_eq!(cfg.json_log_path, None);
    }

    #[test]
    fn log_path_splits_into_dir_and_file() {
        assert_eq!(
            log_file_parts(Path::new("logs/run.jsonl")),
            (PathBuf::from("logs"), "run.jsonl".to_string())
        );
        assert_eq!(
            log_file_parts(Path::new("run.jsonl")),
            (PathBuf::from("."), "run.jsonl".to_string())
        );
    }
}
