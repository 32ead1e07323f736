//! Replay a recorded engine event log (one JSON event per line) through the
//! adapter and print the resulting UI frames.

use std::error::Error;
use std::io::{self, Read as _, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chatstream_adapter::prelude::*;
use chatstream_adapter::{SSE_DONE, init_observability};
use clap::{Parser, ValueEnum};
use futures::stream;
use serde_json::Value;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "chatstream-replay", version, about)]
struct Cli {
    /// Event log in JSON Lines format. Reads stdin when omitted or `-`.
    input: Option<PathBuf>,

    /// Model id reported in the `finish` frame.
    #[arg(long, env = "CHATSTREAM_MODEL_ID", default_value = "replay")]
    model_id: String,

    /// Output encoding of the frames.
    #[arg(long, value_enum, default_value_t = Format::Sse)]
    format: Format,

    /// Tool display name mapping, `raw=display`. Repeatable.
    #[arg(long = "tool-name", value_parser = parse_tool_mapping)]
    tool_names: Vec<(String, String)>,

    /// Frame buffer between the turn task and the printer.
    #[arg(long, env = "CHATSTREAM_FRAME_BUFFER", default_value_t = 128)]
    frame_buffer: usize,

    /// Put the underlying error message in the error frame instead of the
    /// generic text.
    #[arg(long)]
    expose_errors: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    /// `data: <json>` records followed by `data: [DONE]`.
    Sse,
    /// One JSON frame per line.
    Ndjson,
}

fn parse_tool_mapping(raw: &str) -> Result<(String, String), String> {
    let (from, to) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected raw=display, got `{raw}`"))?;
    let (from, to) = (from.trim(), to.trim());
    if from.is_empty() || to.is_empty() {
        return Err(format!("expected raw=display, got `{raw}`"));
    }
    Ok((from.to_string(), to.to_string()))
}

/// Parses a JSON Lines log. Blank lines are skipped; a line that is not JSON
/// becomes an upstream error at its position.
fn parse_events(input: &str) -> Vec<Result<UpstreamEvent, AdapterError>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let value: Value = serde_json::from_str(line)
                .map_err(|err| AdapterError::upstream(format!("line {}: {err}", idx + 1)))?;
            UpstreamEvent::from_value(&value)
        })
        .collect()
}

fn encode(frame: &DownstreamFrame, format: Format) -> Result<String, serde_json::Error> {
    match format {
        Format::Sse => frame.to_sse(),
        Format::Ndjson => frame.to_ndjson(),
    }
}

/// Logs what the turn did while it is replayed.
struct ReplayCallbacks {
    expose_errors: bool,
}

impl TurnCallbacks for ReplayCallbacks {
    fn on_tool_start(&self, tool_name: &str, input: &Value) {
        debug!(event = "replay.tool_start", domain = "replay", tool_name, input = %input);
    }

    fn on_tool_end(&self, tool_name: &str, output: &Value) {
        debug!(event = "replay.tool_end", domain = "replay", tool_name, output = %output);
    }

    fn on_usage_update(&self, usage: &Usage) {
        debug!(
            event = "replay.usage",
            domain = "replay",
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens
        );
    }

    fn on_error(&self, error: &AdapterError) -> String {
        if self.expose_errors {
            error.to_string()
        } else {
            chatstream_adapter::DEFAULT_ERROR_MESSAGE.to_string()
        }
    }
}

fn build_adapter(cli: &Cli) -> Result<StreamAdapter, AdapterError> {
    let mut builder = StreamAdapter::builder(cli.model_id.clone())
        .frame_buffer_capacity(cli.frame_buffer)
        .callbacks(Arc::new(ReplayCallbacks {
            expose_errors: cli.expose_errors,
        }));
    for (raw, display) in &cli.tool_names {
        builder = builder.tool_display_name(raw.clone(), display.clone());
    }
    builder.build()
}

async fn replay(
    cli: &Cli,
    input: &str,
    out: &mut impl Write,
) -> Result<TurnSummary, Box<dyn Error>> {
    let adapter = build_adapter(cli)?;
    let events = parse_events(input);
    info!(
        event = "replay.loaded",
        domain = "replay",
        events = events.len() as u64,
        model_id = %cli.model_id
    );

    let mut turn = adapter.start(stream::iter(events));
    while let Some(frame) = turn.next_frame().await {
        out.write_all(encode(&frame, cli.format)?.as_bytes())?;
    }
    if cli.format == Format::Sse {
        out.write_all(SSE_DONE.as_bytes())?;
    }
    out.flush()?;

    let summary = turn.finish().await?;
    info!(
        event = "replay.completed",
        domain = "replay",
        frames = summary.frames_emitted,
        steps = summary.steps,
        input_tokens = summary.usage.input_tokens,
        output_tokens = summary.usage.output_tokens
    );
    Ok(summary)
}

fn read_input(path: Option<&PathBuf>) -> io::Result<String> {
    match path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path),
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_observability();

    let input = read_input(cli.input.as_ref())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    replay(&cli, &input, &mut out).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(format: Format) -> Cli {
        Cli {
            input: None,
            model_id: "replay-test".into(),
            format,
            tool_names: vec![("build_parametric_model".into(), "cad".into())],
            frame_buffer: 4,
            expose_errors: false,
        }
    }

    const LOG: &str = r#"
{"event":"on_chat_model_start","name":"ChatAnthropic"}
{"event":"on_chat_model_stream","data":{"chunk":{"content":"","tool_calls":[{"id":"c1","name":"build_parametric_model"}]}}}
{"event":"on_chat_model_stream","data":{"chunk":{"content":"","tool_call_chunks":[{"args":"{\"w\":2}"}]}}}

{"event":"on_chat_model_end","data":{"output":{"usage_metadata":{"input_tokens":12,"output_tokens":4}}}}
{"event":"on_tool_start","name":"build_parametric_model","data":{"input":{"input":"{\"w\":2}"}}}
{"event":"on_tool_end","name":"build_parametric_model","data":{"output":{"content":"ok"}}}
"#;

    #[test]
    fn parses_jsonl_skipping_blank_lines() {
        let events = parse_events(LOG);
        assert_eq!(events.len(), 6);
        assert!(events.iter().all(Result::is_ok));
    }

    #[test]
    fn bad_lines_become_positioned_errors() {
        let events = parse_events("{\"event\":\"on_chain_start\"}\nnot json\n{\"event\":\"on_nope\"}");
        assert!(events[0].is_ok());
        assert!(
            matches!(&events[1], Err(AdapterError::Upstream(msg)) if msg.starts_with("line 2:"))
        );
        assert!(matches!(&events[2], Err(AdapterError::UnknownEvent { .. })));
    }

    #[test]
    fn tool_mapping_requires_both_sides() {
        assert_eq!(
            parse_tool_mapping("build_parametric_model=cad"),
            Ok(("build_parametric_model".into(), "cad".into()))
        );
        assert!(parse_tool_mapping("cad").is_err());
        assert!(parse_tool_mapping("=cad").is_err());
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "chatstream-replay",
            "log.jsonl",
            "--model-id",
            "m",
            "--format",
            "ndjson",
            "--tool-name",
            "a=b",
        ])
        .expect("parse");
        assert_eq!(cli.input, Some(PathBuf::from("log.jsonl")));
        assert_eq!(cli.format, Format::Ndjson);
        assert_eq!(cli.tool_names, vec![("a".to_string(), "b".to_string())]);
    }

    #[tokio::test]
    async fn replays_log_as_sse() {
        let mut out = Vec::new();
        let summary = replay(&cli(Format::Sse), LOG, &mut out)
            .await
            .expect("replay");
        let text = String::from_utf8(out).expect("utf8");
        let records: Vec<&str> = text.split("\n\n").filter(|r| !r.is_empty()).collect();
        assert_eq!(records.len(), 8);
        assert!(records[1].contains("\"type\":\"tool-input-start\""));
        assert!(records[1].contains("\"toolName\":\"cad\""));
        assert!(records[6].contains("\"type\":\"finish\""));
        assert!(records[6].contains("\"modelId\":\"replay-test\""));
        assert_eq!(records[7], "data: [DONE]");
        assert_eq!(summary.frames_emitted, 7);
        assert_eq!(summary.usage.input_tokens, 12);
    }

    #[tokio::test]
    async fn failed_replay_prints_error_frame_then_fails() {
        let mut out = Vec::new();
        let err = replay(
            &cli(Format::Ndjson),
            "{\"event\":\"on_chat_model_start\"}\n{\"event\":\"on_tool_end\"}\n",
            &mut out,
        )
        .await
        .expect_err("empty correlation");
        assert!(err.to_string().contains("turn failed"));
        let lines: Vec<Value> = String::from_utf8(out)
            .expect("utf8")
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["type"], "error");
        assert_eq!(
            lines[1]["errorText"],
            chatstream_adapter::DEFAULT_ERROR_MESSAGE
        );
    }
}
