//! Decoding of the agent service's server-sent event payloads.

use serde_json::Value;

use super::types::content_text;

/// What a single SSE `data:` payload means to the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamData {
    /// Assistant text to forward.
    Text(String),
    /// End-of-stream sentinel.
    Done,
    /// The service reported a failure inside the stream.
    Error(String),
    /// Reasoning, tool calls, usage and other events the gateway does not forward.
    Ignored,
}

/// Classify one `data:` payload from `/v1/agents/{id}/messages/stream`.
pub fn parse_stream_data(data: &str) -> StreamData {
    let data = data.trim();
    if data.is_empty() {
        return StreamData::Ignored;
    }
    if data == "[DONE]" {
        return StreamData::Done;
    }

    let json: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("Skipping unparseable stream payload: {}", e);
            return StreamData::Ignored;
        }
    };

    match json.get("message_type").and_then(Value::as_str) {
        Some("assistant_message") => match json.get("content").and_then(content_text) {
            Some(text) if !text.is_empty() => StreamData::Text(text),
            _ => StreamData::Ignored,
        },
        Some("error_message") => StreamData::Error(
            json.get("message")
                .or_else(|| json.get("detail"))
                .and_then(Value::as_str)
                .unwrap_or("unknown stream error")
                .to_string(),
        ),
        Some("stop_reason") => match json.get("stop_reason").and_then(Value::as_str) {
            Some(reason) if reason.starts_with("error") || reason == "llm_api_error" => {
                StreamData::Error(format!("agent stopped: {}", reason))
            }
            _ => StreamData::Ignored,
        },
        _ => StreamData::Ignored,
    }
}
