//! Wire payloads for the Ollama HTTP API.
//!
//! The chat endpoint returns the same JSON shape whether or not streaming is
//! enabled; with `stream: true` the body is newline-delimited JSON and each
//! line deserializes as one [`ChatResponse`]. Duration fields are reported by
//! the server in nanoseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod client;
pub mod error;

pub use client::OllamaClient;
pub use error::ClientError;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Sampling parameters forwarded as the request's `options` object.
///
/// Ranges follow the server contract: temperature in `[0, 2]`, `top_p` in
/// `[0, 1]`, `top_k >= 1`, `repeat_penalty >= 0`, `num_predict > 0`.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SamplingOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub repeat_penalty: f64,
    pub num_predict: u32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            num_predict: 1000,
        }
    }
}

#[derive(Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: SamplingOptions,
}

#[derive(Deserialize, Default)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: String,
}

/// One chat payload: the whole body when `stream: false`, or a single
/// newline-delimited chunk when streaming. The final streamed chunk sets
/// `done` and carries the evaluation counters.
#[derive(Deserialize, Default)]
pub struct ChatResponse {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub total_duration: Option<u64>,
    #[serde(default)]
    pub load_duration: Option<u64>,
    #[serde(default)]
    pub prompt_eval_duration: Option<u64>,
    #[serde(default)]
    pub eval_duration: Option<u64>,
}

#[derive(Deserialize)]
pub struct ModelEntry {
    pub name: String,
}

#[derive(Deserialize, Default)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

#[derive(Deserialize, Default)]
pub struct ShowDetails {
    pub format: Option<String>,
    pub family: Option<String>,
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ShowResponse {
    pub size: Option<u64>,
    #[serde(default)]
    pub details: ShowDetails,
    pub modified_at: Option<String>,
    pub template: Option<String>,
    pub modelfile: Option<String>,
}

#[derive(Deserialize)]
pub struct EmbeddingsResponse {
    #[serde(default)]
    pub embedding: Vec<f32>,
}

#[derive(Deserialize)]
pub struct VersionResponse {
    pub version: String,
}

/// Flattened model metadata assembled from `/api/show`.
#[derive(Clone, Debug)]
pub struct ModelDetails {
    pub name: String,
    pub size: Option<u64>,
    pub format: String,
    pub family: String,
    pub parameter_size: String,
    pub quantization_level: String,
    pub modified_at: String,
    pub template: Option<String>,
    pub modelfile: Option<String>,
}

const UNKNOWN: &str = "Unknown";

impl ModelDetails {
    pub(crate) fn from_show(name: &str, show: ShowResponse) -> Self {
        let details = show.details;
        Self {
            name: name.to_string(),
            size: show.size,
            format: details.format.unwrap_or_else(|| UNKNOWN.to_string()),
            family: details.family.unwrap_or_else(|| UNKNOWN.to_string()),
            parameter_size: details
                .parameter_size
                .unwrap_or_else(|| UNKNOWN.to_string()),
            quantization_level: details
                .quantization_level
                .unwrap_or_else(|| UNKNOWN.to_string()),
            modified_at: show.modified_at.unwrap_or_else(|| UNKNOWN.to_string()),
            template: show.template,
            modelfile: show.modelfile,
        }
    }
}

const NANOS_PER_SEC: f64 = 1e9;

/// Per-call performance counters, converted from the server's nanosecond
/// durations to seconds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatMetrics {
    pub response_time_secs: f64,
    pub prompt_eval_count: u64,
    pub eval_count: u64,
    pub total_duration_secs: f64,
    pub load_duration_secs: f64,
    pub prompt_eval_duration_secs: f64,
    pub eval_duration_secs: f64,
    pub tokens_per_second: f64,
}

impl ChatMetrics {
    pub(crate) fn from_response(response: &ChatResponse, response_time: Duration) -> Self {
        let to_secs = |nanos: Option<u64>| nanos.unwrap_or(0) as f64 / NANOS_PER_SEC;
        let eval_count = response.eval_count.unwrap_or(0);
        let eval_duration_secs = to_secs(response.eval_duration);
        let tokens_per_second = if eval_duration_secs > 0.0 {
            eval_count as f64 / eval_duration_secs
        } else {
            0.0
        };

        Self {
            response_time_secs: response_time.as_secs_f64(),
            prompt_eval_count: response.prompt_eval_count.unwrap_or(0),
            eval_count,
            total_duration_secs: to_secs(response.total_duration),
            load_duration_secs: to_secs(response.load_duration),
            prompt_eval_duration_secs: to_secs(response.prompt_eval_duration),
            eval_duration_secs,
            tokens_per_second,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_convert_nanoseconds_to_seconds() {
        let response = ChatResponse {
            eval_count: Some(120),
            total_duration: Some(4_500_000_000),
            load_duration: Some(500_000_000),
            prompt_eval_duration: Some(1_000_000_000),
            eval_duration: Some(3_000_000_000),
            ..Default::default()
        };

        let metrics = ChatMetrics::from_response(&response, Duration::from_secs(5));
        assert_eq!(metrics.total_duration_secs, 4.5);
        assert_eq!(metrics.load_duration_secs, 0.5);
        assert_eq!(metrics.prompt_eval_duration_secs, 1.0);
        assert_eq!(metrics.eval_duration_secs, 3.0);
        assert_eq!(metrics.tokens_per_second, 40.0);
        assert_eq!(metrics.response_time_secs, 5.0);
    }

    #[test]
    fn metrics_zero_eval_duration_yields_zero_throughput() {
        let response = ChatResponse {
            eval_count: Some(42),
            ..Default::default()
        };

        let metrics = ChatMetrics::from_response(&response, Duration::from_millis(250));
        assert_eq!(metrics.tokens_per_second, 0.0);
        assert_eq!(metrics.eval_count, 42);
    }

    #[test]
    fn chunk_line_with_metrics_deserializes() {
        let line = r#"{"message":{"content":""},"done":true,"eval_count":10,"eval_duration":2000000000}"#;
        let chunk: ChatResponse = serde_json::from_str(line).expect("chunk parses");
        assert!(chunk.done);
        assert_eq!(chunk.eval_count, Some(10));
    }

    #[test]
    fn sampling_options_serialize_server_field_names() {
        let options = SamplingOptions::default();
        let value = serde_json::to_value(&options).expect("options serialize");
        assert_eq!(value["num_predict"], 1000);
        assert_eq!(value["repeat_penalty"], 1.1);
        assert_eq!(value["top_k"], 40);
    }
}
