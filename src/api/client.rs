//! HTTP client for a local Ollama inference server.
//!
//! Probes and metadata fetches use short timeouts; chat calls use the long
//! configurable timeout since generation can be slow. Operations documented
//! as best-effort (`list_models`, `unload_model`, `keep_model_loaded`,
//! `is_available`, `server_version`) absorb failures into neutral values and
//! log them at debug level; everything else returns a [`ClientError`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{
    ChatMessage, ChatMetrics, ChatRequest, ChatResponse, ClientError, EmbeddingsResponse,
    ModelDetails, SamplingOptions, ShowResponse, TagsResponse, VersionResponse,
};
use crate::core::backend::ChatBackend;
use crate::core::chat_stream::{spawn_chat_stream, StreamEvent, StreamParams};
use crate::core::config::Config;
use crate::utils::url::api_url;

pub const DEFAULT_CHAT_TIMEOUT_SECS: u64 = 300;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    chat_timeout: Duration,
}

#[derive(Serialize)]
struct KeepAliveRequest<'a> {
    model: &'a str,
    keep_alive: u64,
}

#[derive(Serialize)]
struct ShowRequest<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, chat_timeout_secs: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            chat_timeout: Duration::from_secs(chat_timeout_secs),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.base_url(), config.chat_timeout_secs)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List pulled models. Empty on any failure: callers cannot distinguish
    /// "server unreachable" from "server reachable but nothing pulled".
    pub async fn list_models(&self) -> Vec<String> {
        match self.fetch_tags().await {
            Ok(models) => models,
            Err(err) => {
                debug!(%err, "model listing failed");
                Vec::new()
            }
        }
    }

    async fn fetch_tags(&self) -> Result<Vec<String>, ClientError> {
        let response = self
            .http
            .get(api_url(&self.base_url, "api/tags"))
            .timeout(METADATA_TIMEOUT)
            .send()
            .await?;
        let tags: TagsResponse = Self::decode(Self::check_status(response).await?).await?;
        Ok(tags.models.into_iter().map(|model| model.name).collect())
    }

    /// Non-streaming chat.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &SamplingOptions,
    ) -> Result<String, ClientError> {
        let response = self.chat_request(model, messages, options).await?;
        Ok(response
            .message
            .map(|message| message.content)
            .unwrap_or_default())
    }

    /// Non-streaming chat plus per-call performance counters.
    pub async fn chat_with_metrics(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &SamplingOptions,
    ) -> Result<(String, ChatMetrics), ClientError> {
        let started = Instant::now();
        let response = self.chat_request(model, messages, options).await?;
        let metrics = ChatMetrics::from_response(&response, started.elapsed());
        let content = response
            .message
            .map(|message| message.content)
            .unwrap_or_default();
        Ok((content, metrics))
    }

    async fn chat_request(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &SamplingOptions,
    ) -> Result<ChatResponse, ClientError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            stream: false,
            options: options.clone(),
        };

        let response = self
            .http
            .post(api_url(&self.base_url, "api/chat"))
            .timeout(self.chat_timeout)
            .json(&request)
            .send()
            .await?;
        let payload: ChatResponse = Self::decode(Self::check_status(response).await?).await?;
        if let Some(message) = payload.error {
            return Err(ClientError::Api(message));
        }
        Ok(payload)
    }

    /// Ask the server to evict a model from memory. Best-effort.
    pub async fn unload_model(&self, model: &str) -> bool {
        self.set_keep_alive(model, 0).await
    }

    /// Ask the server to keep a model resident for `duration_secs`.
    pub async fn keep_model_loaded(&self, model: &str, duration_secs: u64) -> bool {
        self.set_keep_alive(model, duration_secs).await
    }

    async fn set_keep_alive(&self, model: &str, keep_alive: u64) -> bool {
        let request = KeepAliveRequest { model, keep_alive };
        let result = self
            .http
            .post(api_url(&self.base_url, "api/generate"))
            .timeout(METADATA_TIMEOUT)
            .json(&request)
            .send()
            .await;
        match result {
            Ok(_) => true,
            Err(err) => {
                debug!(%err, model, keep_alive, "keep_alive request failed");
                false
            }
        }
    }

    pub async fn embeddings(&self, model: &str, prompt: &str) -> Result<Vec<f32>, ClientError> {
        let request = EmbeddingsRequest { model, prompt };
        let response = self
            .http
            .post(api_url(&self.base_url, "api/embeddings"))
            .timeout(METADATA_TIMEOUT)
            .json(&request)
            .send()
            .await?;
        let payload: EmbeddingsResponse = Self::decode(Self::check_status(response).await?).await?;
        Ok(payload.embedding)
    }

    /// Lightweight reachability probe. `false` means "do not proceed".
    pub async fn is_available(&self) -> bool {
        let result = self
            .http
            .get(api_url(&self.base_url, "api/tags"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(%err, "availability probe failed");
                false
            }
        }
    }

    pub async fn server_version(&self) -> Option<String> {
        let response = self
            .http
            .get(api_url(&self.base_url, "api/version"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .ok()?;
        let payload: VersionResponse = response.error_for_status().ok()?.json().await.ok()?;
        Some(payload.version)
    }

    /// Fetch and flatten server-reported model metadata.
    pub async fn model_details(&self, model: &str) -> Result<ModelDetails, ClientError> {
        let request = ShowRequest { name: model };
        let response = self
            .http
            .post(api_url(&self.base_url, "api/show"))
            .timeout(METADATA_TIMEOUT)
            .json(&request)
            .send()
            .await?;
        let show: ShowResponse = Self::decode(Self::check_status(response).await?).await?;
        Ok(ModelDetails::from_show(model, show))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status { status, body })
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|source| ClientError::Malformed(format!("{source}")))
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &SamplingOptions,
    ) -> Result<String, ClientError> {
        OllamaClient::chat(self, model, messages, options).await
    }

    async fn chat_with_metrics(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &SamplingOptions,
    ) -> Result<(String, ChatMetrics), ClientError> {
        OllamaClient::chat_with_metrics(self, model, messages, options).await
    }

    fn chat_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        options: SamplingOptions,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<StreamEvent> {
        spawn_chat_stream(StreamParams {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            model: model.to_string(),
            messages,
            options,
            timeout: self.chat_timeout,
            cancel,
        })
    }
}
