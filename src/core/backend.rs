//! Seam between the orchestration layer and the inference transport.
//!
//! The orchestrator and benchmark runner only see this trait, so tests drive
//! them with scripted backends instead of a live server.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::{ChatMessage, ChatMetrics, ClientError, SamplingOptions};
use crate::core::chat_stream::StreamEvent;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Single-shot chat; the whole response text in one value.
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &SamplingOptions,
    ) -> Result<String, ClientError>;

    /// Single-shot chat plus per-call performance counters.
    async fn chat_with_metrics(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &SamplingOptions,
    ) -> Result<(String, ChatMetrics), ClientError>;

    /// Streaming chat. The returned receiver yields fragments in transport
    /// order and terminates with [`StreamEvent::End`]; cancelling the token
    /// aborts the underlying transfer.
    fn chat_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        options: SamplingOptions,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<StreamEvent>;

    /// Dispatch one chat call per model, concurrently. Bounded only by the
    /// number of requested models; each model's failure is captured in its
    /// own map entry and never aborts the others.
    async fn compare_models(
        &self,
        models: &[String],
        messages: &[ChatMessage],
        options: &SamplingOptions,
    ) -> HashMap<String, Result<String, ClientError>> {
        let calls = models.iter().map(|model| async move {
            (model.clone(), self.chat(model, messages, options).await)
        });
        join_all(calls).await.into_iter().collect()
    }
}
