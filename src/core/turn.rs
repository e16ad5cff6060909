//! Chat turn orchestration.
//!
//! One turn: append the user prompt, build the model context, stream from
//! one or many models, and commit exactly one assistant message back to the
//! store. Transport failures are rendered into the committed text so a user
//! turn is never silently dropped. The store lock is never held across a
//! network await.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::{ChatMessage, SamplingOptions};
use crate::core::backend::ChatBackend;
use crate::core::chat_stream::StreamEvent;
use crate::core::message::{Message, Role};
use crate::core::store::{SharedStore, StoreError};

#[derive(Debug)]
pub enum TurnError {
    Store(StoreError),
    /// A turn needs at least one target model.
    NoModels,
    /// Regeneration was pointed at a message that is not an assistant reply.
    NotAssistantMessage { index: usize },
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnError::Store(source) => write!(f, "{source}"),
            TurnError::NoModels => write!(f, "no target models supplied for this turn"),
            TurnError::NotAssistantMessage { index } => {
                write!(f, "message at index {index} is not an assistant message")
            }
        }
    }
}

impl StdError for TurnError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            TurnError::Store(source) => Some(source),
            _ => None,
        }
    }
}

impl From<StoreError> for TurnError {
    fn from(source: StoreError) -> Self {
        TurnError::Store(source)
    }
}

/// Live-display events, forwarded in emission order per model. No ordering
/// holds between different models' fragments. Dropping the receiver detaches
/// the display; the turn still completes and commits in the background.
#[derive(Debug)]
pub enum TurnEvent {
    Fragment { model: String, text: String },
    ModelDone { model: String, text: String },
    Committed(Message),
}

pub struct TurnRequest {
    pub conversation_id: String,
    pub prompt: String,
    /// Target models; one streams straight through, several run a
    /// comparison. Must be non-empty.
    pub models: Vec<String>,
    /// Whose response gets committed in a comparison. Falls back to the
    /// first model when absent or not among `models`.
    pub primary: Option<String>,
    pub system_prompt: Option<String>,
    pub options: SamplingOptions,
}

pub struct RegenerateRequest {
    pub conversation_id: String,
    /// Index of the assistant message to replace; it and everything after
    /// it are discarded.
    pub message_index: usize,
    pub models: Vec<String>,
    pub primary: Option<String>,
    pub system_prompt: Option<String>,
    pub options: SamplingOptions,
}

pub struct TurnOrchestrator {
    store: SharedStore,
    backend: Arc<dyn ChatBackend>,
}

impl TurnOrchestrator {
    pub fn new(store: SharedStore, backend: Arc<dyn ChatBackend>) -> Self {
        Self { store, backend }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Run one full turn and return the committed assistant message.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        sink: &mpsc::UnboundedSender<TurnEvent>,
    ) -> Result<Message, TurnError> {
        if request.models.is_empty() {
            return Err(TurnError::NoModels);
        }

        let context = {
            let mut store = self.store.lock().await;
            store.append_message(&request.conversation_id, Role::User, &request.prompt)?;
            let conversation = store.get(&request.conversation_id)?;
            build_context(request.system_prompt.as_deref(), conversation.messages())
        };

        self.finish_turn(
            &request.conversation_id,
            &request.models,
            request.primary.as_deref(),
            context,
            &request.options,
            sink,
        )
        .await
    }

    /// Replay the turn that produced the assistant message at
    /// `message_index`: truncate it (and everything after) away, then stream
    /// a fresh response against the shortened history.
    pub async fn regenerate(
        &self,
        request: RegenerateRequest,
        sink: &mpsc::UnboundedSender<TurnEvent>,
    ) -> Result<Message, TurnError> {
        if request.models.is_empty() {
            return Err(TurnError::NoModels);
        }

        let context = {
            let mut store = self.store.lock().await;
            {
                let conversation = store.get(&request.conversation_id)?;
                let messages = conversation.messages();
                let target = messages.get(request.message_index).ok_or(
                    StoreError::IndexOutOfRange {
                        index: request.message_index,
                        len: messages.len(),
                    },
                )?;
                if !target.role.is_assistant() {
                    return Err(TurnError::NotAssistantMessage {
                        index: request.message_index,
                    });
                }
            }
            store.truncate_after(&request.conversation_id, request.message_index)?;
            let conversation = store.get(&request.conversation_id)?;
            build_context(request.system_prompt.as_deref(), conversation.messages())
        };

        self.finish_turn(
            &request.conversation_id,
            &request.models,
            request.primary.as_deref(),
            context,
            &request.options,
            sink,
        )
        .await
    }

    async fn finish_turn(
        &self,
        conversation_id: &str,
        models: &[String],
        primary: Option<&str>,
        context: Vec<ChatMessage>,
        options: &SamplingOptions,
        sink: &mpsc::UnboundedSender<TurnEvent>,
    ) -> Result<Message, TurnError> {
        let final_text = if models.len() == 1 {
            self.collect_stream(&models[0], context, options, sink).await
        } else {
            self.run_comparison(models, primary, context, options, sink)
                .await
        };

        let committed = {
            let mut store = self.store.lock().await;
            store.append_message(conversation_id, Role::Assistant, &final_text)?
        };
        let _ = sink.send(TurnEvent::Committed(committed.clone()));
        Ok(committed)
    }

    /// Consume one model's stream to completion, forwarding fragments as
    /// they arrive. A transport failure is rendered into the accumulated
    /// text; there is no automatic retry.
    async fn collect_stream(
        &self,
        model: &str,
        context: Vec<ChatMessage>,
        options: &SamplingOptions,
        sink: &mpsc::UnboundedSender<TurnEvent>,
    ) -> String {
        let mut rx =
            self.backend
                .chat_stream(model, context, options.clone(), CancellationToken::new());
        let mut accumulated = String::new();

        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Chunk(text) => {
                    accumulated.push_str(&text);
                    let _ = sink.send(TurnEvent::Fragment {
                        model: model.to_string(),
                        text,
                    });
                }
                StreamEvent::Error(err) => {
                    let rendered = render_stream_failure(&accumulated, &err.to_string());
                    let _ = sink.send(TurnEvent::Fragment {
                        model: model.to_string(),
                        text: rendered.clone(),
                    });
                    accumulated.push_str(&rendered);
                }
                StreamEvent::End(_) => break,
            }
        }

        let _ = sink.send(TurnEvent::ModelDone {
            model: model.to_string(),
            text: accumulated.clone(),
        });
        accumulated
    }

    /// Compare N, persist 1: every model streams concurrently with its own
    /// accumulator; only the primary's (else the first model's) text is
    /// committed to the conversation.
    async fn run_comparison(
        &self,
        models: &[String],
        primary: Option<&str>,
        context: Vec<ChatMessage>,
        options: &SamplingOptions,
        sink: &mpsc::UnboundedSender<TurnEvent>,
    ) -> String {
        let streams = models.iter().map(|model| {
            let context = context.clone();
            async move {
                (
                    model.as_str(),
                    self.collect_stream(model, context, options, sink).await,
                )
            }
        });
        let outputs: Vec<(&str, String)> = futures_util::future::join_all(streams).await;

        let chosen = primary.filter(|name| models.iter().any(|model| model == name));
        let committed = match chosen {
            Some(name) => outputs
                .iter()
                .find(|(model, _)| *model == name)
                .map(|(_, text)| text.clone()),
            None => outputs.first().map(|(_, text)| text.clone()),
        };
        committed.unwrap_or_default()
    }
}

fn build_context(system_prompt: Option<&str>, messages: &[Message]) -> Vec<ChatMessage> {
    let mut context = Vec::with_capacity(messages.len() + 1);
    if let Some(prompt) = system_prompt {
        if !prompt.trim().is_empty() {
            context.push(ChatMessage::new("system", prompt));
        }
    }
    for message in messages {
        context.push(ChatMessage::new(message.role.as_str(), &message.content));
    }
    context
}

/// Failure text appended to whatever already streamed, so the conversation
/// always shows something for the turn.
fn render_stream_failure(accumulated: &str, detail: &str) -> String {
    if accumulated.is_empty() {
        format!("Error: {detail}")
    } else {
        format!("\n\nError: {detail}")
    }
}
