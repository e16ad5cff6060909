//! The `compare` subcommand: one prompt, many models, all answers printed.

use std::error::Error;
use std::sync::Arc;

use crate::api::{ChatMessage, OllamaClient, SamplingOptions};
use crate::cli::model_list::offline_error;
use crate::core::backend::ChatBackend;

pub async fn run_compare(
    client: Arc<OllamaClient>,
    models: &[String],
    prompt: &str,
    system_prompt: Option<String>,
    options: &SamplingOptions,
) -> Result<(), Box<dyn Error>> {
    if !client.is_available().await {
        return Err(offline_error(client.base_url()));
    }

    let mut messages = Vec::new();
    if let Some(system) = system_prompt {
        messages.push(ChatMessage::new("system", system));
    }
    messages.push(ChatMessage::new("user", prompt));

    let mut results = client.compare_models(models, &messages, options).await;

    // HashMap order is arbitrary; report in the order the user asked for.
    for model in models {
        println!("━━━ {model} ━━━");
        match results.remove(model) {
            Some(Ok(text)) => println!("{text}"),
            Some(Err(err)) => println!("Error: {err}"),
            None => println!("Error: no response recorded"),
        }
        println!();
    }
    Ok(())
}
