//! Interactive chat loop.
//!
//! A line-oriented REPL over stdin: plain lines become chat turns, lines
//! starting with `/` are commands against the in-memory conversation store.

use std::error::Error;
use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;

use crate::api::{OllamaClient, SamplingOptions};
use crate::cli::bench::resolve_model;
use crate::cli::model_list::offline_error;
use crate::core::config::Config;
use crate::core::store::{shared, ConversationStore, SharedStore};
use crate::core::turn::{RegenerateRequest, TurnEvent, TurnOrchestrator, TurnRequest};
use crate::export;

pub async fn run_chat(
    client: Arc<OllamaClient>,
    config: &Config,
    model_flag: Option<String>,
    system_prompt: Option<String>,
    options: SamplingOptions,
) -> Result<(), Box<dyn Error>> {
    if !client.is_available().await {
        return Err(offline_error(client.base_url()));
    }

    let model = resolve_model(&client, config, model_flag).await?;
    let store = shared(ConversationStore::new());
    let orchestrator = TurnOrchestrator::new(store.clone(), client.clone());

    println!("Connected to {} (model: {model})", client.base_url());
    println!("Type a message, /help for commands, /quit to exit.");

    let mut session = ChatSession {
        model,
        system_prompt,
        options,
        orchestrator,
        store,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if !session.handle_command(command, &mut lines).await? {
                break;
            }
        } else {
            session.send(line, None).await;
        }
    }
    Ok(())
}

struct ChatSession {
    model: String,
    system_prompt: Option<String>,
    options: SamplingOptions,
    orchestrator: TurnOrchestrator,
    store: SharedStore,
}

impl ChatSession {
    /// Returns `false` when the session should end. Commands that need more
    /// input (`/compare`) read it from the session's own line reader so no
    /// buffered bytes are stranded in a second reader.
    async fn handle_command<R>(
        &mut self,
        command: &str,
        lines: &mut Lines<R>,
    ) -> Result<bool, Box<dyn Error>>
    where
        R: AsyncBufRead + Unpin,
    {
        let (name, rest) = match command.split_once(' ') {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };

        match name {
            "quit" | "exit" => return Ok(false),
            "help" => print_help(),
            "new" => {
                let id = self.store.lock().await.create_conversation();
                println!("Started {id}");
            }
            "list" => {
                let summaries = self.store.lock().await.list();
                let active = self.store.lock().await.active_id().to_string();
                for summary in summaries {
                    let marker = if summary.id == active { "*" } else { " " };
                    println!(
                        "{marker} {}  {} ({} messages)",
                        summary.id, summary.title, summary.message_count
                    );
                }
            }
            "switch" => {
                let mut store = self.store.lock().await;
                match store.select(rest) {
                    Ok(()) => println!("Switched to {}", store.active().title()),
                    Err(err) => println!("Error: {err}"),
                }
            }
            "delete" => {
                let mut store = self.store.lock().await;
                let id = if rest.is_empty() {
                    store.active_id().to_string()
                } else {
                    rest.to_string()
                };
                match store.delete(&id) {
                    Ok(()) => println!("Deleted {id}; now on {}", store.active().title()),
                    Err(err) => println!("Error: {err}"),
                }
            }
            "search" => {
                if rest.is_empty() {
                    println!("Usage: /search <text>");
                } else {
                    let hits = self.store.lock().await.search(rest);
                    if hits.is_empty() {
                        println!("No matches.");
                    }
                    for hit in hits {
                        println!(
                            "[{}] {}: {}",
                            hit.conversation_title,
                            hit.message.role.as_str(),
                            hit.message.content
                        );
                    }
                }
            }
            "edit" => self.edit(rest).await,
            "export" => self.export(rest).await?,
            "regen" => self.regenerate().await,
            "compare" => {
                let models: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
                match models.len() {
                    0 | 1 => println!("Usage: /compare <model> <model> [more...] then type the prompt"),
                    _ => {
                        print!("prompt> ");
                        std::io::stdout().flush()?;
                        if let Some(prompt) = lines.next_line().await? {
                            let prompt = prompt.trim().to_string();
                            if !prompt.is_empty() {
                                self.send(&prompt, Some(models)).await;
                            }
                        }
                    }
                }
            }
            _ => println!("Unknown command: /{name} (try /help)"),
        }
        Ok(true)
    }

    /// Run one turn. `compare` overrides the session model; the session
    /// model stays the committed (primary) one.
    async fn send(&self, prompt: &str, compare: Option<Vec<String>>) {
        let comparison = compare.is_some();
        let models = compare.unwrap_or_else(|| vec![self.model.clone()]);
        let conversation_id = self.store.lock().await.active_id().to_string();

        let (tx, rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(print_events(rx, comparison));

        let request = TurnRequest {
            conversation_id,
            prompt: prompt.to_string(),
            models,
            primary: None,
            system_prompt: self.system_prompt.clone(),
            options: self.options.clone(),
        };
        let result = self.orchestrator.run_turn(request, &tx).await;
        drop(tx);
        let _ = printer.await;

        if let Err(err) = result {
            println!("Error: {err}");
        }
    }

    /// Rewrite one message in place. Numbers are 1-based in transcript
    /// order; the edit keeps the message's id, timestamp, and position.
    async fn edit(&self, rest: &str) {
        let parsed = rest.split_once(' ').and_then(|(number, text)| {
            let text = text.trim();
            match number.parse::<usize>() {
                Ok(number) if number >= 1 && !text.is_empty() => Some((number, text)),
                _ => None,
            }
        });
        let Some((number, text)) = parsed else {
            println!("Usage: /edit <number> <new text>");
            return;
        };

        let mut store = self.store.lock().await;
        let conversation_id = store.active_id().to_string();
        let message_id = store
            .active()
            .messages()
            .get(number - 1)
            .map(|message| message.id.clone());
        match message_id {
            Some(message_id) => match store.edit_message(&conversation_id, &message_id, text) {
                Ok(()) => println!("Edited message {number}"),
                Err(err) => println!("Error: {err}"),
            },
            None => println!("No message number {number}"),
        }
    }

    async fn regenerate(&self) {
        let (conversation_id, index) = {
            let store = self.store.lock().await;
            let id = store.active_id().to_string();
            let index = store
                .active()
                .messages()
                .iter()
                .rposition(|message| message.role.is_assistant());
            (id, index)
        };
        let Some(index) = index else {
            println!("Nothing to regenerate yet.");
            return;
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(print_events(rx, false));

        let request = RegenerateRequest {
            conversation_id,
            message_index: index,
            models: vec![self.model.clone()],
            primary: None,
            system_prompt: self.system_prompt.clone(),
            options: self.options.clone(),
        };
        let result = self.orchestrator.regenerate(request, &tx).await;
        drop(tx);
        let _ = printer.await;

        if let Err(err) = result {
            println!("Error: {err}");
        }
    }

    async fn export(&self, rest: &str) -> Result<(), Box<dyn Error>> {
        let mut parts = rest.split_whitespace();
        let format = parts.next().unwrap_or("");
        let path = parts.next();

        let conversation = {
            let store = self.store.lock().await;
            store.active().clone()
        };
        let conversations = std::slice::from_ref(&conversation);

        let (content, extension) = match format {
            "json" => (export::to_json(conversations)?, "json"),
            "markdown" | "md" => (export::to_markdown(conversations), "md"),
            "csv" => (export::to_csv(conversations), "csv"),
            _ => {
                println!("Usage: /export <json|markdown|csv> [path]");
                return Ok(());
            }
        };

        let path = match path {
            Some(path) => path.to_string(),
            None => format!("{}.{extension}", conversation.id()),
        };
        std::fs::write(&path, content)?;
        println!("Exported {} to {path}", conversation.title());
        Ok(())
    }
}

/// Drains turn events to stdout. Single-model turns stream fragments as
/// they arrive; comparisons stay quiet until each model finishes, then
/// print the full response under a header.
async fn print_events(mut rx: mpsc::UnboundedReceiver<TurnEvent>, comparison: bool) {
    while let Some(event) = rx.recv().await {
        match event {
            TurnEvent::Fragment { text, .. } if !comparison => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            TurnEvent::Fragment { .. } => {}
            TurnEvent::ModelDone { model, text } => {
                if comparison {
                    println!("━━━ {model} ━━━");
                    println!("{text}");
                } else {
                    println!();
                }
            }
            TurnEvent::Committed(_) => {}
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /new               Start a new conversation");
    println!("  /list              List conversations (* marks the active one)");
    println!("  /switch <id>       Switch to another conversation");
    println!("  /delete [id]       Delete a conversation (active by default)");
    println!("  /search <text>     Search messages across conversations");
    println!("  /edit <n> <text>   Rewrite message n of this conversation");
    println!("  /regen             Regenerate the last assistant response");
    println!("  /compare <models>  Ask the next prompt of several models");
    println!("  /export <format>   Export the conversation (json, markdown, csv)");
    println!("  /quit              Exit");
}
