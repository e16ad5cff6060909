//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the
//! appropriate commands.

pub mod bench;
pub mod chat;
pub mod compare;
pub mod model_list;

use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::api::{OllamaClient, SamplingOptions};
use crate::cli::bench::run_bench;
use crate::cli::chat::run_chat;
use crate::cli::compare::run_compare;
use crate::cli::model_list::{list_models, show_model, show_version};
use crate::core::config::Config;
use crate::core::prompts::{find_prompt, resolve_prompts};

#[derive(Parser)]
#[command(name = "ollama-chat")]
#[command(about = "A terminal chat client for a local Ollama server")]
#[command(
    long_about = "Ollama-chat is a terminal chat client for a locally running Ollama \
inference server. It streams responses token by token, keeps multiple named \
conversations in memory, and can compare or benchmark models.\n\n\
Environment Variables:\n\
  OLLAMA_HOST       Server host (default: localhost)\n\
  OLLAMA_PORT       Server port (default: 11434)\n\
  OLLAMA_TIMEOUT    Chat request timeout in seconds (default: 300)\n\n\
Commands inside chat:\n\
  /help             Show available commands\n\
  /new              Start a new conversation\n\
  /list             List conversations\n\
  /switch <id>      Switch to another conversation\n\
  /search <text>    Search messages across conversations\n\
  /edit <n> <text>  Rewrite message n of the conversation\n\
  /regen            Regenerate the last assistant response\n\
  /compare <models> Ask the same prompt of several models\n\
  /export <format>  Export the conversation (json, markdown, csv)\n\
  /quit             Exit"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use for chat (defaults to the configured model, then the
    /// first installed one)
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Server base URL, overriding config and environment
    #[arg(short = 'u', long, global = true, value_name = "URL")]
    pub url: Option<String>,

    /// System prompt: a built-in template id or literal text
    #[arg(short = 's', long, global = true, value_name = "PROMPT")]
    pub system: Option<String>,

    /// Sampling temperature
    #[arg(long, global = true)]
    pub temperature: Option<f64>,

    /// Nucleus sampling cutoff
    #[arg(long, global = true)]
    pub top_p: Option<f64>,

    /// Top-k sampling cutoff
    #[arg(long, global = true)]
    pub top_k: Option<u32>,

    /// Repetition penalty
    #[arg(long, global = true)]
    pub repeat_penalty: Option<f64>,

    /// Maximum tokens to generate per response
    #[arg(long, global = true)]
    pub num_predict: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// List models installed on the server
    Models,
    /// Show metadata for one model
    Show {
        /// Model name as reported by `models`
        model: String,
    },
    /// Benchmark a model's response speed
    Bench {
        /// Model to benchmark (defaults like chat)
        model: Option<String>,
        /// Number of timed attempts
        #[arg(short = 'n', long)]
        iterations: Option<usize>,
        /// Prompt sent on every attempt
        #[arg(short = 'p', long)]
        prompt: Option<String>,
    },
    /// Send one prompt to several models and print all responses
    Compare {
        /// Models to query
        #[arg(required = true, num_args = 2..)]
        models: Vec<String>,
        /// The prompt to send
        #[arg(short = 'p', long, required = true)]
        prompt: String,
    },
    /// Print the server version
    Version,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let config = Config::load()?;
    let client = Arc::new(match args.url.as_deref() {
        Some(url) => OllamaClient::new(url, config.chat_timeout_secs),
        None => OllamaClient::from_config(&config),
    });

    let options = sampling_options(&args);
    let system_prompt = resolve_system_prompt(&config, args.system.as_deref());

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            run_chat(client, &config, args.model, system_prompt, options).await
        }
        Commands::Models => list_models(&client).await,
        Commands::Show { model } => show_model(&client, &model).await,
        Commands::Bench {
            model,
            iterations,
            prompt,
        } => {
            let iterations = iterations.unwrap_or(config.benchmark_iterations);
            let prompt = prompt.unwrap_or_else(|| config.benchmark_prompt.clone());
            run_bench(client, &config, model, iterations, &prompt).await
        }
        Commands::Compare { models, prompt } => {
            run_compare(client, &models, &prompt, system_prompt, &options).await
        }
        Commands::Version => show_version(&client).await,
    }
}

fn sampling_options(args: &Args) -> SamplingOptions {
    let mut options = SamplingOptions::default();
    if let Some(temperature) = args.temperature {
        options.temperature = temperature;
    }
    if let Some(top_p) = args.top_p {
        options.top_p = top_p;
    }
    if let Some(top_k) = args.top_k {
        options.top_k = top_k;
    }
    if let Some(repeat_penalty) = args.repeat_penalty {
        options.repeat_penalty = repeat_penalty;
    }
    if let Some(num_predict) = args.num_predict {
        options.num_predict = num_predict;
    }
    options
}

/// Treats `--system` first as a template id, then as literal prompt text.
/// An empty resolution (the `default` template) means no system message.
fn resolve_system_prompt(config: &Config, flag: Option<&str>) -> Option<String> {
    let value = flag?;
    let templates = resolve_prompts(config);
    let text = match find_prompt(&templates, value) {
        Some(text) => text,
        None => value,
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
