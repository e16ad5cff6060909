//! Ollama-chat is a terminal chat client for a locally running Ollama
//! inference server.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`api`] speaks the server's HTTP interface: payload types, the
//!   blocking-call client, and the NDJSON streaming decoder.
//! - [`core`] owns everything above the wire: the in-memory conversation
//!   store, turn orchestration, model benchmarking, configuration, and the
//!   built-in system-prompt templates.
//! - [`export`] serializes conversations to JSON, Markdown, and CSV.
//! - [`cli`] parses arguments and drives the interactive chat loop and the
//!   one-shot subcommands.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod export;
pub mod utils;
