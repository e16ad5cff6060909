pub mod backend;
pub mod bench;
pub mod chat_stream;
pub mod config;
pub mod message;
pub mod prompts;
pub mod store;
pub mod turn;
