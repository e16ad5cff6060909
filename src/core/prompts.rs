//! Built-in system prompt templates, merged with user-defined ones from the
//! config file. User entries shadow built-ins with the same id.

use crate::core::config::{Config, PromptTemplate};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct BuiltinPromptConfig {
    prompts: Vec<PromptTemplate>,
}

pub fn load_builtin_prompts() -> Vec<PromptTemplate> {
    const CONFIG_CONTENT: &str = include_str!("../builtins/prompts.toml");
    let config: BuiltinPromptConfig =
        toml::from_str(CONFIG_CONTENT).expect("Failed to parse builtins/prompts.toml");
    config.prompts
}

pub fn resolve_prompts(config: &Config) -> Vec<PromptTemplate> {
    let mut templates = load_builtin_prompts();
    for user_template in &config.system_prompts {
        match templates
            .iter_mut()
            .find(|template| template.id == user_template.id)
        {
            Some(existing) => *existing = user_template.clone(),
            None => templates.push(user_template.clone()),
        }
    }
    templates
}

pub fn find_prompt<'a>(templates: &'a [PromptTemplate], id: &str) -> Option<&'a str> {
    templates
        .iter()
        .find(|template| template.id.eq_ignore_ascii_case(id))
        .map(|template| template.text.as_str())
}
