//! Configuration loading.
//!
//! Settings come from a TOML file in the platform config directory, with
//! `OLLAMA_HOST`, `OLLAMA_PORT`, and `OLLAMA_TIMEOUT` environment variables
//! taking precedence. A missing file yields the defaults.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::api::client::DEFAULT_CHAT_TIMEOUT_SECS;

/// A named system prompt. User-defined entries shadow built-ins by id.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PromptTemplate {
    pub id: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub chat_timeout_secs: u64,
    pub default_model: Option<String>,
    pub benchmark_iterations: usize,
    pub benchmark_prompt: String,
    pub system_prompts: Vec<PromptTemplate>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 11434,
            chat_timeout_secs: DEFAULT_CHAT_TIMEOUT_SECS,
            default_model: None,
            benchmark_iterations: 3,
            benchmark_prompt: "Hello, how are you?".to_string(),
            system_prompts: Vec::new(),
        }
    }
}

/// Errors that can occur when loading configuration from disk.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config at {}: {}", path.display(), source)
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl Config {
    pub fn load() -> Result<Config, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) => Self::load_from_path(&path)?,
            None => Config::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ollama-chat")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            if !host.is_empty() {
                self.host = host;
            }
        }
        if let Ok(port) = std::env::var("OLLAMA_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
        if let Ok(timeout) = std::env::var("OLLAMA_TIMEOUT") {
            if let Ok(timeout) = timeout.parse() {
                self.chat_timeout_secs = timeout;
            }
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_point_at_local_server() {
        let config = Config::default();
        assert_eq!(config.base_url(), "http://localhost:11434");
        assert_eq!(config.chat_timeout_secs, 300);
        assert_eq!(config.benchmark_iterations, 3);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().expect("tempdir");
        let config = Config::load_from_path(&dir.path().join("absent.toml")).expect("load");
        assert_eq!(config.port, 11434);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
host = "192.168.1.20"
port = 11435
default_model = "llama3"

[[system_prompts]]
id = "pirate"
text = "You are a pirate."
"#,
        )
        .expect("write config");

        let config = Config::load_from_path(&path).expect("load");
        assert_eq!(config.base_url(), "http://192.168.1.20:11435");
        assert_eq!(config.default_model.as_deref(), Some("llama3"));
        assert_eq!(config.system_prompts.len(), 1);
        assert_eq!(config.system_prompts[0].id, "pirate");
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "host = [not toml").expect("write config");

        let err = Config::load_from_path(&path).expect_err("should fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn env_overrides_take_precedence() {
        // Env vars are process-global; mutate and restore carefully.
        let saved: Vec<(&str, Option<String>)> = ["OLLAMA_HOST", "OLLAMA_PORT", "OLLAMA_TIMEOUT"]
            .iter()
            .map(|key| (*key, std::env::var(key).ok()))
            .collect();

        std::env::set_var("OLLAMA_HOST", "10.0.0.5");
        std::env::set_var("OLLAMA_PORT", "12345");
        std::env::set_var("OLLAMA_TIMEOUT", "60");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.base_url(), "http://10.0.0.5:12345");
        assert_eq!(config.chat_timeout_secs, 60);

        for (key, value) in saved {
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}
