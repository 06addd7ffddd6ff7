use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Everything the server needs at startup. Built once in `main` and handed to each component.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub interpreter: LlmConfig,
    pub generator: ImageGenConfig,
}

impl Config {
    /// Load the configuration from a JSON file. Missing sections keep their defaults.
    pub fn load(json_path: &str) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(json_path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// Fill in any credential not already set from the environment (or `.env`).
    ///
    /// `LLM_API_KEY` and `IMAGE_API_KEY` are specific to each provider; `OPENAI_API_KEY` covers both.
    pub fn fill_credentials_from_env(&mut self) {
        if self.interpreter.api_key.is_none() {
            self.interpreter.api_key = credential("LLM_API_KEY");
        }
        if self.generator.api_key.is_none() {
            self.generator.api_key = credential("IMAGE_API_KEY");
        }
    }
}

fn credential(name: &str) -> Option<String> {
    dotenvy::var(name)
        .or_else(|_| dotenvy::var("OPENAI_API_KEY"))
        .ok()
        .filter(|key| !key.trim().is_empty())
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub tls: Option<TLSConfig>,
    /// Largest request body accepted, in bytes
    pub max_body_bytes: usize,
    /// Write JSON logs to a daily rolling file here instead of stdout
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:5000".into(),
            tls: None,
            max_body_bytes: 20_000_000,
            log_dir: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TLSConfig {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/uploads"),
        }
    }
}

/// The chat model that turns commands into actions. Without an `api_key` only keyword parsing is used.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            timeout_secs: 30,
        }
    }
}

/// The text-to-image provider behind the `generate` action.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ImageGenConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub size: String,
    pub timeout_secs: u64,
}

impl ImageGenConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ImageGenConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.openai.com/v1/images/generations".into(),
            model: "dall-e-3".into(),
            size: "1024x1024".into(),
            timeout_secs: 60,
        }
    }
}
