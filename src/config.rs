//! Runtime configuration, loaded from TOML with every field defaulted.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::attachment::MAX_ATTACHMENT_BYTES;
use crate::error::ConfigError;
use crate::quiz::{QUIZ_LENGTH, QUIZ_TIME_BUDGET_SECS};

/// File picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "source-analyst.toml";

pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: String,
    pub api_base: String,
    /// Falls back to `GEMINI_API_KEY`, then `API_KEY`.
    pub api_key: Option<String>,
    /// Low temperature keeps chat answers factual.
    pub chat_temperature: f32,
    pub quiz_temperature: f32,
    pub max_attachment_bytes: u64,
    pub quiz_timer_enabled: bool,
    pub quiz_time_budget_secs: u32,
    pub quiz_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            chat_temperature: 0.2,
            quiz_temperature: 0.5,
            max_attachment_bytes: MAX_ATTACHMENT_BYTES,
            quiz_timer_enabled: true,
            quiz_time_budget_secs: QUIZ_TIME_BUDGET_SECS,
            quiz_length: QUIZ_LENGTH,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load `explicit` if given, else [`DEFAULT_CONFIG_FILE`] when it exists,
    /// else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// The configured key, or the first non-empty environment fallback.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()))
            .or_else(|| std::env::var("API_KEY").ok().filter(|k| !k.is_empty()))
    }

    /// Countdown budget for new quizzes, `None` when the timer is off.
    pub fn quiz_timer(&self) -> Option<u32> {
        self.quiz_timer_enabled.then_some(self.quiz_time_budget_secs)
    }
}
