use crate::executor::history::DEFAULT_MAX_ENTRIES;
use crate::executor::validation::{DEFAULT_DESTRUCTIVE_COMMANDS, DEFAULT_FORBIDDEN_PATTERNS};
use crate::executor::DEFAULT_TIMEOUT;
use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone, Default, Validate)]
#[serde(default)]
pub struct Config {
    #[validate]
    pub ai: AIConfig,
    pub security: SecurityConfig,
    #[validate]
    pub execution: ExecutionConfig,
    #[validate]
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct AIConfig {
    pub provider: AIProvider,
    #[validate(length(min = 1, message = "Model name cannot be empty"))]
    pub model: String,
    #[validate(range(min = 1, message = "max_tokens must be positive"))]
    pub max_tokens: u32,
    #[validate(range(min = 0.0, max = 2.0, message = "Temperature must be between 0 and 2"))]
    pub temperature: f32,
    #[validate(range(min = 1, message = "Request timeout must be at least one second"))]
    pub request_timeout_secs: u64,
    pub groq_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub api_url: Option<String>,
}

impl Default for AIConfig {
    fn default() -> Self {
        Self {
            provider: AIProvider::Groq,
            model: AIProvider::Groq.default_model().to_string(),
            max_tokens: 1024,
            temperature: 0.1,
            request_timeout_secs: 60,
            groq_api_key: None,
            openai_api_key: None,
            anthropic_api_key: None,
            api_url: None,
        }
    }
}

impl AIConfig {
    pub fn api_key(&self) -> Option<&str> {
        let key = match self.provider {
            AIProvider::Groq => self.groq_api_key.as_deref(),
            AIProvider::OpenAI => self.openai_api_key.as_deref(),
            AIProvider::Anthropic => self.anthropic_api_key.as_deref(),
        };
        key.filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum AIProvider {
    Groq,
    OpenAI,
    Anthropic,
}

impl AIProvider {
    pub fn default_model(&self) -> &'static str {
        match self {
            AIProvider::Groq => "llama-3.3-70b-versatile",
            AIProvider::OpenAI => "gpt-4o-mini",
            AIProvider::Anthropic => "claude-3-5-haiku-latest",
        }
    }

    pub fn default_api_url(&self) -> &'static str {
        match self {
            AIProvider::Groq => "https://api.groq.com/openai/v1/chat/completions",
            AIProvider::OpenAI => "https://api.openai.com/v1/chat/completions",
            AIProvider::Anthropic => "https://api.anthropic.com/v1/messages",
        }
    }

    pub fn api_key_var(&self) -> &'static str {
        match self {
            AIProvider::Groq => "GROQ_API_KEY",
            AIProvider::OpenAI => "OPENAI_API_KEY",
            AIProvider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl FromStr for AIProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(AIProvider::Groq),
            "openai" => Ok(AIProvider::OpenAI),
            "anthropic" => Ok(AIProvider::Anthropic),
            other => Err(anyhow!("Unknown AI provider: {}", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    pub destructive_commands: Vec<String>,
    pub forbidden_patterns: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            destructive_commands: DEFAULT_DESTRUCTIVE_COMMANDS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            forbidden_patterns: DEFAULT_FORBIDDEN_PATTERNS
                .iter()
                .map(|(p, _)| p.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct ExecutionConfig {
    #[validate(range(min = 1, message = "Command timeout must be at least one second"))]
    pub timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct HistoryConfig {
    #[validate(range(min = 1, message = "History must keep at least one entry"))]
    pub max_entries: usize,
    pub persist: bool,
    pub file: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            persist: true,
            file: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: Option<PathBuf>,
    pub verbose: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub show_execution_time: bool,
    pub color_output: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_execution_time: false,
            color_output: true,
        }
    }
}

impl Config {
    pub fn create_default(path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(&Config::default())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Invalid config file {:?}", path))
    }

    /// Loads the config file when present, otherwise the built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Applies environment overrides. `lookup` resolves a variable name.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = lookup("TERMPAL_PROVIDER") {
            let provider: AIProvider = provider.parse()?;
            if provider != self.ai.provider {
                self.ai.model = provider.default_model().to_string();
            }
            self.ai.provider = provider;
        }
        if let Some(key) = lookup("GROQ_API_KEY") {
            self.ai.groq_api_key = Some(key);
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.ai.openai_api_key = Some(key);
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.ai.anthropic_api_key = Some(key);
        }
        if let Some(model) = lookup("TERMPAL_MODEL") {
            self.ai.model = model;
        }
        if let Some(temperature) = lookup("TERMPAL_TEMPERATURE") {
            self.ai.temperature = temperature
                .trim()
                .parse()
                .with_context(|| format!("TERMPAL_TEMPERATURE is not a number: {}", temperature))?;
        }
        if lookup("TERMPAL_VERBOSE")
            .or_else(|| lookup("VERBOSE"))
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false)
        {
            self.logging.verbose = true;
        }
        Ok(())
    }

    /// Checks value ranges and that the selected provider has a credential.
    pub fn ensure_usable(&self) -> Result<()> {
        self.validate()
            .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

        if self.ai.api_key().is_none() {
            return Err(anyhow!(
                "No API key configured for {:?}. Set {} or add it to the config file.",
                self.ai.provider,
                self.ai.provider.api_key_var()
            ));
        }
        Ok(())
    }

    pub fn history_path(&self) -> Result<PathBuf> {
        match &self.history.file {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("command_history.json")),
        }
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        match &self.logging.file {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("assistant.log")),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "termpal", "termpal")
        .ok_or_else(|| anyhow!("Could not determine config directory"))
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        Config::create_default(&path).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.ai.provider, AIProvider::Groq);
        assert_eq!(config.execution.timeout_secs, 10);
        assert_eq!(config.history.max_entries, 10);
        assert!(config.security.destructive_commands.contains(&"rm".to_string()));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("[ai]\nmodel = \"custom-model\"\n").unwrap();
        assert_eq!(config.ai.model, "custom-model");
        assert_eq!(config.ai.temperature, 0.1);
        assert_eq!(config.execution.timeout_secs, 10);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("GROQ_API_KEY", "gsk_test"),
                ("TERMPAL_MODEL", "mixtral-8x7b-32768"),
                ("TERMPAL_TEMPERATURE", "0.3"),
                ("VERBOSE", "1"),
            ]))
            .unwrap();

        assert_eq!(config.ai.api_key(), Some("gsk_test"));
        assert_eq!(config.ai.model, "mixtral-8x7b-32768");
        assert!((config.ai.temperature - 0.3).abs() < f32::EPSILON);
        assert!(config.logging.verbose);
        assert!(config.ensure_usable().is_ok());
    }

    #[test]
    fn test_provider_switch_selects_matching_key() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("TERMPAL_PROVIDER", "anthropic"),
                ("GROQ_API_KEY", "gsk_test"),
            ]))
            .unwrap();

        assert_eq!(config.ai.provider, AIProvider::Anthropic);
        assert_eq!(config.ai.model, AIProvider::Anthropic.default_model());
        assert!(config.ai.api_key().is_none());
        assert!(config.ensure_usable().is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = Config::default();
        assert!(config.apply_env(env(&[("TERMPAL_TEMPERATURE", "warm")])).is_err());

        config.ai.groq_api_key = Some("gsk_test".to_string());
        config.ai.temperature = 3.5;
        assert!(config.ensure_usable().is_err());
    }
}
