//! Configuration for the validator.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{Result, ValidatorError};
use crate::scoring::{CostTable, EffectivenessPolicy, ModelPricing};
use crate::settings::ValidatorSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

/// LLM configuration for the default endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication (may be empty for local servers)
    pub api_key: String,

    /// Default model name (e.g., "gpt-4o")
    pub model: String,

    /// Maximum tokens for response (optional)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation (optional)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.0
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// An additional OpenAI-compatible endpoint, addressed by model-id prefix.
///
/// With an endpoint named `ollama`, the model id `ollama/llama3` is sent to
/// this endpoint as model `llama3`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default LLM endpoint settings
    pub llm: LlmConfig,

    /// Extra endpoints keyed by model-id prefix
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointConfig>,

    /// Judge model and criteria used when no persisted settings exist
    #[serde(default)]
    pub validation: ValidatorSettings,

    /// Per-model prices in USD per million tokens
    #[serde(default)]
    pub pricing: BTreeMap<String, ModelPricing>,

    /// Price applied to models missing from `pricing` (none = free)
    #[serde(default)]
    pub default_pricing: Option<ModelPricing>,

    /// Weighting used for the most-effective-model pick
    #[serde(default)]
    pub effectiveness: EffectivenessPolicy,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    llm: Option<LlmFileSection>,
    #[serde(default)]
    endpoints: BTreeMap<String, EndpointConfig>,
    validation: Option<ValidatorSettings>,
    #[serde(default)]
    pricing: BTreeMap<String, ModelPricing>,
    default_pricing: Option<ModelPricing>,
    effectiveness: Option<EffectivenessPolicy>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, LLM_API_KEY, LLM_MODEL, JUDGE_MODEL, ...)
    /// 2. Config file (explicit path, or ~/.config/rag-validator/config.yaml)
    /// 3. Default values
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::config_file_path() {
                Some(default_path) if default_path.exists() => {
                    Self::load_from_file(&default_path)?
                }
                _ => Config::default(),
            },
        };

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(api_base) = env::var("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            self.llm.model = model;
        }

        if let Ok(max_tokens) = env::var("LLM_MAX_TOKENS") {
            if let Ok(tokens) = max_tokens.parse() {
                self.llm.max_tokens = tokens;
            }
        }

        if let Ok(temperature) = env::var("LLM_TEMPERATURE") {
            if let Ok(temp) = temperature.parse() {
                self.llm.temperature = temp;
            }
        }

        if let Ok(timeout) = env::var("LLM_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse() {
                self.llm.timeout_secs = secs;
            }
        }

        if let Ok(judge) = env::var("JUDGE_MODEL") {
            self.validation.judge_model = judge;
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ValidatorError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| ValidatorError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(llm) = file_config.llm {
            if let Some(api_base) = llm.api_base {
                config.llm.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.llm.api_key = api_key;
            }
            if let Some(model) = llm.model {
                config.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                config.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                config.llm.timeout_secs = timeout_secs;
            }
        }

        config.endpoints = file_config.endpoints;
        if let Some(validation) = file_config.validation {
            config.validation = validation;
        }
        config.pricing = file_config.pricing;
        config.default_pricing = file_config.default_pricing;
        if let Some(effectiveness) = file_config.effectiveness {
            config.effectiveness = effectiveness;
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-validator")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that required configuration is present.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(ValidatorError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(ValidatorError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        for (name, endpoint) in &self.endpoints {
            if endpoint.api_base.is_empty() {
                return Err(ValidatorError::InvalidConfig(format!(
                    "endpoint '{}' has no api_base",
                    name
                )));
            }
        }

        self.effectiveness.validate()?;

        Ok(())
    }

    /// Cost table: built-in list prices overridden by configured ones.
    pub fn cost_table(&self) -> CostTable {
        let mut table = CostTable::with_builtin_prices();
        for (model, pricing) in &self.pricing {
            table.insert(model.clone(), *pricing);
        }
        match self.default_pricing {
            Some(default) => table.with_default(default),
            None => table,
        }
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.api_base.is_empty());
        assert!(config.llm.api_key.is_empty());
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.llm.timeout_secs, 60);
        assert!(config.endpoints.is_empty());
    }

    #[test]
    fn test_validate_fails_without_required_fields() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_allows_empty_api_key() {
        let config = Config::with_llm("http://localhost:11434", "", "llama3");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_llm() {
        let config = Config::with_llm("https://api.example.com", "test-key", "gpt-4");
        assert_eq!(config.llm.api_base, "https://api.example.com");
        assert_eq!(config.llm.api_key, "test-key");
        assert_eq!(config.llm.model, "gpt-4");
    }

    #[test]
    fn test_load_from_yaml_file() {
        let yaml = r#"
llm:
  api_base: "https://api.openai.com"
  api_key: "sk-test"
  model: "gpt-4o-mini"
  timeout_secs: 30
endpoints:
  ollama:
    api_base: "http://localhost:11434"
validation:
  judge_model: "gpt-4o"
  criteria: "Accuracy, Clarity"
pricing:
  gpt-4o:
    input_per_million: 2.5
    output_per_million: 10.0
effectiveness:
  cost_weight: 1.0
  speed_weight: 0.0
"#;
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", yaml).unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.endpoints["ollama"].api_base, "http://localhost:11434");
        assert!(config.endpoints["ollama"].api_key.is_empty());
        assert_eq!(config.validation.judge_model, "gpt-4o");
        assert_eq!(config.validation.criteria, "Accuracy, Clarity");
        assert_eq!(config.effectiveness.cost_weight, 1.0);
        assert_eq!(config.effectiveness.good_score_threshold, 70.0);
        assert!(config.cost_table().get("gpt-4o").is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let result = Config::from_yaml("llm: [unterminated");
        assert!(matches!(result, Err(ValidatorError::Config(_))));
    }

    #[test]
    fn test_endpoint_without_base_is_rejected() {
        let mut config = Config::with_llm("https://api.example.com", "k", "gpt-4o");
        config.endpoints.insert(
            "local".to_string(),
            EndpointConfig {
                api_base: String::new(),
                api_key: String::new(),
                timeout_secs: None,
            },
        );
        assert!(config.validate().is_err());
    }
}
