//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.spaece-insights.toml` files.

use crate::cli::{Args, OutputFormat};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = ".spaece-insights.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Where result rows come from.
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Entity directory settings.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// AI narrative settings.
    #[serde(default)]
    pub narrative: NarrativeConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// Dataset source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Local CSV or JSON file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Results API endpoint, used with --aggregate.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Indicator codes requested from the results API.
    #[serde(default)]
    pub api_indicators: Vec<String>,

    /// Assessment year stamped on rows fetched from the results API.
    #[serde(default = "default_edition")]
    pub edition: u16,

    /// Installation id sent with API requests.
    #[serde(default = "default_installation_id")]
    pub installation_id: String,

    /// Request timeout in seconds.
    #[serde(default = "default_api_timeout")]
    pub timeout_seconds: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: None,
            api_url: default_api_url(),
            api_indicators: Vec::new(),
            edition: default_edition(),
            installation_id: default_installation_id(),
            timeout_seconds: default_api_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "https://avaliacaoemonitoramentoceara.caeddigital.net/portal/functions/getDadosResultado".to_string()
}

fn default_edition() -> u16 {
    2024
}

fn default_installation_id() -> String {
    "spaece-insights".to_string()
}

fn default_api_timeout() -> u64 {
    60
}

/// Entity directory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// TOML file with `[[entity]]` records.
    #[serde(default = "default_directory_path")]
    pub path: PathBuf,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: default_directory_path(),
        }
    }
}

fn default_directory_path() -> PathBuf {
    PathBuf::from("entidades.toml")
}

/// AI narrative settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeConfig {
    /// OpenAI-compatible chat-completions URL.
    #[serde(default = "default_ai_url")]
    pub api_url: String,

    /// Model name.
    #[serde(default = "default_ai_model")]
    pub model: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in the answer.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_ai_timeout")]
    pub timeout_seconds: u64,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            api_url: default_ai_url(),
            model: default_ai_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_ai_timeout(),
        }
    }
}

fn default_ai_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

fn default_ai_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_ai_timeout() -> u64 {
    30
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Default output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Show the comparison with enclosing scopes.
    #[serde(default = "default_true")]
    pub include_comparison: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            include_comparison: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref data) = args.data {
            self.dataset.path = Some(data.clone());
        }
        if let Some(ref api_url) = args.api_url {
            self.dataset.api_url = api_url.clone();
        }
        if let Some(ref directory) = args.directory {
            self.directory.path = directory.clone();
        }

        if let Some(ref ai_url) = args.ai_url {
            self.narrative.api_url = ai_url.clone();
        }
        if let Some(ref ai_model) = args.ai_model {
            self.narrative.model = ai_model.clone();
        }

        // Timeout - only override if explicitly provided via CLI
        if let Some(timeout) = args.timeout {
            self.dataset.timeout_seconds = timeout;
            self.narrative.timeout_seconds = timeout;
        }

        if let Some(format) = args.format {
            self.report.format = format;
        }
        if args.no_comparison {
            self.report.include_comparison = false;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.narrative.model, "llama-3.3-70b-versatile");
        assert_eq!(config.directory.path, PathBuf::from("entidades.toml"));
        assert_eq!(config.report.format, OutputFormat::Table);
        assert!(config.report.include_comparison);
        assert!(config.dataset.path.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
verbose = true

[dataset]
path = "dados/resultados.csv"

[directory]
path = "dados/entidades.toml"

[narrative]
model = "llama-3.1-8b-instant"
temperature = 0.2

[report]
format = "markdown"
include_comparison = false
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.general.verbose);
        assert_eq!(
            config.dataset.path,
            Some(PathBuf::from("dados/resultados.csv"))
        );
        assert_eq!(config.dataset.timeout_seconds, 60);
        assert_eq!(config.dataset.edition, 2024);
        assert_eq!(config.directory.path, PathBuf::from("dados/entidades.toml"));
        assert_eq!(config.narrative.model, "llama-3.1-8b-instant");
        assert_eq!(config.narrative.temperature, 0.2);
        assert_eq!(config.narrative.timeout_seconds, 30);
        assert_eq!(config.report.format, OutputFormat::Markdown);
        assert!(!config.report.include_comparison);
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::try_parse_from([
            "spaece-insights",
            "--code",
            "ESC001",
            "--directory",
            "outro.toml",
            "--format",
            "json",
            "--timeout",
            "5",
            "--no-comparison",
        ])
        .unwrap();

        let mut config = Config::default();
        config.merge_with_args(&args);

        assert_eq!(config.directory.path, PathBuf::from("outro.toml"));
        assert_eq!(config.report.format, OutputFormat::Json);
        assert_eq!(config.narrative.timeout_seconds, 5);
        assert_eq!(config.dataset.timeout_seconds, 5);
        assert!(!config.report.include_comparison);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[narrative]"));
        assert!(toml_str.contains("[report]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.narrative.api_url, default_ai_url());
    }
}
