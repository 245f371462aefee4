//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::analysis::{IndicatorKind, UserFilters};
use crate::models::{Network, Stage, Subject};
use clap::Parser;
use std::path::PathBuf;

/// spaece-insights - SPAECE results dashboard for the terminal
///
/// Log in as a state, CREDE, municipality or school, narrow the results with
/// filters and print indicators, exports and an optional AI narrative.
///
/// Examples:
///   spaece-insights --code ESC001 --data resultados.csv
///   spaece-insights --code MUN01 --stage ef5 --subject mt --format markdown -o painel.md
///   spaece-insights --code 23 --aggregate 23 --export-rows linhas.csv
///   spaece-insights --code ESC001 --narrative
///   spaece-insights --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Entity code used to log in (state, CREDE, municipality or school)
    #[arg(long, value_name = "CODE", required_unless_present = "init_config")]
    pub code: Option<String>,

    /// Password for the entity code
    #[arg(long, env = "SPAECE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path to the entity directory file
    ///
    /// If not specified, uses [directory].path from the config file.
    #[arg(long, value_name = "FILE")]
    pub directory: Option<PathBuf>,

    /// Dataset file (CSV or JSON)
    #[arg(long, value_name = "FILE", env = "SPAECE_DATA")]
    pub data: Option<PathBuf>,

    /// Fetch rows for this aggregate code from the results API instead of a file
    #[arg(long, value_name = "CODE", conflicts_with = "data")]
    pub aggregate: Option<String>,

    /// Results API endpoint
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Session token for the results API
    #[arg(long, env = "SPAECE_SESSION_TOKEN", hide_env_values = true)]
    pub session_token: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .spaece-insights.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    // === Filters ===
    /// Stage (repeatable or comma-separated)
    #[arg(long, value_name = "STAGE", value_delimiter = ',')]
    pub stage: Vec<Stage>,

    /// Curricular component (repeatable or comma-separated)
    #[arg(long, value_name = "SUBJECT", value_delimiter = ',')]
    pub subject: Vec<Subject>,

    /// School network
    #[arg(long, value_name = "NETWORK")]
    pub network: Option<Network>,

    /// Assessment year (repeatable or comma-separated)
    #[arg(long, value_name = "YEAR", value_delimiter = ',')]
    pub year: Vec<u16>,

    /// Socioeconomic level label
    #[arg(long, value_name = "LEVEL")]
    pub socioeconomic: Option<String>,

    /// Gender label
    #[arg(long, value_name = "GENDER")]
    pub gender: Option<String>,

    /// Race/colour label
    #[arg(long, value_name = "RACE")]
    pub race: Option<String>,

    /// CREDE code
    #[arg(long, value_name = "CODE")]
    pub region: Option<String>,

    /// Municipality code
    #[arg(long, value_name = "CODE")]
    pub municipality: Option<String>,

    /// School code
    #[arg(long, value_name = "CODE")]
    pub school: Option<String>,

    // === Output ===
    /// Indicators to compute (comma-separated, default: all)
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub indicators: Option<Vec<IndicatorKind>>,

    /// Output format
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Export the visible rows as CSV
    #[arg(long, value_name = "FILE")]
    pub export_rows: Option<PathBuf>,

    /// Export the indicator table as CSV
    #[arg(long, value_name = "FILE")]
    pub export_indicators: Option<PathBuf>,

    /// Skip the comparison with enclosing scopes
    #[arg(long)]
    pub no_comparison: bool,

    /// List the filter values available to this login and exit
    #[arg(long)]
    pub list_options: bool,

    // === Narrative ===
    /// Ask the AI service for a narrative analysis
    #[arg(long)]
    pub narrative: bool,

    /// API key for the completion service
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Chat-completions endpoint
    #[arg(long, value_name = "URL", env = "SPAECE_AI_URL")]
    pub ai_url: Option<String>,

    /// Model used for the narrative
    #[arg(long, value_name = "MODEL", env = "SPAECE_AI_MODEL")]
    pub ai_model: Option<String>,

    /// Request timeout in seconds (results API and narrative)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .spaece-insights.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain-text table (default)
    #[default]
    Table,
    /// Markdown format
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.code.as_deref().map_or(true, |c| c.trim().is_empty()) {
            return Err("Entity code must not be empty".to_string());
        }

        if self.password.as_deref().map_or(true, str::is_empty) {
            return Err("Password is required (--password or SPAECE_PASSWORD)".to_string());
        }

        for url in [&self.api_url, &self.ai_url].into_iter().flatten() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("URL must start with 'http://' or 'https://': {}", url));
            }
        }

        if let Some(ref aggregate) = self.aggregate {
            if aggregate.trim().is_empty() {
                return Err("Aggregate code must not be empty".to_string());
            }
        }

        if let Some(ref indicators) = self.indicators {
            if indicators.is_empty() {
                return Err("At least one indicator must be requested".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref data) = self.data {
            if !data.is_file() {
                return Err(format!("Dataset file does not exist: {}", data.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Filters selected on the command line.
    pub fn filters(&self) -> UserFilters {
        UserFilters {
            stages: self.stage.clone(),
            subjects: self.subject.clone(),
            network: self.network,
            years: self.year.clone(),
            socioeconomic_level: self.socioeconomic.clone(),
            gender: self.gender.clone(),
            race: self.race.clone(),
            region: self.region.clone(),
            municipality: self.municipality.clone(),
            school: self.school.clone(),
        }
    }

    /// Requested indicators, all of them when none were named.
    pub fn requested_indicators(&self) -> Vec<IndicatorKind> {
        let mut kinds = self.indicators.clone().unwrap_or_else(IndicatorKind::all);
        kinds.sort();
        kinds.dedup();
        kinds
    }
}
