//! Dashboard reports and CSV exports.

pub mod export;
pub mod generator;

pub use export::{write_indicators_csv, write_rows_csv};
pub use generator::{generate_json_report, generate_markdown_report, generate_table_report};

use crate::analysis::{ComparisonEntry, IndicatorSet, UserFilters};
use crate::models::Entity;
use crate::narrative::NarrativePanel;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Everything one dashboard invocation shows.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub filters: UserFilters,
    /// User messages for selectors dropped by the scope filter.
    pub ignored_filters: Vec<String>,
    pub indicators: IndicatorSet,
    pub comparison: Vec<ComparisonEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<NarrativePanel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub entity: Entity,
    pub generated_at: DateTime<Utc>,
    /// File path or API URL the rows came from.
    pub source: String,
    pub rows_loaded: usize,
    pub rows_skipped: usize,
    pub rows_visible: usize,
    pub duration_seconds: f64,
}
