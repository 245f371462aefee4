//! Dataset accessor for SPAECE result rows.
//!
//! Rows are loaded once (CSV, JSON or the results API), validated against
//! their stage's scale, and then held read-only for the rest of the run.

pub mod remote;

use crate::models::{Network, ResultRow, Stage, Subject};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Supported dataset file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Csv,
    Json,
}

impl DatasetFormat {
    /// Guess the format from a file extension, defaulting to CSV.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("json") => DatasetFormat::Json,
            _ => DatasetFormat::Csv,
        }
    }
}

/// The full, immutable result dataset.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    rows: Vec<ResultRow>,
    skipped: usize,
}

impl Dataset {
    /// Build a dataset from already parsed rows, dropping invalid ones.
    pub fn from_rows(rows: Vec<ResultRow>) -> Self {
        let total = rows.len();
        let rows: Vec<ResultRow> = rows
            .into_iter()
            .filter(|row| match validate_row(row) {
                Ok(()) => true,
                Err(reason) => {
                    warn!("Skipping row for school {}: {}", row.school, reason);
                    false
                }
            })
            .collect();

        let skipped = total - rows.len();
        Self { rows, skipped }
    }

    /// Load a dataset file, picking the parser from the extension.
    pub fn load(path: &Path) -> Result<Self> {
        match DatasetFormat::from_path(path) {
            DatasetFormat::Csv => Self::load_csv(path),
            DatasetFormat::Json => Self::load_json(path),
        }
    }

    /// Load rows from a CSV file with a header line.
    pub fn load_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open dataset: {}", path.display()))?;
        let mut dataset = Self::from_csv_reader(file)?;
        info!(
            "Loaded {} rows from {} ({} skipped)",
            dataset.rows.len(),
            path.display(),
            dataset.skipped
        );
        dataset.rows.shrink_to_fit();
        Ok(dataset)
    }

    /// Parse CSV from any reader. Records that fail to parse are skipped.
    pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = Vec::new();
        let mut unparsable = 0;

        for (index, record) in csv_reader.deserialize::<ResultRow>().enumerate() {
            match record {
                Ok(row) => rows.push(row),
                Err(e) => {
                    // Header is line 1, so records start at line 2.
                    warn!("Skipping CSV record at line {}: {}", index + 2, e);
                    unparsable += 1;
                }
            }
        }

        let mut dataset = Self::from_rows(rows);
        dataset.skipped += unparsable;
        Ok(dataset)
    }

    /// Load rows from a JSON file (bare array or API envelope).
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset: {}", path.display()))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse dataset: {}", path.display()))?;

        let dataset = Self::from_json_value(value)?;
        info!(
            "Loaded {} rows from {} ({} skipped)",
            dataset.rows.len(),
            path.display(),
            dataset.skipped
        );
        Ok(dataset)
    }

    /// Parse rows out of a JSON document.
    ///
    /// Accepts a bare array or an object carrying the rows under `result`,
    /// `data` or `results`; the first non-empty key wins.
    pub fn from_json_value(value: Value) -> Result<Self> {
        let items = envelope_items(value)?;

        let mut rows = Vec::with_capacity(items.len());
        let mut unparsable = 0;
        for (index, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<ResultRow>(item) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    warn!("Skipping JSON record {}: {}", index, e);
                    unparsable += 1;
                }
            }
        }

        let mut dataset = Self::from_rows(rows);
        dataset.skipped += unparsable;
        Ok(dataset)
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of input records dropped during loading.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Rows satisfying a column predicate.
    pub fn select<F>(&self, predicate: F) -> Vec<&ResultRow>
    where
        F: Fn(&ResultRow) -> bool,
    {
        self.rows.iter().filter(|row| predicate(row)).collect()
    }
}

/// Distinct region, municipality and school codes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HierarchyCodes {
    pub regions: BTreeSet<String>,
    pub municipalities: BTreeSet<String>,
    pub schools: BTreeSet<String>,
}

impl HierarchyCodes {
    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a ResultRow>,
    {
        let mut codes = Self::default();
        for row in rows {
            codes.regions.insert(row.region.clone());
            codes.municipalities.insert(row.municipality.clone());
            codes.schools.insert(row.school.clone());
        }
        debug!(
            "Hierarchy: {} regions, {} municipalities, {} schools",
            codes.regions.len(),
            codes.municipalities.len(),
            codes.schools.len()
        );
        codes
    }
}

/// Filter values observed in a row subset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FacetOptions {
    pub stages: BTreeSet<Stage>,
    pub subjects: BTreeSet<Subject>,
    pub networks: BTreeSet<Network>,
    pub years: BTreeSet<u16>,
    pub socioeconomic_levels: BTreeSet<String>,
    pub genders: BTreeSet<String>,
    pub races: BTreeSet<String>,
}

impl FacetOptions {
    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a ResultRow>,
    {
        let mut options = Self::default();
        for row in rows {
            options.stages.insert(row.stage);
            options.subjects.insert(row.subject);
            options.networks.insert(row.network);
            options.years.insert(row.year);
            if let Some(ref level) = row.socioeconomic_level {
                options.socioeconomic_levels.insert(level.clone());
            }
            if let Some(ref gender) = row.gender {
                options.genders.insert(gender.clone());
            }
            if let Some(ref race) = row.race {
                options.races.insert(race.clone());
            }
        }
        options
    }
}

/// Records of a JSON document: a bare array, or the first non-empty array
/// under `result`, `data` or `results`.
fn envelope_items(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => Ok(["result", "data", "results"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) if !items.is_empty() => Some(items),
                _ => None,
            })
            .unwrap_or_default()),
        _ => anyhow::bail!("Unsupported dataset shape: expected an array or an object"),
    }
}

/// Check a row against its stage's scale and label set.
fn validate_row(row: &ResultRow) -> std::result::Result<(), String> {
    if row.region.is_empty() || row.municipality.is_empty() || row.school.is_empty() {
        return Err("missing organizational code".to_string());
    }

    let scale = row.scale();

    if let Some(score) = row.proficiency {
        if !scale.contains(score) {
            return Err(format!(
                "proficiency {} outside {} for {}",
                score, scale, row.stage
            ));
        }
    }

    if let Some(standard) = row.performance_standard {
        if !standard.belongs_to(scale) {
            return Err(format!(
                "performance standard '{}' is not published for {}",
                standard, row.stage
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PerformanceStandard;
    use std::io::Write;

    const CSV: &str = "\
state,region,municipality,school,stage,subject,network,year,proficiency,performance_standard,socioeconomic_level,gender,race,skill,participated
23,CREDE01,MUN01,ESC001,5º Ano - Fundamental,LP,MUNICIPAL,2023,210.5,Adequado,NSE3,Feminino,Parda,D01,true
23,CREDE01,MUN01,ESC001,ENSINO FUNDAMENTAL DE 9 ANOS - 2º ANO,MT,Municipal,2023,720,Desejável,,,,,false
23,CREDE01,MUN01,ESC002,5º Ano - Fundamental,LP,Municipal,2023,,,,,,,
23,CREDE01,MUN01,ESC003,5º Ano - Fundamental,LP,Particular,2023,200,Adequado,,,,,
23,CREDE01,MUN01,ESC004,5º Ano - Fundamental,LP,Municipal,2023,720,Adequado,,,,,
23,CREDE01,MUN01,ESC005,5º Ano - Fundamental,LP,Municipal,2023,220,Desejável,,,,,
";

    #[test]
    fn test_csv_loading_and_validation() {
        let dataset = Dataset::from_csv_reader(CSV.as_bytes()).unwrap();

        // Unknown network, out-of-scale score and wrong-scale label are dropped.
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.skipped(), 3);

        let first = &dataset.rows()[0];
        assert_eq!(first.stage, Stage::Fundamental5);
        assert_eq!(first.subject, Subject::LinguaPortuguesa);
        assert_eq!(first.network, Network::Municipal);
        assert_eq!(first.proficiency, Some(210.5));
        assert_eq!(first.performance_standard, Some(PerformanceStandard::Adequado));
        assert_eq!(first.participated, Some(true));

        let blank = &dataset.rows()[2];
        assert_eq!(blank.proficiency, None);
        assert_eq!(blank.gender, None);
        assert_eq!(blank.participated, None);
    }

    #[test]
    fn test_load_csv_from_file() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();

        let dataset = Dataset::load(file.path()).unwrap();
        assert_eq!(dataset.len(), 3);
    }

    #[test]
    fn test_json_envelope() {
        let value = serde_json::json!({
            "result": [],
            "data": [{
                "state": "23", "region": "CREDE01", "municipality": "MUN01",
                "school": "ESC001", "stage": "EF9", "subject": "MT",
                "network": "ESTADUAL", "year": 2024, "proficiency": 280.0
            }]
        });

        let dataset = Dataset::from_json_value(value).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.rows()[0].stage, Stage::Fundamental9);
        assert_eq!(dataset.rows()[0].performance_standard, None);
    }

    #[test]
    fn test_json_rejects_scalar_document() {
        assert!(Dataset::from_json_value(serde_json::json!(42)).is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            DatasetFormat::from_path(Path::new("dados.JSON")),
            DatasetFormat::Json
        );
        assert_eq!(
            DatasetFormat::from_path(Path::new("dados.csv")),
            DatasetFormat::Csv
        );
    }

    #[test]
    fn test_hierarchy_codes_and_facets() {
        let dataset = Dataset::from_csv_reader(CSV.as_bytes()).unwrap();

        let codes = HierarchyCodes::from_rows(dataset.rows());
        assert_eq!(codes.regions.len(), 1);
        assert_eq!(codes.schools.len(), 2);

        let options = FacetOptions::from_rows(dataset.rows());
        assert!(options.stages.contains(&Stage::Fundamental2));
        assert!(options.genders.contains("Feminino"));
        assert_eq!(options.years.len(), 1);
    }

    #[test]
    fn test_select() {
        let dataset = Dataset::from_csv_reader(CSV.as_bytes()).unwrap();
        let selected = dataset.select(|row| row.school == "ESC002");
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_sample_fixture_loads_cleanly() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/resultados.csv");
        let dataset = Dataset::load(&path).unwrap();

        assert_eq!(dataset.len(), 14);
        assert_eq!(dataset.skipped(), 0);

        let codes = HierarchyCodes::from_rows(dataset.rows());
        assert_eq!(codes.regions.len(), 2);
        assert!(codes.schools.contains("ESC010"));
    }
}
