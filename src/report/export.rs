//! CSV export of the visible rows and of the indicator table.
//!
//! Column order and headers are fixed. The row export uses the same column
//! names the loader reads, so an exported file can be loaded back.

use crate::analysis::aggregator::{Distribution, GroupIndicators, IndicatorValue, ScaledMeans};
use crate::analysis::IndicatorSet;
use crate::models::ResultRow;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tracing::info;

pub const ROW_HEADERS: [&str; 15] = [
    "state",
    "region",
    "municipality",
    "school",
    "stage",
    "subject",
    "network",
    "year",
    "proficiency",
    "performance_standard",
    "socioeconomic_level",
    "gender",
    "race",
    "skill",
    "participated",
];

pub const INDICATOR_HEADERS: [&str; 7] = [
    "indicator", "status", "group", "scale", "category", "count", "value",
];

/// Write rows as CSV.
pub fn export_rows<W: Write>(writer: W, rows: &[&ResultRow]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(ROW_HEADERS)?;

    for row in rows {
        csv.write_record(row_record(row))?;
    }

    csv.flush()?;
    Ok(())
}

fn row_record(row: &ResultRow) -> [String; 15] {
    fn opt<T: ToString>(value: &Option<T>) -> String {
        value.as_ref().map(|v| v.to_string()).unwrap_or_default()
    }

    [
        row.state.clone(),
        row.region.clone(),
        row.municipality.clone(),
        row.school.clone(),
        row.stage.to_string(),
        row.subject.to_string(),
        row.network.to_string(),
        row.year.to_string(),
        opt(&row.proficiency),
        opt(&row.performance_standard),
        opt(&row.socioeconomic_level),
        opt(&row.gender),
        opt(&row.race),
        opt(&row.skill),
        opt(&row.participated),
    ]
}

/// Write the indicator table as CSV, one line per value.
///
/// Indicators without data produce a single `no_data` line. Percentages and
/// means are written unrounded.
pub fn export_indicators<W: Write>(writer: W, indicators: &IndicatorSet) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(INDICATOR_HEADERS)?;

    for (kind, result) in &indicators.values {
        let name = kind.name();
        let value = match result {
            Ok(value) => value,
            Err(_) => {
                csv.write_record([name, "no_data", "", "", "", "", ""])?;
                continue;
            }
        };

        let mut lines: Vec<IndicatorLine> = Vec::new();
        match value {
            IndicatorValue::MeanProficiency(means) => {
                lines.extend(mean_lines("", means));
            }
            IndicatorValue::Distribution(distribution) => {
                lines.extend(distribution_lines("", distribution));
            }
            IndicatorValue::Participation(rate) => lines.push(IndicatorLine {
                group: String::new(),
                scale: String::new(),
                category: rate.status().to_string(),
                count: format!("{}/{}", rate.participated, rate.expected),
                value: rate.percent.to_string(),
            }),
            IndicatorValue::Breakdown(groups) => {
                for (group, group_indicators) in groups {
                    lines.extend(group_lines(group, group_indicators));
                }
            }
        }

        for line in lines {
            csv.write_record([
                name,
                "ok",
                line.group.as_str(),
                line.scale.as_str(),
                line.category.as_str(),
                line.count.as_str(),
                line.value.as_str(),
            ])?;
        }
    }

    csv.flush()?;
    Ok(())
}

struct IndicatorLine {
    group: String,
    scale: String,
    category: String,
    count: String,
    value: String,
}

fn mean_lines(group: &str, means: &ScaledMeans) -> Vec<IndicatorLine> {
    means
        .iter()
        .map(|(scale, stat)| IndicatorLine {
            group: group.to_string(),
            scale: scale.to_string(),
            category: "mean".to_string(),
            count: stat.count.to_string(),
            value: stat.mean.to_string(),
        })
        .collect()
}

fn distribution_lines(group: &str, distribution: &Distribution) -> Vec<IndicatorLine> {
    distribution
        .shares
        .iter()
        .map(|(standard, share)| IndicatorLine {
            group: group.to_string(),
            scale: String::new(),
            category: standard.to_string(),
            count: share.count.to_string(),
            value: share.percent.to_string(),
        })
        .collect()
}

fn group_lines(group: &str, indicators: &GroupIndicators) -> Vec<IndicatorLine> {
    let mut lines = Vec::new();
    if let Some(ref means) = indicators.mean_proficiency {
        lines.extend(mean_lines(group, means));
    }
    if let Some(ref distribution) = indicators.distribution {
        lines.extend(distribution_lines(group, distribution));
    }
    if lines.is_empty() {
        lines.push(IndicatorLine {
            group: group.to_string(),
            scale: String::new(),
            category: "rows".to_string(),
            count: indicators.rows.to_string(),
            value: String::new(),
        });
    }
    lines
}

/// Write the visible rows to `path`.
pub fn write_rows_csv(path: &Path, rows: &[&ResultRow]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    export_rows(file, rows).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Exported {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Write the indicator table to `path`.
pub fn write_indicators_csv(path: &Path, indicators: &IndicatorSet) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    export_indicators(file, indicators)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Exported indicator table to {}", path.display());
    Ok(())
}
