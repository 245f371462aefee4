//! Indicator aggregation and statistics.
//!
//! Indicators are recomputed from a filtered row subset on every call; nothing
//! here is cached or mutated after it is returned. An indicator that cannot be
//! computed (no rows, no scores, no participation flags) comes back as
//! [`EmptyIndicatorInput`] instead of a numeric placeholder.

use crate::error::EmptyIndicatorInput;
use crate::models::{PerformanceStandard, ResultRow, ScaleVariant};
use clap::ValueEnum;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Indicators that can be requested.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum IndicatorKind {
    MeanProficiency,
    PerformanceDistribution,
    ParticipationRate,
    SocioeconomicBreakdown,
    GenderBreakdown,
    RaceBreakdown,
    SkillBreakdown,
}

impl IndicatorKind {
    pub fn all() -> Vec<IndicatorKind> {
        vec![
            IndicatorKind::MeanProficiency,
            IndicatorKind::PerformanceDistribution,
            IndicatorKind::ParticipationRate,
            IndicatorKind::SocioeconomicBreakdown,
            IndicatorKind::GenderBreakdown,
            IndicatorKind::RaceBreakdown,
            IndicatorKind::SkillBreakdown,
        ]
    }

    /// Stable machine name, used in exports and "no data" markers.
    pub fn name(&self) -> &'static str {
        match self {
            IndicatorKind::MeanProficiency => "mean-proficiency",
            IndicatorKind::PerformanceDistribution => "performance-distribution",
            IndicatorKind::ParticipationRate => "participation-rate",
            IndicatorKind::SocioeconomicBreakdown => "socioeconomic-breakdown",
            IndicatorKind::GenderBreakdown => "gender-breakdown",
            IndicatorKind::RaceBreakdown => "race-breakdown",
            IndicatorKind::SkillBreakdown => "skill-breakdown",
        }
    }

    /// Title shown in reports.
    pub fn title(&self) -> &'static str {
        match self {
            IndicatorKind::MeanProficiency => "Proficiência Média",
            IndicatorKind::PerformanceDistribution => "Padrão de Desempenho",
            IndicatorKind::ParticipationRate => "Taxa de Participação",
            IndicatorKind::SocioeconomicBreakdown => "Nível Socioeconômico",
            IndicatorKind::GenderBreakdown => "Sexo",
            IndicatorKind::RaceBreakdown => "Raça/Cor",
            IndicatorKind::SkillBreakdown => "Habilidades",
        }
    }

    fn facet(&self) -> Option<Facet> {
        match self {
            IndicatorKind::SocioeconomicBreakdown => Some(Facet::SocioeconomicLevel),
            IndicatorKind::GenderBreakdown => Some(Facet::Gender),
            IndicatorKind::RaceBreakdown => Some(Facet::Race),
            IndicatorKind::SkillBreakdown => Some(Facet::Skill),
            _ => None,
        }
    }

    fn no_data(&self) -> EmptyIndicatorInput {
        EmptyIndicatorInput {
            indicator: self.name(),
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// Column a breakdown groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Facet {
    SocioeconomicLevel,
    Gender,
    Race,
    Skill,
}

impl Facet {
    fn value<'a>(&self, row: &'a ResultRow) -> Option<&'a str> {
        match self {
            Facet::SocioeconomicLevel => row.socioeconomic_level.as_deref(),
            Facet::Gender => row.gender.as_deref(),
            Facet::Race => row.race.as_deref(),
            Facet::Skill => row.skill.as_deref(),
        }
    }
}

/// Mean of the scored rows on one scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeanStat {
    pub mean: f64,
    pub count: usize,
}

/// Means keyed by scale; scales never share a mean.
pub type ScaledMeans = BTreeMap<ScaleVariant, MeanStat>;

/// Count and percentage of one performance standard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StandardShare {
    pub count: usize,
    /// Unrounded percentage of the labelled rows.
    pub percent: f64,
}

/// Rows per performance-standard label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub total: usize,
    pub shares: BTreeMap<PerformanceStandard, StandardShare>,
}

/// Participation against the expected population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParticipationRate {
    pub participated: usize,
    pub expected: usize,
    pub percent: f64,
}

/// Participation band used to colour the gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipationStatus {
    Critical,
    Attention,
    Adequate,
}

impl ParticipationRate {
    /// Below 80% is critical, below 90% needs attention.
    pub fn status(&self) -> ParticipationStatus {
        if self.percent < 80.0 {
            ParticipationStatus::Critical
        } else if self.percent < 90.0 {
            ParticipationStatus::Attention
        } else {
            ParticipationStatus::Adequate
        }
    }
}

impl fmt::Display for ParticipationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticipationStatus::Critical => write!(f, "Crítico"),
            ParticipationStatus::Attention => write!(f, "Atenção"),
            ParticipationStatus::Adequate => write!(f, "Adequado"),
        }
    }
}

/// Mean and distribution for one group of a breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupIndicators {
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_proficiency: Option<ScaledMeans>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Distribution>,
}

/// A computed indicator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum IndicatorValue {
    MeanProficiency(ScaledMeans),
    Distribution(Distribution),
    Participation(ParticipationRate),
    Breakdown(BTreeMap<String, GroupIndicators>),
}

pub type IndicatorResult = Result<IndicatorValue, EmptyIndicatorInput>;

/// Indicators computed over one row subset.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSet {
    pub rows: usize,
    pub values: BTreeMap<IndicatorKind, IndicatorResult>,
}

impl IndicatorSet {
    pub fn get(&self, kind: IndicatorKind) -> Option<&IndicatorResult> {
        self.values.get(&kind)
    }

    /// Whether no requested indicator produced a value.
    pub fn is_empty(&self) -> bool {
        self.values.values().all(|v| v.is_err())
    }
}

impl Serialize for IndicatorSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(tag = "status", rename_all = "snake_case")]
        enum Entry<'a> {
            Ok { indicator: &'a IndicatorValue },
            NoData,
        }

        let mut map = serializer.serialize_map(Some(self.values.len() + 1))?;
        map.serialize_entry("rows", &self.rows)?;
        for (kind, value) in &self.values {
            let entry = match value {
                Ok(indicator) => Entry::Ok { indicator },
                Err(_) => Entry::NoData,
            };
            map.serialize_entry(kind.name(), &entry)?;
        }
        map.end()
    }
}

/// Compute each requested indicator over `rows`.
pub fn compute_indicators(rows: &[&ResultRow], requested: &[IndicatorKind]) -> IndicatorSet {
    let values = requested
        .iter()
        .map(|kind| (*kind, compute_indicator(rows, *kind)))
        .collect();

    IndicatorSet {
        rows: rows.len(),
        values,
    }
}

fn compute_indicator(rows: &[&ResultRow], kind: IndicatorKind) -> IndicatorResult {
    if rows.is_empty() {
        return Err(kind.no_data());
    }

    let value = match kind {
        IndicatorKind::MeanProficiency => mean_proficiency(rows).map(IndicatorValue::MeanProficiency),
        IndicatorKind::PerformanceDistribution => {
            performance_distribution(rows).map(IndicatorValue::Distribution)
        }
        IndicatorKind::ParticipationRate => {
            participation_rate(rows).map(IndicatorValue::Participation)
        }
        _ => kind
            .facet()
            .and_then(|facet| breakdown(rows, facet))
            .map(IndicatorValue::Breakdown),
    };

    value.ok_or_else(|| kind.no_data())
}

/// Mean proficiency per scale over the rows that carry a score.
pub fn mean_proficiency(rows: &[&ResultRow]) -> Option<ScaledMeans> {
    let mut sums: BTreeMap<ScaleVariant, (f64, usize)> = BTreeMap::new();

    for row in rows {
        if let Some(score) = row.proficiency {
            let entry = sums.entry(row.scale()).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
        }
    }

    if sums.is_empty() {
        return None;
    }

    Some(
        sums.into_iter()
            .map(|(scale, (sum, count))| {
                (
                    scale,
                    MeanStat {
                        mean: sum / count as f64,
                        count,
                    },
                )
            })
            .collect(),
    )
}

/// Count and share of each performance standard among labelled rows.
pub fn performance_distribution(rows: &[&ResultRow]) -> Option<Distribution> {
    let mut counts: BTreeMap<PerformanceStandard, usize> = BTreeMap::new();

    for row in rows {
        if let Some(standard) = row.performance_standard {
            *counts.entry(standard).or_default() += 1;
        }
    }

    let total: usize = counts.values().sum();
    if total == 0 {
        return None;
    }

    let shares = counts
        .into_iter()
        .map(|(standard, count)| {
            let percent = count as f64 / total as f64 * 100.0;
            (standard, StandardShare { count, percent })
        })
        .collect();

    Some(Distribution { total, shares })
}

/// Participated rows over rows carrying a participation flag.
pub fn participation_rate(rows: &[&ResultRow]) -> Option<ParticipationRate> {
    let expected = rows.iter().filter(|r| r.participated.is_some()).count();
    if expected == 0 {
        return None;
    }

    let participated = rows
        .iter()
        .filter(|r| r.participated == Some(true))
        .count();

    Some(ParticipationRate {
        participated,
        expected,
        percent: participated as f64 / expected as f64 * 100.0,
    })
}

/// Group rows by a facet and re-apply mean and distribution per group.
fn breakdown(rows: &[&ResultRow], facet: Facet) -> Option<BTreeMap<String, GroupIndicators>> {
    let mut groups: BTreeMap<&str, Vec<&ResultRow>> = BTreeMap::new();

    for &row in rows {
        if let Some(value) = facet.value(row) {
            groups.entry(value).or_default().push(row);
        }
    }

    if groups.is_empty() {
        return None;
    }

    Some(
        groups
            .into_iter()
            .map(|(value, group)| {
                (
                    value.to_string(),
                    GroupIndicators {
                        rows: group.len(),
                        mean_proficiency: mean_proficiency(&group),
                        distribution: performance_distribution(&group),
                    },
                )
            })
            .collect(),
    )
}

/// Round half away from zero to `decimals` places, for display.
pub fn round_half_up(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Display a percentage with one decimal place.
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", round_half_up(value, 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Network, Stage, Subject};
    use pretty_assertions::assert_eq;

    fn create_test_row(stage: Stage, proficiency: Option<f64>) -> ResultRow {
        ResultRow {
            state: "23".to_string(),
            region: "CREDE01".to_string(),
            municipality: "MUN01".to_string(),
            school: "ESC001".to_string(),
            stage,
            subject: Subject::Matematica,
            network: Network::Municipal,
            year: 2023,
            proficiency,
            performance_standard: None,
            socioeconomic_level: None,
            gender: None,
            race: None,
            skill: None,
            participated: None,
        }
    }

    fn with_standard(standard: PerformanceStandard) -> ResultRow {
        ResultRow {
            performance_standard: Some(standard),
            ..create_test_row(Stage::Fundamental5, Some(200.0))
        }
    }

    #[test]
    fn test_mean_proficiency() {
        let rows: Vec<ResultRow> = [120.0, 140.0, 160.0, 180.0, 200.0]
            .into_iter()
            .map(|score| create_test_row(Stage::Fundamental5, Some(score)))
            .collect();
        let refs: Vec<&ResultRow> = rows.iter().collect();

        let set = compute_indicators(&refs, &[IndicatorKind::MeanProficiency]);
        let Some(Ok(IndicatorValue::MeanProficiency(means))) =
            set.get(IndicatorKind::MeanProficiency)
        else {
            panic!("expected a mean");
        };

        assert_eq!(means.len(), 1);
        assert_eq!(
            means[&ScaleVariant::Standard],
            MeanStat {
                mean: 160.0,
                count: 5
            }
        );
    }

    #[test]
    fn test_mean_never_mixes_scales() {
        let rows = vec![
            create_test_row(Stage::Fundamental2, Some(700.0)),
            create_test_row(Stage::Fundamental2, Some(800.0)),
            create_test_row(Stage::Fundamental9, Some(250.0)),
            create_test_row(Stage::Fundamental9, None),
        ];
        let refs: Vec<&ResultRow> = rows.iter().collect();

        let means = mean_proficiency(&refs).unwrap();
        assert_eq!(means[&ScaleVariant::Literacy].mean, 750.0);
        assert_eq!(means[&ScaleVariant::Standard].mean, 250.0);
        assert_eq!(means[&ScaleVariant::Standard].count, 1);
    }

    #[test]
    fn test_distribution_percentages() {
        let rows = vec![
            with_standard(PerformanceStandard::Adequado),
            with_standard(PerformanceStandard::Adequado),
            with_standard(PerformanceStandard::Adequado),
            with_standard(PerformanceStandard::Critico),
        ];
        let refs: Vec<&ResultRow> = rows.iter().collect();

        let distribution = performance_distribution(&refs).unwrap();
        assert_eq!(distribution.total, 4);
        assert_eq!(distribution.shares[&PerformanceStandard::Adequado].percent, 75.0);
        assert_eq!(distribution.shares[&PerformanceStandard::Critico].percent, 25.0);
        assert_eq!(distribution.shares[&PerformanceStandard::Critico].count, 1);
    }

    #[test]
    fn test_distribution_sums_to_hundred() {
        let rows = vec![
            with_standard(PerformanceStandard::MuitoCritico),
            with_standard(PerformanceStandard::Critico),
            with_standard(PerformanceStandard::Intermediario),
            with_standard(PerformanceStandard::Adequado),
            with_standard(PerformanceStandard::Adequado),
            with_standard(PerformanceStandard::Intermediario),
            with_standard(PerformanceStandard::Intermediario),
        ];
        let refs: Vec<&ResultRow> = rows.iter().collect();

        let distribution = performance_distribution(&refs).unwrap();
        let sum: f64 = distribution.shares.values().map(|s| s.percent).sum();
        assert!((sum - 100.0).abs() < 1e-9);

        let rounded: f64 = distribution
            .shares
            .values()
            .map(|s| round_half_up(s.percent, 1))
            .sum();
        assert!((rounded - 100.0).abs() <= 0.1 * distribution.shares.len() as f64);
    }

    #[test]
    fn test_empty_input_yields_no_data_for_every_indicator() {
        let set = compute_indicators(&[], &IndicatorKind::all());

        assert_eq!(set.rows, 0);
        assert_eq!(set.values.len(), IndicatorKind::all().len());
        for (kind, value) in &set.values {
            assert_eq!(value, &Err(EmptyIndicatorInput { indicator: kind.name() }));
        }
        assert!(set.is_empty());
    }

    #[test]
    fn test_participation_rate() {
        let mut rows = Vec::new();
        for flag in [Some(true), Some(true), Some(true), Some(false), None] {
            rows.push(ResultRow {
                participated: flag,
                ..create_test_row(Stage::Fundamental5, None)
            });
        }
        let refs: Vec<&ResultRow> = rows.iter().collect();

        let rate = participation_rate(&refs).unwrap();
        assert_eq!(rate.expected, 4);
        assert_eq!(rate.participated, 3);
        assert_eq!(rate.percent, 75.0);
        assert_eq!(rate.status(), ParticipationStatus::Critical);
    }

    #[test]
    fn test_participation_without_flags_is_no_data() {
        let rows = vec![create_test_row(Stage::Fundamental5, Some(200.0))];
        let refs: Vec<&ResultRow> = rows.iter().collect();

        let set = compute_indicators(&refs, &[IndicatorKind::ParticipationRate]);
        assert!(set.get(IndicatorKind::ParticipationRate).unwrap().is_err());
    }

    #[test]
    fn test_participation_status_bands() {
        let rate = |percent| ParticipationRate {
            participated: 0,
            expected: 1,
            percent,
        };
        assert_eq!(rate(79.9).status(), ParticipationStatus::Critical);
        assert_eq!(rate(85.0).status(), ParticipationStatus::Attention);
        assert_eq!(rate(90.0).status(), ParticipationStatus::Adequate);
    }

    #[test]
    fn test_breakdown_omits_missing_groups() {
        let rows = vec![
            ResultRow {
                gender: Some("Feminino".to_string()),
                performance_standard: Some(PerformanceStandard::Adequado),
                ..create_test_row(Stage::Fundamental5, Some(220.0))
            },
            ResultRow {
                gender: Some("Feminino".to_string()),
                ..create_test_row(Stage::Fundamental5, Some(180.0))
            },
            ResultRow {
                gender: Some("Masculino".to_string()),
                ..create_test_row(Stage::Fundamental5, None)
            },
            create_test_row(Stage::Fundamental5, Some(100.0)),
        ];
        let refs: Vec<&ResultRow> = rows.iter().collect();

        let set = compute_indicators(&refs, &[IndicatorKind::GenderBreakdown]);
        let Some(Ok(IndicatorValue::Breakdown(groups))) = set.get(IndicatorKind::GenderBreakdown)
        else {
            panic!("expected a breakdown");
        };

        assert_eq!(groups.len(), 2);
        let feminino = &groups["Feminino"];
        assert_eq!(feminino.rows, 2);
        assert_eq!(
            feminino.mean_proficiency.as_ref().unwrap()[&ScaleVariant::Standard].mean,
            200.0
        );
        assert_eq!(feminino.distribution.as_ref().unwrap().total, 1);

        let masculino = &groups["Masculino"];
        assert!(masculino.mean_proficiency.is_none());
        assert!(masculino.distribution.is_none());
    }

    #[test]
    fn test_breakdown_without_facet_values_is_no_data() {
        let rows = vec![create_test_row(Stage::Fundamental5, Some(200.0))];
        let refs: Vec<&ResultRow> = rows.iter().collect();

        let set = compute_indicators(&refs, &[IndicatorKind::SkillBreakdown]);
        assert_eq!(
            set.get(IndicatorKind::SkillBreakdown),
            Some(&Err(EmptyIndicatorInput {
                indicator: "skill-breakdown"
            }))
        );
    }

    #[test]
    fn test_indicators_are_deterministic() {
        let rows: Vec<ResultRow> = (0..50)
            .map(|i| ResultRow {
                skill: Some(format!("D{:02}", i % 7)),
                participated: Some(i % 3 != 0),
                ..create_test_row(Stage::Fundamental9, Some(150.0 + i as f64 * 1.7))
            })
            .collect();
        let refs: Vec<&ResultRow> = rows.iter().collect();

        let first = compute_indicators(&refs, &IndicatorKind::all());
        let second = compute_indicators(&refs, &IndicatorKind::all());
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(33.35, 0), 33.0);
        assert_eq!(round_half_up(12.25, 1), 12.3);
        assert_eq!(format_percent(75.0), "75.0%");
        assert_eq!(format_percent(66.666), "66.7%");
    }

    #[test]
    fn test_serialized_no_data_marker() {
        let set = compute_indicators(&[], &[IndicatorKind::MeanProficiency]);
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["rows"], 0);
        assert_eq!(json["mean-proficiency"]["status"], "no_data");
    }
}
