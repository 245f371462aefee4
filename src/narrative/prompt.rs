//! Prompt assembly for the narrative panel.

use crate::analysis::aggregator::{format_percent, IndicatorSet, IndicatorValue, ScaledMeans};
use crate::analysis::{ComparisonEntry, UserFilters};
use crate::models::{Entity, Stage, Subject};

/// System prompt framing the analyst role.
pub const SYSTEM_PROMPT: &str = r#"Você é um analista educacional especializado nas avaliações do SPAECE (Sistema Permanente de Avaliação da Educação Básica do Ceará).
Escreva em português, em no máximo quatro parágrafos curtos.
Baseie-se apenas nos números fornecidos; não invente dados.
Compare a entidade com as instâncias superiores quando houver comparação disponível.
Termine com duas ou três sugestões pedagógicas concretas."#;

/// Published adequacy cut point for a stage and subject, when one exists.
pub fn adequacy_cut_point(stage: Stage, subject: Subject) -> Option<f64> {
    match (stage, subject) {
        (Stage::Fundamental5, Subject::LinguaPortuguesa) => Some(200.0),
        (Stage::Fundamental5, Subject::Matematica) => Some(225.0),
        (Stage::Fundamental9, Subject::LinguaPortuguesa) => Some(275.0),
        (Stage::Fundamental9, Subject::Matematica) => Some(300.0),
        _ => None,
    }
}

/// User prompt: entity, active filters, indicators and ancestor comparison.
pub fn build_summary(
    entity: &Entity,
    filters: &UserFilters,
    indicators: &IndicatorSet,
    comparison: &[ComparisonEntry],
) -> String {
    let mut out = String::new();

    out.push_str(&format!("Entidade: {} ({})\n", entity.name, entity.role()));
    out.push_str(&format!("Código: {}\n", entity.code));

    let active = filters.describe();
    if active.is_empty() {
        out.push_str("Filtros: nenhum\n");
    } else {
        out.push_str(&format!("Filtros: {}\n", active.join("; ")));
    }
    out.push_str(&format!("Registros considerados: {}\n", indicators.rows));

    out.push_str("\nIndicadores:\n");
    out.push_str(&describe_indicators(indicators));

    if !comparison.is_empty() {
        out.push_str("\nComparação com instâncias superiores:\n");
        for entry in comparison {
            out.push_str(&format!(
                "[{} - {}]\n",
                entry.entity.role(),
                entry.entity.name
            ));
            out.push_str(&describe_indicators(&entry.indicators));
        }
    }

    out.push_str("\nPontos de corte do nível Adequado:\n");
    for stage in [Stage::Fundamental5, Stage::Fundamental9] {
        for subject in [Subject::LinguaPortuguesa, Subject::Matematica] {
            if let Some(cut) = adequacy_cut_point(stage, subject) {
                out.push_str(&format!("- {} {}: {:.0}\n", stage, subject, cut));
            }
        }
    }

    out
}

fn describe_indicators(indicators: &IndicatorSet) -> String {
    let mut section = String::new();
    for (kind, value) in &indicators.values {
        match value {
            Ok(value) => section.push_str(&format!("- {}: {}\n", kind, describe_value(value))),
            Err(_) => section.push_str(&format!("- {}: sem dados\n", kind)),
        }
    }
    section
}

/// Means per scale, each with its own row count.
fn describe_means(means: &ScaledMeans) -> String {
    means
        .iter()
        .map(|(scale, stat)| format!("{:.1} ({}, n={})", stat.mean, scale, stat.count))
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe_value(value: &IndicatorValue) -> String {
    match value {
        IndicatorValue::MeanProficiency(means) => describe_means(means),
        IndicatorValue::Distribution(distribution) => distribution
            .shares
            .iter()
            .map(|(standard, share)| format!("{} {}", standard, format_percent(share.percent)))
            .collect::<Vec<_>>()
            .join(", "),
        IndicatorValue::Participation(rate) => format!(
            "{} ({} de {}, {})",
            format_percent(rate.percent),
            rate.participated,
            rate.expected,
            rate.status()
        ),
        IndicatorValue::Breakdown(groups) => groups
            .iter()
            .map(|(group, indicators)| match indicators.mean_proficiency {
                Some(ref means) => format!("{} média {}", group, describe_means(means)),
                None => format!("{} média sem dados (n={})", group, indicators.rows),
            })
            .collect::<Vec<_>>()
            .join(" | "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{compute_indicators, IndicatorKind};
    use crate::models::{Network, PerformanceStandard, ResultRow, Scope};

    fn entity() -> Entity {
        Entity {
            code: "ESC001".to_string(),
            name: "EEF José de Alencar".to_string(),
            scope: Scope::School {
                region: "CREDE01".to_string(),
                municipality: "MUN01".to_string(),
                school: "ESC001".to_string(),
            },
        }
    }

    fn rows() -> Vec<ResultRow> {
        [(210.0, true), (190.0, false)]
            .into_iter()
            .map(|(proficiency, participated)| ResultRow {
                state: "23".to_string(),
                region: "CREDE01".to_string(),
                municipality: "MUN01".to_string(),
                school: "ESC001".to_string(),
                stage: Stage::Fundamental5,
                subject: Subject::LinguaPortuguesa,
                network: Network::Municipal,
                year: 2023,
                proficiency: Some(proficiency),
                performance_standard: Some(PerformanceStandard::Intermediario),
                socioeconomic_level: None,
                gender: None,
                race: None,
                skill: None,
                participated: Some(participated),
            })
            .collect()
    }

    #[test]
    fn test_summary_mentions_entity_and_indicators() {
        let rows = rows();
        let refs: Vec<&ResultRow> = rows.iter().collect();
        let indicators = compute_indicators(&refs, &IndicatorKind::all());
        let filters = UserFilters {
            years: vec![2023],
            ..Default::default()
        };

        let summary = build_summary(&entity(), &filters, &indicators, &[]);

        assert!(summary.contains("EEF José de Alencar (Escola)"));
        assert!(summary.contains("Edição: 2023"));
        assert!(summary.contains("Proficiência Média: 200.0"));
        assert!(summary.contains("50.0% (1 de 2, Crítico)"));
        assert!(summary.contains("Sexo: sem dados"));
        assert!(summary.contains(": 225"));
    }

    #[test]
    fn test_summary_without_filters() {
        let indicators = compute_indicators(&[], &[IndicatorKind::MeanProficiency]);
        let summary = build_summary(&entity(), &UserFilters::default(), &indicators, &[]);
        assert!(summary.contains("Filtros: nenhum"));
        assert!(summary.contains("Proficiência Média: sem dados"));
        assert!(!summary.contains("Comparação"));
    }

    #[test]
    fn test_cut_points() {
        assert_eq!(
            adequacy_cut_point(Stage::Fundamental9, Subject::Matematica),
            Some(300.0)
        );
        assert_eq!(
            adequacy_cut_point(Stage::Fundamental2, Subject::LinguaPortuguesa),
            None
        );
    }

    #[test]
    fn test_breakdown_keeps_scales_apart() {
        let mut rows = rows();
        for row in &mut rows {
            row.gender = Some("Feminino".to_string());
        }
        let mut literacy = rows[0].clone();
        literacy.stage = Stage::Fundamental2;
        literacy.proficiency = Some(700.0);
        literacy.performance_standard = None;
        rows.push(literacy);

        let refs: Vec<&ResultRow> = rows.iter().collect();
        let indicators = compute_indicators(&refs, &[IndicatorKind::GenderBreakdown]);
        let summary = build_summary(&entity(), &UserFilters::default(), &indicators, &[]);

        assert!(summary.contains(
            "Feminino média 700.0 (Escala 0-1000, n=1); 200.0 (Escala 0-500, n=2)"
        ));
    }
}
