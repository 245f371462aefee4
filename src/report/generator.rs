//! Report rendering: terminal table, Markdown and JSON.

use super::{Report, ReportMetadata};
use crate::analysis::aggregator::{
    format_percent, round_half_up, Distribution, GroupIndicators, IndicatorKind, IndicatorResult,
    IndicatorValue, ParticipationRate, ParticipationStatus, ScaledMeans,
};
use crate::analysis::{ComparisonEntry, IndicatorSet};
use crate::error::DashboardError;
use crate::narrative::NarrativePanel;
use anyhow::Result;

const NO_DATA: &str = "Sem dados";

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "# Painel SPAECE - {}\n\n",
        report.metadata.entity.name
    ));

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_filters_section(report));
    output.push_str(&generate_indicators_section(&report.indicators));
    output.push_str(&generate_comparison_section(report));

    if let Some(ref narrative) = report.narrative {
        output.push_str(&generate_narrative_section(narrative));
    }

    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Identificação\n\n");
    section.push_str(&format!(
        "- **Entidade:** {} (`{}`)\n",
        metadata.entity.name, metadata.entity.code
    ));
    section.push_str(&format!("- **Perfil:** {}\n", metadata.entity.role()));
    section.push_str(&format!("- **Fonte:** {}\n", metadata.source));
    section.push_str(&format!(
        "- **Gerado em:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Registros visíveis:** {} de {}\n",
        metadata.rows_visible, metadata.rows_loaded
    ));
    if metadata.rows_skipped > 0 {
        section.push_str(&format!(
            "- **Registros descartados na carga:** {}\n",
            metadata.rows_skipped
        ));
    }
    section.push_str(&format!(
        "- **Duração:** {:.1}s\n\n",
        metadata.duration_seconds
    ));

    section
}

fn generate_filters_section(report: &Report) -> String {
    let mut section = String::new();

    section.push_str("## Filtros\n\n");

    let active = report.filters.describe();
    if active.is_empty() {
        section.push_str("Nenhum filtro aplicado.\n\n");
    } else {
        for filter in active {
            section.push_str(&format!("- {}\n", filter));
        }
        section.push('\n');
    }

    for ignored in &report.ignored_filters {
        section.push_str(&format!("> ⚠️ {}\n", ignored));
    }
    if !report.ignored_filters.is_empty() {
        section.push('\n');
    }

    section
}

fn generate_indicators_section(indicators: &IndicatorSet) -> String {
    let mut section = String::new();

    section.push_str("## Indicadores\n\n");

    for (kind, result) in &indicators.values {
        section.push_str(&format!("### {}\n\n", kind));
        section.push_str(&generate_indicator_block(*kind, result));
    }

    section
}

/// Markdown block for one indicator, or the "no data" marker.
fn generate_indicator_block(kind: IndicatorKind, result: &IndicatorResult) -> String {
    let value = match result {
        Ok(value) => value,
        Err(_) => return format!("*{}*\n\n", NO_DATA),
    };

    let mut block = String::new();

    match value {
        IndicatorValue::MeanProficiency(means) => {
            block.push_str("| Escala | Média | Registros |\n");
            block.push_str("|:---|:---:|:---:|\n");
            for (scale, stat) in means {
                block.push_str(&format!(
                    "| {} | {:.1} | {} |\n",
                    scale,
                    round_half_up(stat.mean, 1),
                    stat.count
                ));
            }
        }
        IndicatorValue::Distribution(distribution) => {
            block.push_str(&distribution_table(distribution));
        }
        IndicatorValue::Participation(rate) => {
            block.push_str("| Participantes | Previstos | Taxa | Situação |\n");
            block.push_str("|:---:|:---:|:---:|:---|\n");
            block.push_str(&format!(
                "| {} | {} | {} | {} {} |\n",
                rate.participated,
                rate.expected,
                format_percent(rate.percent),
                status_emoji(rate.status()),
                rate.status()
            ));
        }
        IndicatorValue::Breakdown(groups) => {
            block.push_str(&format!("| {} | Registros | Média | Padrões |\n", kind));
            block.push_str("|:---|:---:|:---:|:---|\n");
            for (group, indicators) in groups {
                block.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    group,
                    indicators.rows,
                    group_mean(indicators),
                    group_distribution(indicators)
                ));
            }
        }
    }

    block.push('\n');
    block
}

fn distribution_table(distribution: &Distribution) -> String {
    let mut table = String::new();

    table.push_str("| Padrão | Registros | % |\n");
    table.push_str("|:---|:---:|:---:|\n");
    for (standard, share) in &distribution.shares {
        table.push_str(&format!(
            "| {} | {} | {} |\n",
            standard,
            share.count,
            format_percent(share.percent)
        ));
    }

    table
}

fn generate_comparison_section(report: &Report) -> String {
    if report.comparison.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Comparação\n\n");
    section.push_str("| Instância | Registros | Proficiência Média | Participação |\n");
    section.push_str("|:---|:---:|:---:|:---:|\n");

    section.push_str(&comparison_row(
        &format!("**{}**", report.metadata.entity.name),
        &report.indicators,
    ));
    for entry in &report.comparison {
        section.push_str(&comparison_row(&entry_label(entry), &entry.indicators));
    }
    section.push('\n');

    section
}

fn entry_label(entry: &ComparisonEntry) -> String {
    format!("{} ({})", entry.entity.name, entry.entity.role())
}

fn comparison_row(label: &str, indicators: &IndicatorSet) -> String {
    format!(
        "| {} | {} | {} | {} |\n",
        label,
        indicators.rows,
        mean_cell(indicators),
        participation_cell(indicators)
    )
}

fn generate_narrative_section(narrative: &NarrativePanel) -> String {
    let mut section = String::new();

    section.push_str("## Análise\n\n");
    match narrative {
        NarrativePanel::Ready(text) => {
            section.push_str(text);
            section.push_str("\n\n");
        }
        NarrativePanel::Unavailable(reason) => {
            section.push_str(&format!("> ⚠️ {}\n\n", reason));
        }
    }

    section
}

fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Relatório gerado por spaece-insights v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate the plain-text terminal view.
pub fn generate_table_report(report: &Report) -> String {
    let mut out = String::new();
    let metadata = &report.metadata;

    out.push_str(&format!(
        "📊 {} ({}) - {}\n",
        metadata.entity.name,
        metadata.entity.code,
        metadata.entity.role()
    ));
    out.push_str(&format!(
        "   Registros visíveis: {} de {}\n",
        metadata.rows_visible, metadata.rows_loaded
    ));

    let active = report.filters.describe();
    if !active.is_empty() {
        out.push_str(&format!("   Filtros: {}\n", active.join(" | ")));
    }
    for ignored in &report.ignored_filters {
        out.push_str(&format!("   ⚠️  {}\n", ignored));
    }

    for (kind, result) in &report.indicators.values {
        out.push_str(&format!("\n{}\n", kind));
        match result {
            Ok(value) => out.push_str(&table_lines(value)),
            Err(_) => out.push_str(&format!("   {}\n", NO_DATA)),
        }
    }

    if !report.comparison.is_empty() {
        out.push_str("\nComparação\n");
        out.push_str(&format!(
            "   {:<40} {:>10} {:>12}\n",
            metadata.entity.name,
            mean_cell(&report.indicators),
            participation_cell(&report.indicators)
        ));
        for entry in &report.comparison {
            out.push_str(&format!(
                "   {:<40} {:>10} {:>12}\n",
                entry_label(entry),
                mean_cell(&entry.indicators),
                participation_cell(&entry.indicators)
            ));
        }
    }

    if let Some(ref narrative) = report.narrative {
        out.push_str("\nAnálise\n");
        match narrative {
            NarrativePanel::Ready(text) => {
                for line in text.lines() {
                    out.push_str(&format!("   {}\n", line));
                }
            }
            NarrativePanel::Unavailable(reason) => {
                out.push_str(&format!("   ⚠️  {}\n", reason));
            }
        }
    }

    out
}

fn table_lines(value: &IndicatorValue) -> String {
    let mut lines = String::new();

    match value {
        IndicatorValue::MeanProficiency(means) => {
            for (scale, stat) in means {
                lines.push_str(&format!(
                    "   {:<20} {:>8.1}   (n={})\n",
                    scale.to_string(),
                    round_half_up(stat.mean, 1),
                    stat.count
                ));
            }
        }
        IndicatorValue::Distribution(distribution) => {
            for (standard, share) in &distribution.shares {
                lines.push_str(&format!(
                    "   {:<26} {:>7}   (n={})\n",
                    standard.to_string(),
                    format_percent(share.percent),
                    share.count
                ));
            }
        }
        IndicatorValue::Participation(rate) => {
            lines.push_str(&format!("   {}\n", participation_text(rate)));
        }
        IndicatorValue::Breakdown(groups) => {
            for (group, indicators) in groups {
                lines.push_str(&format!(
                    "   {:<26} {:>8}   (n={})\n",
                    group,
                    group_mean(indicators),
                    indicators.rows
                ));
            }
        }
    }

    lines
}

fn participation_text(rate: &ParticipationRate) -> String {
    format!(
        "{} {} ({} de {}) {}",
        status_emoji(rate.status()),
        format_percent(rate.percent),
        rate.participated,
        rate.expected,
        rate.status()
    )
}

fn status_emoji(status: ParticipationStatus) -> &'static str {
    match status {
        ParticipationStatus::Critical => "🔴",
        ParticipationStatus::Attention => "🟡",
        ParticipationStatus::Adequate => "🟢",
    }
}

fn means_text(means: &ScaledMeans) -> String {
    if means.len() == 1 {
        if let Some(stat) = means.values().next() {
            return format!("{:.1}", round_half_up(stat.mean, 1));
        }
    }
    means
        .iter()
        .map(|(scale, stat)| format!("{:.1} ({})", round_half_up(stat.mean, 1), scale))
        .collect::<Vec<_>>()
        .join(" / ")
}

fn group_mean(indicators: &GroupIndicators) -> String {
    indicators
        .mean_proficiency
        .as_ref()
        .map(means_text)
        .unwrap_or_else(|| "-".to_string())
}

fn group_distribution(indicators: &GroupIndicators) -> String {
    match indicators.distribution {
        Some(ref distribution) => distribution
            .shares
            .iter()
            .map(|(standard, share)| format!("{} {}", standard, format_percent(share.percent)))
            .collect::<Vec<_>>()
            .join(", "),
        None => "-".to_string(),
    }
}

fn mean_cell(indicators: &IndicatorSet) -> String {
    match indicators.get(IndicatorKind::MeanProficiency) {
        Some(Ok(IndicatorValue::MeanProficiency(means))) => means_text(means),
        _ => NO_DATA.to_string(),
    }
}

fn participation_cell(indicators: &IndicatorSet) -> String {
    match indicators.get(IndicatorKind::ParticipationRate) {
        Some(Ok(IndicatorValue::Participation(rate))) => format_percent(rate.percent),
        _ => NO_DATA.to_string(),
    }
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// User messages for selectors the scope filter dropped.
pub fn ignored_messages(ignored: &[DashboardError]) -> Vec<String> {
    ignored.iter().map(|e| e.user_message()).collect()
}
