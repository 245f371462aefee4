//! Side-by-side indicators for the entity and each enclosing scope.

use super::aggregator::{compute_indicators, IndicatorKind, IndicatorSet};
use super::scope::{filter_for_entity, UserFilters};
use crate::models::{Entity, ResultRow};
use serde::Serialize;
use tracing::debug;

/// Indicators shown in comparison cards; breakdowns stay on the entity's own panel.
pub const COMPARABLE: [IndicatorKind; 3] = [
    IndicatorKind::MeanProficiency,
    IndicatorKind::PerformanceDistribution,
    IndicatorKind::ParticipationRate,
];

/// One card of the comparison panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonEntry {
    pub entity: Entity,
    pub indicators: IndicatorSet,
}

/// Aggregate-only indicators for every ancestor of `entity`, outermost first.
///
/// Ancestors are evaluated with the user's non-organizational filters so the
/// cards compare like with like. Only aggregates leave this function; the
/// ancestor's rows are never exposed to the caller.
pub fn compare_with_ancestors(
    rows: &[ResultRow],
    entity: &Entity,
    filters: &UserFilters,
    requested: &[IndicatorKind],
) -> Vec<ComparisonEntry> {
    let kinds: Vec<IndicatorKind> = requested
        .iter()
        .copied()
        .filter(|kind| COMPARABLE.contains(kind))
        .collect();
    if kinds.is_empty() {
        return Vec::new();
    }

    let filters = filters.without_hierarchy();

    entity
        .scope
        .ancestors()
        .into_iter()
        .map(|scope| {
            let ancestor = Entity::for_scope(scope);
            let visible = filter_for_entity(rows, &ancestor, &filters);
            debug!(
                "Comparison card {} built from {} rows",
                ancestor.name,
                visible.len()
            );
            ComparisonEntry {
                indicators: compute_indicators(&visible, &kinds),
                entity: ancestor,
            }
        })
        .collect()
}
