//! Scope filter: which rows an authenticated entity may see.
//!
//! Filtering runs in two passes. The entity's authorization scope is applied
//! first and cannot be influenced by user input; user-selected filters are
//! then applied as extra equality/membership constraints that only narrow.

use crate::error::DashboardError;
use crate::models::{Entity, Network, ResultRow, Role, Scope, Stage, Subject};
use serde::Serialize;
use tracing::{debug, warn};

/// User-selected filters. Empty lists and `None` mean "any".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserFilters {
    pub stages: Vec<Stage>,
    pub subjects: Vec<Subject>,
    pub network: Option<Network>,
    pub years: Vec<u16>,
    pub socioeconomic_level: Option<String>,
    pub gender: Option<String>,
    pub race: Option<String>,
    pub region: Option<String>,
    pub municipality: Option<String>,
    pub school: Option<String>,
}

impl UserFilters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether a row satisfies every selected constraint.
    pub fn matches(&self, row: &ResultRow) -> bool {
        fn member<T: PartialEq>(selected: &[T], value: &T) -> bool {
            selected.is_empty() || selected.contains(value)
        }
        fn equal(selected: &Option<String>, value: Option<&str>) -> bool {
            match selected {
                Some(wanted) => value == Some(wanted.as_str()),
                None => true,
            }
        }

        member(&self.stages, &row.stage)
            && member(&self.subjects, &row.subject)
            && member(&self.years, &row.year)
            && self.network.map_or(true, |n| n == row.network)
            && equal(&self.socioeconomic_level, row.socioeconomic_level.as_deref())
            && equal(&self.gender, row.gender.as_deref())
            && equal(&self.race, row.race.as_deref())
            && equal(&self.region, Some(row.region.as_str()))
            && equal(&self.municipality, Some(row.municipality.as_str()))
            && equal(&self.school, Some(row.school.as_str()))
    }

    /// Drop organizational selectors that would point outside `scope`.
    ///
    /// A selector at or above the scope's own level must name the scope's own
    /// unit; anything else is reported as a violation and removed. Selectors
    /// below the scope's level are kept and narrow normally.
    pub fn restrict_to(&self, scope: &Scope) -> (UserFilters, Vec<DashboardError>) {
        let mut restricted = self.clone();
        let mut violations = Vec::new();

        let selectors = [
            (Role::RegionalCoordination, &mut restricted.region),
            (Role::Municipality, &mut restricted.municipality),
            (Role::School, &mut restricted.school),
        ];

        for (level, selector) in selectors {
            let Some(requested) = selector.as_deref() else {
                continue;
            };
            match scope.identifier_at(level) {
                Some(own) if own == requested => {}
                Some(own) => {
                    violations.push(DashboardError::ScopeViolation(format!(
                        "{} {} requested, but this login is limited to {} {}",
                        level, requested, level, own
                    )));
                    *selector = None;
                }
                None => {}
            }
        }

        (restricted, violations)
    }

    /// The same filters without organizational selectors.
    pub fn without_hierarchy(&self) -> UserFilters {
        UserFilters {
            region: None,
            municipality: None,
            school: None,
            ..self.clone()
        }
    }

    /// Human-readable list of active filters.
    pub fn describe(&self) -> Vec<String> {
        fn join<T: std::fmt::Display>(values: &[T]) -> String {
            values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        }

        let mut parts = Vec::new();
        if !self.stages.is_empty() {
            parts.push(format!("Etapa: {}", join(&self.stages)));
        }
        if !self.subjects.is_empty() {
            parts.push(format!("Componente: {}", join(&self.subjects)));
        }
        if let Some(network) = self.network {
            parts.push(format!("Rede: {}", network));
        }
        if !self.years.is_empty() {
            parts.push(format!("Edição: {}", join(&self.years)));
        }
        let optional = [
            ("NSE", &self.socioeconomic_level),
            ("Sexo", &self.gender),
            ("Raça/Cor", &self.race),
            ("CREDE", &self.region),
            ("Município", &self.municipality),
            ("Escola", &self.school),
        ];
        for (label, value) in optional {
            if let Some(value) = value {
                parts.push(format!("{}: {}", label, value));
            }
        }
        parts
    }
}

/// Rows visible to an entity plus the selectors that were ignored.
#[derive(Debug)]
pub struct Selection<'a> {
    pub rows: Vec<&'a ResultRow>,
    pub ignored: Vec<DashboardError>,
}

/// Apply the entity's scope, then the user's filters.
pub fn select_for_entity<'a>(
    rows: &'a [ResultRow],
    entity: &Entity,
    filters: &UserFilters,
) -> Selection<'a> {
    let (filters, ignored) = filters.restrict_to(&entity.scope);
    for violation in &ignored {
        warn!("{}", violation);
    }

    let selected: Vec<&ResultRow> = rows
        .iter()
        .filter(|row| entity.scope.contains(row))
        .filter(|row| filters.matches(row))
        .collect();

    debug!(
        "Entity {} ({}) sees {} of {} rows",
        entity.code,
        entity.role(),
        selected.len(),
        rows.len()
    );

    Selection {
        rows: selected,
        ignored,
    }
}

/// Rows of `rows` that `entity` may see under `filters`.
pub fn filter_for_entity<'a>(
    rows: &'a [ResultRow],
    entity: &Entity,
    filters: &UserFilters,
) -> Vec<&'a ResultRow> {
    select_for_entity(rows, entity, filters).rows
}
