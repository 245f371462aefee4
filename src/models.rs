//! Data models for SPAECE results.
//!
//! This module contains the core data structures shared by the loader,
//! the scope filter, the aggregator and the report generator.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Assessed stage (grade/series).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
pub enum Stage {
    #[serde(
        rename = "2º Ano - Fundamental",
        alias = "ENSINO FUNDAMENTAL DE 9 ANOS - 2º ANO",
        alias = "EF2"
    )]
    #[value(name = "ef2")]
    Fundamental2,
    #[serde(
        rename = "5º Ano - Fundamental",
        alias = "ENSINO FUNDAMENTAL DE 9 ANOS - 5º ANO",
        alias = "EF5"
    )]
    #[value(name = "ef5")]
    Fundamental5,
    #[serde(
        rename = "9º Ano - Fundamental",
        alias = "ENSINO FUNDAMENTAL DE 9 ANOS - 9º ANO",
        alias = "EF9"
    )]
    #[value(name = "ef9")]
    Fundamental9,
    #[serde(rename = "2ª Série - Médio", alias = "ENSINO MEDIO - 2ª SERIE", alias = "EM2")]
    #[value(name = "em2")]
    Medio2,
    #[serde(rename = "3ª Série - Médio", alias = "ENSINO MEDIO - 3ª SERIE", alias = "EM3")]
    #[value(name = "em3")]
    Medio3,
    #[serde(
        rename = "3ª Série - Médio EJA",
        alias = "EJA DO ENSINO MEDIO - 3ª SÉRIE",
        alias = "EM3-EJA"
    )]
    #[value(name = "em3-eja")]
    Medio3Eja,
}

impl Stage {
    /// The proficiency scale this stage is reported on.
    pub fn scale(&self) -> ScaleVariant {
        match self {
            Stage::Fundamental2 => ScaleVariant::Literacy,
            _ => ScaleVariant::Standard,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Fundamental2 => "2º Ano - Fundamental",
            Stage::Fundamental5 => "5º Ano - Fundamental",
            Stage::Fundamental9 => "9º Ano - Fundamental",
            Stage::Medio2 => "2ª Série - Médio",
            Stage::Medio3 => "3ª Série - Médio",
            Stage::Medio3Eja => "3ª Série - Médio EJA",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Curricular component.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
pub enum Subject {
    #[serde(rename = "Língua Portuguesa", alias = "LP")]
    #[value(name = "lp")]
    LinguaPortuguesa,
    #[serde(rename = "Matemática", alias = "MT")]
    #[value(name = "mt")]
    Matematica,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::LinguaPortuguesa => write!(f, "Língua Portuguesa"),
            Subject::Matematica => write!(f, "Matemática"),
        }
    }
}

/// School network.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
pub enum Network {
    #[serde(rename = "Estadual", alias = "ESTADUAL")]
    Estadual,
    #[serde(rename = "Municipal", alias = "MUNICIPAL")]
    Municipal,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Estadual => write!(f, "Estadual"),
            Network::Municipal => write!(f, "Municipal"),
        }
    }
}

/// Numeric scale a proficiency score is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleVariant {
    /// Literacy scale used for the 2nd grade (0 to 1000).
    Literacy,
    /// Standard scale used from the 5th grade on (0 to 500).
    Standard,
}

impl ScaleVariant {
    pub fn max_score(&self) -> f64 {
        match self {
            ScaleVariant::Literacy => 1000.0,
            ScaleVariant::Standard => 500.0,
        }
    }

    pub fn contains(&self, score: f64) -> bool {
        score.is_finite() && (0.0..=self.max_score()).contains(&score)
    }
}

impl fmt::Display for ScaleVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleVariant::Literacy => write!(f, "Escala 0-1000"),
            ScaleVariant::Standard => write!(f, "Escala 0-500"),
        }
    }
}

/// Performance standard label.
///
/// Variant order follows the published progression within each scale, so
/// sorting a distribution by label yields lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PerformanceStandard {
    #[serde(rename = "Não Alfabetizado")]
    NaoAlfabetizado,
    #[serde(rename = "Alfabetização Incompleta")]
    AlfabetizacaoIncompleta,
    #[serde(rename = "Muito Crítico")]
    MuitoCritico,
    #[serde(rename = "Crítico")]
    Critico,
    #[serde(rename = "Intermediário")]
    Intermediario,
    #[serde(rename = "Suficiente")]
    Suficiente,
    #[serde(rename = "Adequado")]
    Adequado,
    #[serde(rename = "Desejável")]
    Desejavel,
}

impl PerformanceStandard {
    /// Whether this label is published for the given scale.
    pub fn belongs_to(&self, scale: ScaleVariant) -> bool {
        match self {
            PerformanceStandard::Intermediario => true,
            PerformanceStandard::NaoAlfabetizado
            | PerformanceStandard::AlfabetizacaoIncompleta
            | PerformanceStandard::Suficiente
            | PerformanceStandard::Desejavel => scale == ScaleVariant::Literacy,
            PerformanceStandard::MuitoCritico
            | PerformanceStandard::Critico
            | PerformanceStandard::Adequado => scale == ScaleVariant::Standard,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PerformanceStandard::NaoAlfabetizado => "Não Alfabetizado",
            PerformanceStandard::AlfabetizacaoIncompleta => "Alfabetização Incompleta",
            PerformanceStandard::MuitoCritico => "Muito Crítico",
            PerformanceStandard::Critico => "Crítico",
            PerformanceStandard::Intermediario => "Intermediário",
            PerformanceStandard::Suficiente => "Suficiente",
            PerformanceStandard::Adequado => "Adequado",
            PerformanceStandard::Desejavel => "Desejável",
        }
    }
}

impl fmt::Display for PerformanceStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One observed measurement for a student-group cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// State code (always the whole network, e.g. "23" for Ceará).
    pub state: String,
    /// Regional coordination (CREDE) code.
    pub region: String,
    /// Municipality (IBGE) code.
    pub municipality: String,
    /// School (INEP) code.
    pub school: String,
    pub stage: Stage,
    pub subject: Subject,
    pub network: Network,
    pub year: u16,
    /// Proficiency score on the stage's scale.
    #[serde(default)]
    pub proficiency: Option<f64>,
    #[serde(default)]
    pub performance_standard: Option<PerformanceStandard>,
    #[serde(default)]
    pub socioeconomic_level: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub race: Option<String>,
    /// Skill descriptor (e.g. "D12").
    #[serde(default)]
    pub skill: Option<String>,
    #[serde(default)]
    pub participated: Option<bool>,
}

impl ResultRow {
    pub fn scale(&self) -> ScaleVariant {
        self.stage.scale()
    }
}

/// Organizational level of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    State,
    RegionalCoordination,
    Municipality,
    School,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::State => write!(f, "Estado"),
            Role::RegionalCoordination => write!(f, "CREDE"),
            Role::Municipality => write!(f, "Município"),
            Role::School => write!(f, "Escola"),
        }
    }
}

/// Visibility scope of an entity.
///
/// Each variant carries its own identifier and those of its ancestors, so
/// containment is encoded as data rather than derived from a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Scope {
    State,
    RegionalCoordination {
        region: String,
    },
    Municipality {
        region: String,
        municipality: String,
    },
    School {
        region: String,
        municipality: String,
        school: String,
    },
}

impl Scope {
    pub fn role(&self) -> Role {
        match self {
            Scope::State => Role::State,
            Scope::RegionalCoordination { .. } => Role::RegionalCoordination,
            Scope::Municipality { .. } => Role::Municipality,
            Scope::School { .. } => Role::School,
        }
    }

    /// Whether a row is visible within this scope.
    pub fn contains(&self, row: &ResultRow) -> bool {
        match self {
            Scope::State => true,
            Scope::RegionalCoordination { region } => row.region == *region,
            Scope::Municipality {
                region,
                municipality,
            } => row.region == *region && row.municipality == *municipality,
            Scope::School {
                region,
                municipality,
                school,
            } => {
                row.region == *region
                    && row.municipality == *municipality
                    && row.school == *school
            }
        }
    }

    /// The enclosing scope one level up, `None` for the State.
    pub fn parent(&self) -> Option<Scope> {
        match self {
            Scope::State => None,
            Scope::RegionalCoordination { .. } => Some(Scope::State),
            Scope::Municipality { region, .. } => Some(Scope::RegionalCoordination {
                region: region.clone(),
            }),
            Scope::School {
                region,
                municipality,
                ..
            } => Some(Scope::Municipality {
                region: region.clone(),
                municipality: municipality.clone(),
            }),
        }
    }

    /// All enclosing scopes, outermost first.
    pub fn ancestors(&self) -> Vec<Scope> {
        let mut chain = Vec::new();
        let mut current = self.parent();
        while let Some(scope) = current {
            current = scope.parent();
            chain.push(scope);
        }
        chain.reverse();
        chain
    }

    /// The identifier this scope pins at the given level, if any.
    pub fn identifier_at(&self, level: Role) -> Option<&str> {
        match (self, level) {
            (Scope::RegionalCoordination { region }, Role::RegionalCoordination)
            | (Scope::Municipality { region, .. }, Role::RegionalCoordination)
            | (Scope::School { region, .. }, Role::RegionalCoordination) => Some(region),
            (Scope::Municipality { municipality, .. }, Role::Municipality)
            | (Scope::School { municipality, .. }, Role::Municipality) => Some(municipality),
            (Scope::School { school, .. }, Role::School) => Some(school),
            _ => None,
        }
    }
}

/// An authenticated actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub code: String,
    pub name: String,
    pub scope: Scope,
}

impl Entity {
    pub fn role(&self) -> Role {
        self.scope.role()
    }

    /// A synthetic entity standing for a whole scope, used for comparison panels.
    pub fn for_scope(scope: Scope) -> Self {
        let code = match &scope {
            Scope::State => "23".to_string(),
            Scope::RegionalCoordination { region } => region.clone(),
            Scope::Municipality { municipality, .. } => municipality.clone(),
            Scope::School { school, .. } => school.clone(),
        };
        let name = match scope.role() {
            Role::State => "Ceará".to_string(),
            Role::RegionalCoordination => format!("Regional {}", code),
            Role::Municipality => format!("Município {}", code),
            Role::School => format!("Escola {}", code),
        };
        Self { code, name, scope }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn school_scope() -> Scope {
        Scope::School {
            region: "CREDE01".to_string(),
            municipality: "MUN01".to_string(),
            school: "ESC001".to_string(),
        }
    }

    #[test]
    fn test_stage_scale() {
        assert_eq!(Stage::Fundamental2.scale(), ScaleVariant::Literacy);
        assert_eq!(Stage::Fundamental5.scale(), ScaleVariant::Standard);
        assert_eq!(Stage::Medio3Eja.scale(), ScaleVariant::Standard);
    }

    #[test]
    fn test_stage_accepts_api_labels() {
        let stage: Stage =
            serde_json::from_str("\"ENSINO FUNDAMENTAL DE 9 ANOS - 5º ANO\"").unwrap();
        assert_eq!(stage, Stage::Fundamental5);
        let subject: Subject = serde_json::from_str("\"MT\"").unwrap();
        assert_eq!(subject, Subject::Matematica);
        let network: Network = serde_json::from_str("\"MUNICIPAL\"").unwrap();
        assert_eq!(network, Network::Municipal);
    }

    #[test]
    fn test_standard_belongs_to_scale() {
        assert!(PerformanceStandard::Desejavel.belongs_to(ScaleVariant::Literacy));
        assert!(!PerformanceStandard::Desejavel.belongs_to(ScaleVariant::Standard));
        assert!(PerformanceStandard::Critico.belongs_to(ScaleVariant::Standard));
        assert!(PerformanceStandard::Intermediario.belongs_to(ScaleVariant::Literacy));
        assert!(PerformanceStandard::Intermediario.belongs_to(ScaleVariant::Standard));
    }

    #[test]
    fn test_scope_ancestors() {
        let ancestors = school_scope().ancestors();
        assert_eq!(ancestors.len(), 3);
        assert_eq!(ancestors[0], Scope::State);
        assert_eq!(ancestors[1].role(), Role::RegionalCoordination);
        assert_eq!(ancestors[2].role(), Role::Municipality);
        assert!(Scope::State.ancestors().is_empty());
    }

    #[test]
    fn test_identifier_at() {
        let school = school_scope();
        assert_eq!(school.identifier_at(Role::School), Some("ESC001"));
        assert_eq!(school.identifier_at(Role::Municipality), Some("MUN01"));
        assert_eq!(
            school.identifier_at(Role::RegionalCoordination),
            Some("CREDE01")
        );
        assert_eq!(Scope::State.identifier_at(Role::School), None);
    }
}
