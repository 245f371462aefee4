//! Domain error taxonomy.
//!
//! Every variant is recoverable at the presentation layer: each one maps to a
//! user-visible message rather than aborting the run.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Invalid credentials for entity code '{0}'")]
    InvalidCredentials(String),

    #[error(transparent)]
    EmptyIndicatorInput(#[from] EmptyIndicatorInput),

    #[error("Scope violation: {0}")]
    ScopeViolation(String),

    #[error("Narrative service error: {0}")]
    NarrativeService(String),
}

pub type DashboardResult<T> = Result<T, DashboardError>;

/// "No data" marker returned in place of an indicator value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[error("No data available for {indicator}")]
pub struct EmptyIndicatorInput {
    pub indicator: &'static str,
}

impl DashboardError {
    /// Short message suitable for a status line.
    pub fn user_message(&self) -> String {
        match self {
            DashboardError::InvalidCredentials(_) => "Código ou senha inválidos".to_string(),
            DashboardError::EmptyIndicatorInput(_) => "Sem dados".to_string(),
            DashboardError::ScopeViolation(detail) => {
                format!("Filtro ignorado (fora do escopo): {}", detail)
            }
            DashboardError::NarrativeService(_) => "Análise indisponível".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_indicator_message() {
        let err = DashboardError::from(EmptyIndicatorInput {
            indicator: "mean-proficiency",
        });
        assert_eq!(err.to_string(), "No data available for mean-proficiency");
        assert_eq!(err.user_message(), "Sem dados");
    }

    #[test]
    fn test_invalid_credentials_hides_detail() {
        let err = DashboardError::InvalidCredentials("XXXX".to_string());
        assert!(err.to_string().contains("XXXX"));
        assert!(!err.user_message().contains("XXXX"));
    }
}
