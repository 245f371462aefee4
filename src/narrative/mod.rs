//! AI narrative generation.
//!
//! The narrative is an optional panel layered on top of already computed
//! indicators. A failing completion endpoint turns the panel into
//! [`NarrativePanel::Unavailable`]; it never touches the indicators.

pub mod client;
pub mod prompt;

pub use client::{ChatCompletionClient, ClientConfig};
pub use prompt::build_summary;

use crate::error::DashboardResult;
use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

/// Produces prose from an indicator summary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate_narrative(&self, summary: &str) -> DashboardResult<String>;
}

/// State of the narrative panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum NarrativePanel {
    Ready(String),
    Unavailable(String),
}

impl NarrativePanel {
    pub fn is_ready(&self) -> bool {
        matches!(self, NarrativePanel::Ready(_))
    }
}

/// Ask `generator` for a narrative, folding any failure into the panel state.
pub async fn narrate(generator: &dyn NarrativeGenerator, summary: &str) -> NarrativePanel {
    match generator.generate_narrative(summary).await {
        Ok(text) if !text.trim().is_empty() => NarrativePanel::Ready(text.trim().to_string()),
        Ok(_) => {
            warn!("Narrative service returned an empty answer");
            NarrativePanel::Unavailable("Análise indisponível: resposta vazia".to_string())
        }
        Err(e) => {
            warn!("Narrative unavailable: {}", e);
            NarrativePanel::Unavailable(e.user_message())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DashboardError;

    #[tokio::test]
    async fn test_narrate_ready() {
        let mut generator = MockNarrativeGenerator::new();
        generator
            .expect_generate_narrative()
            .withf(|summary| summary.contains("Proficiência"))
            .times(1)
            .returning(|_| Ok("  A escola avançou.  ".to_string()));

        let panel = narrate(&generator, "Proficiência Média: 210.0").await;
        assert_eq!(panel, NarrativePanel::Ready("A escola avançou.".to_string()));
        assert!(panel.is_ready());
    }

    #[tokio::test]
    async fn test_narrate_failure_is_unavailable() {
        let mut generator = MockNarrativeGenerator::new();
        generator
            .expect_generate_narrative()
            .returning(|_| Err(DashboardError::NarrativeService("timeout".to_string())));

        let panel = narrate(&generator, "resumo").await;
        assert_eq!(
            panel,
            NarrativePanel::Unavailable("Análise indisponível".to_string())
        );
    }

    #[test]
    fn test_narrate_empty_answer_is_unavailable() {
        let mut generator = MockNarrativeGenerator::new();
        generator
            .expect_generate_narrative()
            .returning(|_| Ok("   ".to_string()));

        let panel = tokio_test::block_on(narrate(&generator, "resumo"));
        assert!(!panel.is_ready());
    }
}
