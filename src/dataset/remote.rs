//! Results API client.
//!
//! Fetches the records of one aggregate (state, CREDE, municipality or school
//! code) from the SPAECE results portal and converts them into [`Dataset`]
//! rows.

use super::{envelope_items, Dataset};
use crate::models::{Network, ResultRow, Stage, Subject};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Settings for the results portal.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    pub url: String,
    pub timeout_seconds: u64,
    /// Indicator codes requested from the portal.
    pub indicators: Vec<String>,
    /// Assessment year stamped on every fetched row.
    pub edition: u16,
    pub installation_id: String,
    pub session_token: Option<SecretString>,
}

/// Request body understood by the portal's `getDadosResultado` function.
#[derive(Debug, Serialize)]
struct ResultsRequest<'a> {
    #[serde(rename = "CD_INDICADOR")]
    indicators: &'a [String],
    #[serde(rename = "agregado")]
    aggregate: &'a str,
    #[serde(rename = "filtros")]
    filters: Vec<Value>,
    #[serde(rename = "filtrosAdicionais")]
    additional_filters: Vec<Value>,
    #[serde(rename = "nivelAbaixo")]
    level_below: &'static str,
    #[serde(rename = "ordenacao")]
    ordering: Option<Value>,
    #[serde(rename = "collectionResultado")]
    result_collection: Option<Value>,
    #[serde(rename = "CD_INDICADOR_LABEL")]
    indicator_labels: Vec<String>,
    #[serde(rename = "TP_ENTIDADE_LABEL")]
    entity_type_label: &'static str,
    #[serde(rename = "_ApplicationId")]
    application_id: &'static str,
    #[serde(rename = "_ClientVersion")]
    client_version: &'static str,
    #[serde(rename = "_InstallationId")]
    installation_id: &'a str,
    #[serde(rename = "_SessionToken", skip_serializing_if = "Option::is_none")]
    session_token: Option<&'a str>,
}

/// One record as the portal returns it.
#[derive(Debug, Deserialize)]
struct PortalRecord {
    #[serde(rename = "CD_ENTIDADE")]
    entity_code: Value,
    #[serde(rename = "TP_ENTIDADE", default)]
    entity_type: Option<String>,
    /// Slash-separated codes from the state down, e.g. `23/CREDE01/230010`.
    #[serde(rename = "DC_HIERARQUIA", default)]
    hierarchy: Option<String>,
    #[serde(rename = "VL_FILTRO_ETAPA")]
    stage: Stage,
    #[serde(rename = "VL_FILTRO_DISCIPLINA")]
    subject: Subject,
    #[serde(rename = "VL_FILTRO_REDE")]
    network: Network,
    #[serde(rename = "AVG_PROFICIENCIA_E1", default)]
    proficiency: Option<Value>,
}

/// `TP_ENTIDADE` of the state aggregate.
const STATE_ENTITY_TYPE: &str = "01";

impl PortalRecord {
    /// Convert into a result row.
    ///
    /// Levels below the record's own unit repeat its code, so a municipality
    /// record is visible to that municipality and to every scope above it,
    /// and to no school.
    fn into_row(self, edition: u16) -> std::result::Result<ResultRow, String> {
        let entity = scalar_text(&self.entity_code)
            .ok_or_else(|| format!("invalid CD_ENTIDADE: {}", self.entity_code))?;

        let mut codes: Vec<String> = self
            .hierarchy
            .as_deref()
            .unwrap_or_default()
            .split('/')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(String::from)
            .collect();

        if codes.is_empty() && self.entity_type.as_deref() != Some(STATE_ENTITY_TYPE) {
            return Err(format!("entity {} has no DC_HIERARQUIA", entity));
        }
        if codes.last() != Some(&entity) {
            codes.push(entity.clone());
        }
        if codes.len() > 4 {
            return Err(format!(
                "hierarchy {} is deeper than state/CREDE/municipality/school",
                codes.join("/")
            ));
        }

        let level = |index: usize| codes.get(index).cloned().unwrap_or_else(|| entity.clone());

        let proficiency = match self.proficiency {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                scalar_number(&value)
                    .ok_or_else(|| format!("non-numeric AVG_PROFICIENCIA_E1: {}", value))?,
            ),
        };

        Ok(ResultRow {
            state: level(0),
            region: level(1),
            municipality: level(2),
            school: level(3),
            stage: self.stage,
            subject: self.subject,
            network: self.network,
            year: edition,
            proficiency,
            performance_standard: None,
            socioeconomic_level: None,
            gender: None,
            race: None,
            skill: None,
            participated: None,
        })
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn scalar_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

/// Convert a portal response body into a dataset. Records that cannot be
/// converted are counted as skipped.
fn portal_dataset(body: Value, edition: u16) -> Result<Dataset> {
    let items = envelope_items(body)?;

    let mut rows = Vec::with_capacity(items.len());
    let mut unparsable = 0;
    for (index, item) in items.into_iter().enumerate() {
        let converted = serde_json::from_value::<PortalRecord>(item)
            .map_err(|e| e.to_string())
            .and_then(|record| record.into_row(edition));
        match converted {
            Ok(row) => rows.push(row),
            Err(reason) => {
                warn!("Skipping portal record {}: {}", index, reason);
                unparsable += 1;
            }
        }
    }

    let mut dataset = Dataset::from_rows(rows);
    dataset.skipped += unparsable;
    Ok(dataset)
}

impl RemoteSource {
    /// Fetch and validate the rows of one aggregate.
    pub async fn fetch(&self, aggregate: &str) -> Result<Dataset> {
        let aggregate = aggregate.trim();
        if aggregate.is_empty() {
            anyhow::bail!("Aggregate code must not be empty");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        let request = ResultsRequest {
            indicators: &self.indicators,
            aggregate,
            filters: Vec::new(),
            additional_filters: Vec::new(),
            level_below: "0",
            ordering: None,
            result_collection: None,
            indicator_labels: Vec::new(),
            entity_type_label: "01",
            application_id: "portal",
            client_version: "js2.19.0",
            installation_id: &self.installation_id,
            session_token: self.session_token.as_ref().map(|t| t.expose_secret()),
        };

        info!("Requesting aggregate {} from {}", aggregate, self.url);

        let response = client
            .post(&self.url)
            .header("Accept", "application/json, text/plain, */*")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!(
                        "Results API timed out after {}s for aggregate {}",
                        self.timeout_seconds,
                        aggregate
                    )
                } else if e.is_connect() {
                    anyhow::anyhow!("Cannot connect to results API at {}", self.url)
                } else {
                    anyhow::anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Results API error {}: {}", status, body));
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to decode results API response")?;

        let dataset = portal_dataset(body, self.edition)?;
        debug!(
            "Aggregate {} returned {} rows ({} skipped)",
            aggregate,
            dataset.len(),
            dataset.skipped()
        );

        if dataset.is_empty() {
            anyhow::bail!("No data returned for aggregate {}", aggregate);
        }

        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn source(url: String) -> RemoteSource {
        RemoteSource {
            url,
            timeout_seconds: 5,
            indicators: vec!["AVG_PROFICIENCIA_E1".to_string()],
            edition: 2024,
            installation_id: "test-installation".to_string(),
            session_token: Some(SecretString::from("r:token".to_string())),
        }
    }

    const PORTAL_BODY: &str = r#"{"result": [
        {"CD_ENTIDADE": "230010", "TP_ENTIDADE": "11", "NM_ENTIDADE": "AQUIRAZ",
         "DC_HIERARQUIA": "23/CREDE01/230010",
         "VL_FILTRO_ETAPA": "ENSINO FUNDAMENTAL DE 9 ANOS - 5º ANO",
         "VL_FILTRO_DISCIPLINA": "LP", "VL_FILTRO_REDE": "MUNICIPAL",
         "AVG_PROFICIENCIA_E1": 201.4},
        {"CD_ENTIDADE": 23012345, "TP_ENTIDADE": "03",
         "DC_HIERARQUIA": "23/CREDE01/230010/23012345",
         "VL_FILTRO_ETAPA": "ENSINO FUNDAMENTAL DE 9 ANOS - 2º ANO",
         "VL_FILTRO_DISCIPLINA": "MT", "VL_FILTRO_REDE": "MUNICIPAL",
         "AVG_PROFICIENCIA_E1": "612,5"},
        {"CD_ENTIDADE": "230010", "TP_ENTIDADE": "11",
         "DC_HIERARQUIA": "23/CREDE01/230010",
         "VL_FILTRO_ETAPA": "ENSINO FUNDAMENTAL DE 9 ANOS - 9º ANO",
         "VL_FILTRO_DISCIPLINA": "MT", "VL_FILTRO_REDE": "PUBLICA"}
    ]}"#;

    #[tokio::test]
    async fn test_fetch_converts_portal_records() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/getDadosResultado")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "agregado": "230010",
                "_SessionToken": "r:token"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(PORTAL_BODY)
            .create_async()
            .await;

        let url = format!("{}/getDadosResultado", server.url());
        let dataset = source(url).fetch(" 230010 ").await.unwrap();

        mock.assert_async().await;
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.skipped(), 1);

        let municipality = &dataset.rows()[0];
        assert_eq!(municipality.state, "23");
        assert_eq!(municipality.region, "CREDE01");
        assert_eq!(municipality.municipality, "230010");
        assert_eq!(municipality.school, "230010");
        assert_eq!(municipality.stage, Stage::Fundamental5);
        assert_eq!(municipality.subject, Subject::LinguaPortuguesa);
        assert_eq!(municipality.network, Network::Municipal);
        assert_eq!(municipality.year, 2024);
        assert_eq!(municipality.proficiency, Some(201.4));

        let school = &dataset.rows()[1];
        assert_eq!(school.municipality, "230010");
        assert_eq!(school.school, "23012345");
        assert_eq!(school.stage, Stage::Fundamental2);
        assert_eq!(school.proficiency, Some(612.5));
    }

    #[test]
    fn test_state_record_without_hierarchy() {
        let record: PortalRecord = serde_json::from_value(serde_json::json!({
            "CD_ENTIDADE": "23",
            "TP_ENTIDADE": "01",
            "VL_FILTRO_ETAPA": "ENSINO MEDIO - 3ª SERIE",
            "VL_FILTRO_DISCIPLINA": "LP",
            "VL_FILTRO_REDE": "ESTADUAL"
        }))
        .unwrap();

        let row = record.into_row(2023).unwrap();
        assert_eq!(row.state, "23");
        assert_eq!(row.region, "23");
        assert_eq!(row.school, "23");
        assert_eq!(row.proficiency, None);
    }

    #[test]
    fn test_record_without_hierarchy_is_rejected() {
        let record: PortalRecord = serde_json::from_value(serde_json::json!({
            "CD_ENTIDADE": "230010",
            "TP_ENTIDADE": "11",
            "VL_FILTRO_ETAPA": "ENSINO FUNDAMENTAL DE 9 ANOS - 5º ANO",
            "VL_FILTRO_DISCIPLINA": "MT",
            "VL_FILTRO_REDE": "MUNICIPAL"
        }))
        .unwrap();

        let err = record.into_row(2024).unwrap_err();
        assert!(err.contains("DC_HIERARQUIA"));
    }

    #[tokio::test]
    async fn test_fetch_reports_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/getDadosResultado")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let url = format!("{}/getDadosResultado", server.url());
        let err = source(url).fetch("23").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_empty_aggregate() {
        let err = source("http://localhost:1".to_string())
            .fetch("   ")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
