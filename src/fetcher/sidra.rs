use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::info;

use super::{SourceConnector, USER_AGENT};
use crate::error::{EngineError, Result};
use crate::models::{RawDocument, SourceDescriptor};

/// IBGE SIDRA aggregates API (`servicodados.ibge.gov.br/api/v3/agregados`).
pub struct SidraConnector {
    client: Client,
}

impl SidraConnector {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }
}

impl Default for SidraConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceConnector for SidraConnector {
    fn name(&self) -> &str {
        "sidra"
    }

    async fn fetch(&self, descriptor: &SourceDescriptor) -> Result<RawDocument> {
        info!(source = %descriptor.id, url = %descriptor.location, "fetching statistical API");

        let resp = self
            .client
            .get(&descriptor.location)
            .send()
            .await
            .map_err(|e| EngineError::fetch(&descriptor.id, format!("request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::fetch(
                &descriptor.id,
                format!("HTTP {} - Body: {}", status, body.chars().take(200).collect::<String>()),
            ));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| EngineError::fetch(&descriptor.id, format!("malformed JSON: {}", e)))?;

        Ok(RawDocument::Json(json))
    }
}
