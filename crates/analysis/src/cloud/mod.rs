//! Azure Document Intelligence REST client.
//!
//! Submits image bytes to a prebuilt model, then polls the operation URL the
//! service returns until the analysis settles.

mod wire;

use std::time::Duration;

use receiptly_core::config::DocumentServiceConfig;
use receiptly_core::{AnalyzedReceipt, DocumentService, LayoutResult, LayoutService, ServiceError};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use tracing::{debug, info};

use wire::{AnalyzeResult, Operation};

const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OPERATION_HEADER: &str = "Operation-Location";

pub struct AzureDocumentClient {
    client: Client,
    config: DocumentServiceConfig,
}

impl AzureDocumentClient {
    /// Missing credentials are not an error here; each call reports
    /// [`ServiceError::NotConfigured`] instead.
    pub fn new(config: DocumentServiceConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn credentials(&self) -> Result<(&str, &str), ServiceError> {
        let endpoint = self
            .config
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ServiceError::NotConfigured("endpoint is not set".into()))?;
        let key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ServiceError::NotConfigured("API key is not set".into()))?;
        Ok((endpoint, key))
    }

    async fn analyze(&self, model: &str, image: &[u8]) -> Result<AnalyzeResult, ServiceError> {
        let (endpoint, key) = self.credentials()?;
        let url = format!(
            "{}/formrecognizer/documentModels/{model}:analyze?api-version={}",
            endpoint.trim_end_matches('/'),
            self.config.api_version
        );

        let response = self
            .client
            .post(&url)
            .header(KEY_HEADER, key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(transport)?;
        let response = check_status(response).await?;
        let operation_url = response
            .headers()
            .get(OPERATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Protocol(format!("missing {OPERATION_HEADER} header")))?
            .to_string();
        debug!(model, bytes = image.len(), "Analysis submitted");

        let interval = Duration::from_millis(self.config.poll_interval_ms);
        for poll in 1..=self.config.max_polls {
            tokio::time::sleep(interval).await;
            let response = self
                .client
                .get(&operation_url)
                .header(KEY_HEADER, key)
                .send()
                .await
                .map_err(transport)?;
            let operation: Operation = check_status(response)
                .await?
                .json()
                .await
                .map_err(|e| ServiceError::Protocol(e.to_string()))?;

            match operation.status.as_str() {
                "succeeded" => {
                    info!(model, polls = poll, "Analysis succeeded");
                    return operation
                        .analyze_result
                        .ok_or_else(|| ServiceError::Protocol("succeeded without analyzeResult".into()));
                }
                "failed" | "canceled" => {
                    let reason = operation.error.map(|e| e.describe()).unwrap_or_else(|| operation.status.clone());
                    return Err(ServiceError::Failed(reason));
                }
                status => debug!(model, poll, status, "Analysis pending"),
            }
        }
        Err(ServiceError::Timeout(self.config.max_polls))
    }
}

impl DocumentService for AzureDocumentClient {
    async fn analyze_receipt(&self, image: &[u8]) -> Result<Option<AnalyzedReceipt>, ServiceError> {
        let result = self.analyze(&self.config.receipt_model, image).await?;
        Ok(result.into_receipt())
    }
}

impl LayoutService for AzureDocumentClient {
    async fn analyze_layout(&self, image: &[u8]) -> Result<LayoutResult, ServiceError> {
        let result = self.analyze(&self.config.layout_model, image).await?;
        Ok(result.into_layout())
    }
}

fn transport(e: reqwest::Error) -> ServiceError {
    ServiceError::Transport(e.to_string())
}

async fn check_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status { status: status.as_u16(), body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_credentials_are_reported() {
        let client = AzureDocumentClient::new(DocumentServiceConfig::default()).unwrap();
        let err = client.analyze_receipt(b"img").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotConfigured(_)));

        let config = DocumentServiceConfig { endpoint: Some("https://x".into()), api_key: Some("  ".into()), ..Default::default() };
        let err = AzureDocumentClient::new(config).unwrap().analyze_layout(b"img").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotConfigured(m) if m.contains("API key")));
    }
}
