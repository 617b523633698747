use async_trait::async_trait;
use log::debug;
use reqwest::Client as HttpClient;
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::errors::ExchangeError;
use crate::models::refine::RefineRequest;

/// The one outbound call a submission makes.
#[async_trait]
pub trait RefineClient: Send + Sync {
    /// Returns the decoded JSON body, whatever its shape.
    async fn refine(&self, prompt: &str) -> Result<JsonValue, ExchangeError>;
}

#[derive(Debug, Clone)]
pub struct HttpRefineClient {
    http: HttpClient,
    endpoint: String,
}

impl HttpRefineClient {
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ExchangeError> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RefineClient for HttpRefineClient {
    async fn refine(&self, prompt: &str) -> Result<JsonValue, ExchangeError> {
        let req = RefineRequest { prompt };
        let resp = self.http.post(&self.endpoint).json(&req).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ExchangeError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let body = resp.text().await?;
        let data: JsonValue = serde_json
            ::from_str(&body)
            .map_err(|e| ExchangeError::MalformedJson(e.to_string()))?;
        debug!("API Response: {}", data);
        Ok(data)
    }
}
