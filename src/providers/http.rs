//! Shared HTTP plumbing for provider backends: one `reqwest::Client` per backend,
//! uniform status and transport error mapping.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Instant;
use tracing::debug;

use super::errors::{ProviderError, ProviderResult};
use crate::config::{ConfigResult, ConfigurationError, ProviderConfig};
use crate::logging::log_provider_call;

#[derive(Debug, Clone)]
pub struct HttpBackend {
    name: String,
    capability: &'static str,
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpBackend {
    pub fn new(capability: &'static str, config: &ProviderConfig) -> ConfigResult<Self> {
        let base_url = config.effective_base_url().ok_or_else(|| {
            ConfigurationError::missing_required_field(
                format!("providers.{capability}.base_url"),
                "provider configuration",
            )
        })?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                ConfigurationError::invalid_value(
                    format!("providers.{capability}"),
                    &config.backend,
                    format!("failed to build HTTP client: {e}"),
                )
            })?;

        Ok(Self {
            name: config.backend.clone(),
            capability,
            base_url,
            api_key: config.resolved_api_key(),
            client,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST a JSON body; non-2xx statuses become errors carrying the body text
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        extra_headers: &[(&str, &str)],
    ) -> ProviderResult<Response> {
        let url = self.url(path);
        let started = Instant::now();

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        for (name, value) in extra_headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| {
            let err = ProviderError::from_reqwest(&self.name, &e);
            log_provider_call(
                self.capability,
                &self.name,
                "transport_error",
                Some(started.elapsed().as_millis() as u64),
                Some(&err.to_string()),
            );
            err
        })?;

        let status = response.status();
        let elapsed = Some(started.elapsed().as_millis() as u64);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log_provider_call(self.capability, &self.name, "http_error", elapsed, Some(&body));
            return Err(ProviderError::from_status(&self.name, status.as_u16(), body));
        }

        log_provider_call(self.capability, &self.name, "ok", elapsed, None);
        debug!(url = %url, status = status.as_u16(), "Provider responded");
        Ok(response)
    }

    /// Decode a JSON body into `T`
    pub async fn read_json<T: DeserializeOwned>(&self, response: Response) -> ProviderResult<T> {
        let bytes = self.read_bytes(response).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::malformed(&self.name, format!("invalid JSON body: {e}")))
    }

    pub async fn read_bytes(&self, response: Response) -> ProviderResult<Vec<u8>> {
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ProviderError::from_reqwest(&self.name, &e))
    }
}

/// Whether a response carries a JSON body
pub fn is_json(response: &Response) -> bool {
    content_type(response).is_some_and(|ct| ct.contains("json"))
}

pub fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase())
}
