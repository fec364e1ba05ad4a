//! HTTP clients for the infrastructure-description and secret-store services.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use shipit_core::{ConfigError, ConfigResult, ErrorCategory, StackRef};

use crate::sources::{SecretFetcher, StackDescriber};

/// Client for the infrastructure-description service's JSON surface.
pub struct HttpStackDescriber {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpStackDescriber {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl StackDescriber for HttpStackDescriber {
    async fn describe(&self, stack: &StackRef) -> ConfigResult<HashMap<String, String>> {
        let url = format!(
            "{}/v1/stacks/{}/{}/{}/outputs",
            self.base_url.as_str().trim_end_matches('/'),
            stack.region,
            stack.account,
            stack.name
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            ConfigError::new(
                ErrorCategory::ExternalServiceUnavailable,
                format!("infrastructure description request failed: {e}"),
            )
            .with_detail(url.clone())
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConfigError::new(
                ErrorCategory::ExternalServiceUnavailable,
                format!(
                    "infrastructure description service returned {status} for stack '{}'",
                    stack.name
                ),
            )
            .with_detail(body));
        }

        response.json::<HashMap<String, String>>().await.map_err(|e| {
            ConfigError::new(
                ErrorCategory::ExternalServiceUnavailable,
                format!("infrastructure description response was not a string output map: {e}"),
            )
        })
    }
}

/// Client for the secret store's JSON surface.
pub struct HttpSecretFetcher {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpSecretFetcher {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl SecretFetcher for HttpSecretFetcher {
    async fn fetch(&self, secret_ref: &str) -> ConfigResult<Value> {
        let url = format!(
            "{}/v1/secrets/{secret_ref}",
            self.base_url.as_str().trim_end_matches('/')
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            ConfigError::new(
                ErrorCategory::ExternalServiceUnavailable,
                format!("secret store request failed: {e}"),
            )
            .with_detail(url.clone())
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConfigError::new(
                ErrorCategory::ExternalServiceUnavailable,
                format!("secret store returned {status} for secret '{secret_ref}'"),
            )
            .with_detail(body));
        }

        response.json::<Value>().await.map_err(|e| {
            ConfigError::new(
                ErrorCategory::MalformedSecretPayload,
                format!("secret '{secret_ref}' is not valid JSON: {e}"),
            )
        })
    }
}
