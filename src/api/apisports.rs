use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::{DataProvider, Dataset};

/// Stats provider backed by the API-Sports basketball API.
/// Docs: <https://api-sports.io/documentation/basketball/v1>
pub struct ApiSports {
    http: Client,
    api_key: String,
    /// Base URL for overriding in tests
    base_url: String,
}

impl ApiSports {
    pub fn new(api_key: Option<&str>, base_url: Option<&str>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiSports {
            http,
            api_key: api_key.unwrap_or_default().to_string(),
            base_url: base_url
                .unwrap_or("https://v1.basketball.api-sports.io/")
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn from_config(config: &crate::config::Config) -> Result<Self> {
        Self::new(config.api_key.as_deref(), Some(&config.api_base_url))
    }
}

#[async_trait]
impl DataProvider for ApiSports {
    fn name(&self) -> &str {
        "API-Sports"
    }

    async fn fetch(&self, dataset: &Dataset) -> Result<Vec<Value>> {
        let url = format!("{}/{}", self.base_url, dataset.path);
        debug!("Fetching '{}' from {}", dataset.name, url);

        let resp = self
            .http
            .get(&url)
            .header("x-apisports-key", &self.api_key)
            .query(&dataset.params)
            .send()
            .await
            .context("API-Sports request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("API-Sports error: {}", resp.status());
        }

        let raw: Value = resp
            .json()
            .await
            .context("Failed to parse API-Sports response")?;

        // API-Sports reports quota/parameter problems in-band with a 200
        if let Some(errors) = raw.get("errors") {
            let has_errors = match errors {
                Value::Array(a) => !a.is_empty(),
                Value::Object(o) => !o.is_empty(),
                _ => false,
            };
            if has_errors {
                warn!("API-Sports reported errors for '{}': {}", dataset.name, errors);
            }
        }

        Ok(extract_records(&raw))
    }
}

/// Pull the record array out of a provider response body. API-Sports uses a
/// top-level `response` array; some providers use `data` instead. Anything
/// else counts as an empty result.
pub fn extract_records(raw: &Value) -> Vec<Value> {
    for key in ["response", "data"] {
        if let Some(arr) = raw.get(key).and_then(Value::as_array) {
            return arr.clone();
        }
    }
    Vec::new()
}
