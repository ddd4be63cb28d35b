pub mod apisports;

pub use apisports::ApiSports;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// One named category of records to fetch: endpoint path plus query params.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub name: String,
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl Dataset {
    pub fn new(name: &str, path: &str, params: &[(&str, &str)]) -> Self {
        Dataset {
            name: name.to_string(),
            path: path.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Trait that every upstream stats provider must implement.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Fetch the records for one dataset. An empty vec is a valid result;
    /// errors are for transport or non-2xx responses.
    async fn fetch(&self, dataset: &Dataset) -> Result<Vec<Value>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
