use crate::types::{non_blank, MemoryError, MemoryRecord};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Authoritative remote tier.
#[async_trait]
pub trait RemoteMemory: Send + Sync {
    /// `Ok(None)` when no record exists for the scope.
    async fn fetch(&self, scope_key: &str) -> Result<Option<String>, MemoryError>;

    async fn upsert(&self, record: &MemoryRecord) -> Result<(), MemoryError>;
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub api_key: String,
    pub table: String,
    pub timeout: Duration,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            table: "ai_memory".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MemoryRow {
    #[serde(default)]
    content: Option<String>,
}

/// PostgREST table keyed by `scope_key`.
pub struct SupabaseMemory {
    config: SupabaseConfig,
    client: reqwest::Client,
}

impl SupabaseMemory {
    pub fn new(config: SupabaseConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.url.trim_end_matches('/'),
            self.config.table
        )
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, MemoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(MemoryError::Remote(format!("HTTP {}: {}", status, body)))
}

#[async_trait]
impl RemoteMemory for SupabaseMemory {
    async fn fetch(&self, scope_key: &str) -> Result<Option<String>, MemoryError> {
        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&[
                ("select", "content,updated_at".to_string()),
                ("scope_key", format!("eq.{}", scope_key)),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<MemoryRow> = ensure_success(response).await?.json().await?;
        Ok(non_blank(rows.into_iter().next().and_then(|row| row.content)))
    }

    async fn upsert(&self, record: &MemoryRecord) -> Result<(), MemoryError> {
        let response = self
            .authorized(self.client.post(self.table_url()))
            .query(&[("on_conflict", "scope_key")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[record])
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }
}
