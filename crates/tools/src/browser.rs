use crate::traits::{parse_input, Tool, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct BrowserError(pub String);

/// A controllable browser, e.g. a CDP connection.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn open(&self, url: &str) -> Result<PageInfo, BrowserError>;

    /// Re-establish the connection after a failure.
    async fn reconnect(&self) -> Result<(), BrowserError>;
}

#[derive(Deserialize)]
struct BrowserOpenInput {
    url: String,
}

pub struct BrowserOpenTool {
    session: Arc<dyn BrowserSession>,
}

impl BrowserOpenTool {
    pub fn new(session: Arc<dyn BrowserSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for BrowserOpenTool {
    fn name(&self) -> &str {
        "browser_open"
    }

    fn description(&self) -> &str {
        "在浏览器中打开网页并返回页面标题"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "http 或 https 网址" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let input: BrowserOpenInput = parse_input(input)?;
        let url = input.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::Validation(format!(
                "网址必须以 http:// 或 https:// 开头: {}",
                url
            )));
        }

        let page = match self.session.open(url).await {
            Ok(page) => page,
            Err(first) => {
                warn!("Browser open failed, reconnecting: {}", first);
                self.session
                    .reconnect()
                    .await
                    .map_err(|e| ToolError::Execution(format!("浏览器重连失败: {}", e)))?;
                self.session
                    .open(url)
                    .await
                    .map_err(|e| ToolError::Execution(format!("打开网页失败: {}", e)))?
            }
        };

        Ok(format!("✅ 已打开网页: {}\n{}", page.title, page.url))
    }
}
