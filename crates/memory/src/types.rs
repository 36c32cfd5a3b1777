use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Cache lifetime for the memory document.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Returned when no tier holds a memory document yet.
pub const DEFAULT_MEMORY_TEMPLATE: &str = "# AI 记忆

## 用户偏好
- （暂无记录）

## 重要信息
- （暂无记录）

## 历史记录
";

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Remote store error: {0}")]
    Remote(String),
    #[error("No memory tier accepted the write: {0}")]
    WriteFailed(String),
}

impl From<reqwest::Error> for MemoryError {
    fn from(err: reqwest::Error) -> Self {
        MemoryError::Remote(err.to_string())
    }
}

/// One memory document per device or user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    pub scope_key: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(scope_key: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            scope_key: scope_key.into(),
            content: content.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Treats blank documents the same as missing ones.
pub(crate) fn non_blank(content: Option<String>) -> Option<String> {
    content.filter(|c| !c.trim().is_empty())
}
