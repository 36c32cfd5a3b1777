//! Two-tier memory store with a read cache.
//!
//! Reads try the cache, then the remote tier, then the local file, and finally
//! fall back to [`DEFAULT_MEMORY_TEMPLATE`]. Writes go to the local file,
//! refresh the cache, then go to the remote tier. Writes are serialized so a
//! history append never starts from a document an earlier append replaced.

use crate::cache::MemoryCache;
use crate::history::append_exchange;
use crate::local::LocalMemory;
use crate::remote::RemoteMemory;
use crate::types::{MemoryError, MemoryRecord, DEFAULT_MEMORY_TEMPLATE};
use chrono::NaiveDateTime;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct MemoryStore {
    scope_key: String,
    local: LocalMemory,
    remote: Option<Arc<dyn RemoteMemory>>,
    cache: MemoryCache,
    write_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new(
        scope_key: impl Into<String>,
        local: LocalMemory,
        remote: Option<Arc<dyn RemoteMemory>>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            scope_key: scope_key.into(),
            local,
            remote,
            cache: MemoryCache::new(cache_ttl),
            write_lock: Mutex::new(()),
        }
    }

    pub fn scope_key(&self) -> &str {
        &self.scope_key
    }

    pub fn cache(&self) -> &MemoryCache {
        &self.cache
    }

    /// Current memory document. Never fails: absence yields the default
    /// template.
    pub async fn get(&self) -> String {
        if let Some(content) = self.cache.fresh() {
            debug!("Memory cache hit for {}", self.scope_key);
            return content;
        }

        let generation = self.cache.generation();

        if let Some(remote) = &self.remote {
            match remote.fetch(&self.scope_key).await {
                Ok(Some(content)) => {
                    self.cache.fill(generation, &content);
                    return content;
                }
                Ok(None) => debug!("No remote memory for {}", self.scope_key),
                Err(e) => warn!("Remote memory read failed for {}: {}", self.scope_key, e),
            }
        }

        match self.local.read(&self.scope_key).await {
            Ok(Some(content)) => {
                self.cache.fill(generation, &content);
                return content;
            }
            Ok(None) => debug!("No local memory for {}", self.scope_key),
            Err(e) => warn!("Local memory read failed for {}: {}", self.scope_key, e),
        }

        DEFAULT_MEMORY_TEMPLATE.to_string()
    }

    /// Replace the memory document. Succeeds if either tier accepted it; the
    /// cache is refreshed regardless.
    pub async fn put(&self, content: &str) -> Result<(), MemoryError> {
        let _guard = self.write_lock.lock().await;
        self.write_locked(content).await
    }

    async fn write_locked(&self, content: &str) -> Result<(), MemoryError> {
        let local_result = self.local.write(&self.scope_key, content).await;
        if let Err(e) = &local_result {
            warn!("Local memory write failed for {}: {}", self.scope_key, e);
        }

        // Readers see the new document while the remote upsert is in flight.
        self.cache.refresh(content);

        let remote_result = match &self.remote {
            Some(remote) => {
                let record = MemoryRecord::new(self.scope_key.clone(), content);
                let result = remote.upsert(&record).await;
                if let Err(e) = &result {
                    warn!("Remote memory write failed for {}: {}", self.scope_key, e);
                }
                Some(result)
            }
            None => None,
        };

        match (local_result, remote_result) {
            (Ok(()), _) | (Err(_), Some(Ok(()))) => Ok(()),
            (Err(local), Some(Err(remote))) => Err(MemoryError::WriteFailed(format!(
                "local: {}; remote: {}",
                local, remote
            ))),
            (Err(local), None) => Err(MemoryError::WriteFailed(local.to_string())),
        }
    }

    /// Append a dated history entry for one exchange.
    pub async fn record_exchange(
        &self,
        user_text: &str,
        assistant_text: &str,
        at: NaiveDateTime,
    ) -> Result<(), MemoryError> {
        let _guard = self.write_lock.lock().await;
        let current = self.get().await;
        let updated = append_exchange(&current, user_text, assistant_text, at);
        self.write_locked(&updated).await
    }
}
