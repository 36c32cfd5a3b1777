use crate::local::temp_sibling;
use crate::types::MemoryError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Key-value facts about the user, persisted as JSON.
pub struct UserProfileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl UserProfileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn load(&self) -> Result<BTreeMap<String, String>, MemoryError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, MemoryError> {
        Ok(self.load().await?.remove(key))
    }

    pub async fn save(&self, key: &str, value: &str) -> Result<(), MemoryError> {
        let _guard = self.write_lock.lock().await;
        let mut profile = self.load().await?;
        profile.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = temp_sibling(&self.path);
        fs::write(&temp_path, serde_json::to_string_pretty(&profile)?).await?;
        fs::rename(&temp_path, &self.path).await?;

        tracing::debug!("Saved user profile key: {}", key);
        Ok(())
    }
}
