use crate::types::{non_blank, MemoryError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique sibling path for an atomic temp-then-rename write.
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), n))
}

/// Local-file tier: one markdown file per scope key.
#[derive(Debug, Clone)]
pub struct LocalMemory {
    base_path: PathBuf,
}

impl LocalMemory {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub async fn initialize(&self) -> Result<(), MemoryError> {
        fs::create_dir_all(&self.base_path).await?;
        tracing::info!("Local memory initialized at {:?}", self.base_path);
        Ok(())
    }

    pub async fn read(&self, scope_key: &str) -> Result<Option<String>, MemoryError> {
        let path = self.document_path(scope_key);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(non_blank(Some(content))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write(&self, scope_key: &str, content: &str) -> Result<(), MemoryError> {
        fs::create_dir_all(&self.base_path).await?;
        let path = self.document_path(scope_key);

        let temp_path = temp_sibling(&path);
        if let Err(e) = fs::write(&temp_path, content).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        fs::rename(&temp_path, &path).await?;

        tracing::debug!("Saved local memory for scope: {}", scope_key);
        Ok(())
    }

    pub fn document_path(&self, scope_key: &str) -> PathBuf {
        let file_stem: String = scope_key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{}.md", file_stem))
    }
}
