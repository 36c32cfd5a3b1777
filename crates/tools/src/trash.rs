//! Platform trash: `delete_file` moves into it, `empty_trash` purges it.

use crate::path_guard::PathGuard;
use crate::traits::{parse_input, Tool, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

#[async_trait]
pub trait TrashBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Move `path` into the trash.
    async fn trash(&self, path: &Path) -> Result<(), ToolError>;

    /// Permanently delete everything in the trash.
    async fn empty(&self) -> Result<(), ToolError>;
}

pub struct SystemTrash;

impl SystemTrash {
    /// Backend for the platform this binary runs on.
    pub fn detect() -> Arc<dyn TrashBackend> {
        if cfg!(target_os = "macos") {
            Arc::new(MacTrash::for_user())
        } else if cfg!(target_os = "windows") {
            Arc::new(WindowsTrash)
        } else {
            Arc::new(XdgTrash::for_user())
        }
    }
}

async fn ensure_exists(path: &Path) -> Result<(), ToolError> {
    match fs::symlink_metadata(path).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ToolError::Execution(
            format!("文件不存在: {}", path.display()),
        )),
        Err(e) => Err(e.into()),
    }
}

fn file_name_of(path: &Path) -> Result<String, ToolError> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ToolError::Validation(format!("无法删除 {}", path.display())))
}

/// `name`, `name.2`, `name.3`, ...
fn candidate_name(name: &str, attempt: u32) -> String {
    if attempt <= 1 {
        name.to_string()
    } else {
        format!("{}.{}", name, attempt)
    }
}

async fn remove_children(dir: &Path) -> Result<usize, ToolError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
        removed += 1;
    }
    Ok(removed)
}

/// freedesktop.org trash: payloads in `files/`, metadata in `info/`.
pub struct XdgTrash {
    root: PathBuf,
}

impl XdgTrash {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$XDG_DATA_HOME/Trash`, usually `~/.local/share/Trash`.
    pub fn for_user() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local/share")))
            .unwrap_or_else(std::env::temp_dir);
        Self::new(data_dir.join("Trash"))
    }

    fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    fn info_dir(&self) -> PathBuf {
        self.root.join("info")
    }

    fn trash_info(original: &Path) -> String {
        let encoded = original
            .to_string_lossy()
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "[Trash Info]\nPath={}\nDeletionDate={}\n",
            encoded,
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S")
        )
    }
}

#[async_trait]
impl TrashBackend for XdgTrash {
    fn name(&self) -> &str {
        "freedesktop"
    }

    async fn trash(&self, path: &Path) -> Result<(), ToolError> {
        ensure_exists(path).await?;
        let name = file_name_of(path)?;
        fs::create_dir_all(self.files_dir()).await?;
        fs::create_dir_all(self.info_dir()).await?;

        // The .trashinfo file is created exclusively to claim the name.
        let mut attempt = 1;
        let (slot, info_path, mut info_file) = loop {
            let slot = candidate_name(&name, attempt);
            let info_path = self.info_dir().join(format!("{}.trashinfo", slot));
            if !fs::try_exists(self.files_dir().join(&slot)).await.unwrap_or(false) {
                match fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&info_path)
                    .await
                {
                    Ok(file) => break (slot, info_path, file),
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                    Err(e) => return Err(e.into()),
                }
            }
            attempt += 1;
        };

        info_file
            .write_all(Self::trash_info(path).as_bytes())
            .await?;
        info_file.flush().await?;
        drop(info_file);

        if let Err(e) = fs::rename(path, self.files_dir().join(&slot)).await {
            let _ = fs::remove_file(&info_path).await;
            return Err(ToolError::Execution(format!(
                "无法移动到回收站 {}: {}",
                path.display(),
                e
            )));
        }

        debug!("Trashed {} as {}", path.display(), slot);
        Ok(())
    }

    async fn empty(&self) -> Result<(), ToolError> {
        let files = remove_children(&self.files_dir()).await?;
        remove_children(&self.info_dir()).await?;
        debug!("Emptied freedesktop trash ({} items)", files);
        Ok(())
    }
}

/// `~/.Trash`. Emptying goes through Finder, falling back to direct removal.
pub struct MacTrash {
    root: PathBuf,
}

impl MacTrash {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn for_user() -> Self {
        let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
        Self::new(home.join(".Trash"))
    }
}

#[async_trait]
impl TrashBackend for MacTrash {
    fn name(&self) -> &str {
        "macos"
    }

    async fn trash(&self, path: &Path) -> Result<(), ToolError> {
        ensure_exists(path).await?;
        let name = file_name_of(path)?;
        fs::create_dir_all(&self.root).await?;

        let mut attempt = 1;
        let target = loop {
            let target = self.root.join(candidate_name(&name, attempt));
            if !fs::try_exists(&target).await.unwrap_or(false) {
                break target;
            }
            attempt += 1;
        };

        fs::rename(path, &target).await.map_err(|e| {
            ToolError::Execution(format!("无法移动到回收站 {}: {}", path.display(), e))
        })
    }

    async fn empty(&self) -> Result<(), ToolError> {
        let output = Command::new("osascript")
            .args(["-e", "tell application \"Finder\" to empty trash"])
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => {
                warn!(
                    "Finder empty trash failed, removing directly: {}",
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                remove_children(&self.root).await.map(|_| ())
            }
            Err(e) => {
                warn!("osascript unavailable, removing directly: {}", e);
                remove_children(&self.root).await.map(|_| ())
            }
        }
    }
}

/// Recycle Bin through PowerShell.
pub struct WindowsTrash;

impl WindowsTrash {
    fn quote(path: &Path) -> String {
        format!("'{}'", path.to_string_lossy().replace('\'', "''"))
    }

    async fn run(script: &str) -> Result<(), ToolError> {
        let output = Command::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command", script])
            .output()
            .await
            .map_err(|e| ToolError::Execution(format!("无法启动 PowerShell: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ToolError::Execution(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

#[async_trait]
impl TrashBackend for WindowsTrash {
    fn name(&self) -> &str {
        "windows"
    }

    async fn trash(&self, path: &Path) -> Result<(), ToolError> {
        ensure_exists(path).await?;
        let method = if fs::metadata(path).await?.is_dir() {
            "DeleteDirectory"
        } else {
            "DeleteFile"
        };
        let script = format!(
            "Add-Type -AssemblyName Microsoft.VisualBasic; \
             [Microsoft.VisualBasic.FileIO.FileSystem]::{}({}, 'OnlyErrorDialogs', 'SendToRecycleBin')",
            method,
            Self::quote(path)
        );
        Self::run(&script).await
    }

    async fn empty(&self) -> Result<(), ToolError> {
        Self::run("Clear-RecycleBin -Force -ErrorAction Stop").await
    }
}

#[derive(Deserialize)]
struct DeleteFileInput {
    path: String,
}

pub struct DeleteFileTool {
    guard: PathGuard,
    backend: Arc<dyn TrashBackend>,
}

impl DeleteFileTool {
    pub fn new(guard: PathGuard, backend: Arc<dyn TrashBackend>) -> Self {
        Self { guard, backend }
    }
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "删除文件或目录：移动到系统回收站，可从回收站恢复。路径必须是绝对路径或以 ~/ 开头"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "要删除的文件或目录路径"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let input: DeleteFileInput = parse_input(input)?;
        let path = self.guard.resolve(&input.path)?;
        self.backend.trash(&path).await?;
        Ok(format!("✅ 已移至回收站: {}", path.display()))
    }
}

pub struct EmptyTrashTool {
    backend: Arc<dyn TrashBackend>,
}

impl EmptyTrashTool {
    pub fn new(backend: Arc<dyn TrashBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for EmptyTrashTool {
    fn name(&self) -> &str {
        "empty_trash"
    }

    fn description(&self) -> &str {
        "清空系统回收站。此操作不可逆，回收站中的所有文件将被永久删除，无法恢复"
    }

    fn schema(&self) -> serde_json::Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: serde_json::Value) -> Result<String, ToolError> {
        self.backend.empty().await?;
        Ok("✅ 回收站已清空".to_string())
    }
}
