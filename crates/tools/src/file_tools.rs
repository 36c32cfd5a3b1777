use crate::output::truncate_utf8;
use crate::path_guard::PathGuard;
use crate::traits::{parse_input, Tool, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::fs;
use tokio::io::AsyncReadExt;

pub const MAX_READ_BYTES: usize = 256 * 1024;

#[derive(Deserialize)]
struct PathInput {
    path: String,
}

#[derive(Deserialize)]
struct WriteFileInput {
    path: String,
    content: String,
}

fn path_schema(description: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "path": {
                "type": "string",
                "description": description
            }
        },
        "required": ["path"]
    })
}

pub struct WriteFileTool {
    guard: PathGuard,
}

impl WriteFileTool {
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "写入文本文件（覆盖已有内容，自动创建上级目录）。路径必须是绝对路径或以 ~/ 开头"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "文件路径，如 ~/Desktop/notes.txt"
                },
                "content": {
                    "type": "string",
                    "description": "要写入的内容"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let input: WriteFileInput = parse_input(input)?;
        let path = self.guard.resolve(&input.path)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &input.content).await?;

        Ok(format!(
            "✅ 文件已写入: {}（{} 字节）",
            path.display(),
            input.content.len()
        ))
    }
}

pub struct ReadFileTool {
    guard: PathGuard,
}

impl ReadFileTool {
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "读取文本文件内容（超过 256 KiB 的部分会被截断）。路径必须是绝对路径或以 ~/ 开头"
    }

    fn schema(&self) -> serde_json::Value {
        path_schema("文件路径，如 ~/Documents/report.md")
    }

    async fn execute(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let input: PathInput = parse_input(input)?;
        let path = self.guard.resolve(&input.path)?;

        let unreadable =
            |e: std::io::Error| ToolError::Execution(format!("无法读取 {}: {}", path.display(), e));

        let file = fs::File::open(&path).await.map_err(unreadable)?;
        // Device files such as /dev/zero report a zero length.
        let size = file.metadata().await.ok().map(|m| m.len()).filter(|&len| len > 0);

        let mut bytes = Vec::new();
        file.take(MAX_READ_BYTES as u64 + 1)
            .read_to_end(&mut bytes)
            .await
            .map_err(unreadable)?;
        let over_limit = bytes.len() > MAX_READ_BYTES;
        bytes.truncate(MAX_READ_BYTES);

        let text = String::from_utf8_lossy(&bytes);
        let (kept, cut) = truncate_utf8(&text, MAX_READ_BYTES);

        if over_limit || cut {
            let total = match size {
                Some(len) => format!("共 {} 字节", len),
                None => format!("超过 {} 字节", MAX_READ_BYTES),
            };
            Ok(format!(
                "{}\n\n…（文件过大，仅显示前 {} 字节，{}）",
                kept,
                kept.len(),
                total
            ))
        } else {
            Ok(kept.to_string())
        }
    }
}

pub struct ListDirectoryTool {
    guard: PathGuard,
}

impl ListDirectoryTool {
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "列出目录中的文件和子目录。路径必须是绝对路径或以 ~/ 开头"
    }

    fn schema(&self) -> serde_json::Value {
        path_schema("目录路径，如 ~/Desktop")
    }

    async fn execute(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let input: PathInput = parse_input(input)?;
        let path = self.guard.resolve(&input.path)?;

        let mut dir = fs::read_dir(&path).await.map_err(|e| {
            ToolError::Execution(format!("无法打开目录 {}: {}", path.display(), e))
        })?;

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            match entry.metadata().await {
                Ok(meta) if meta.is_dir() => dirs.push(format!("📁 {}/", name)),
                Ok(meta) => files.push(format!("📄 {}（{} 字节）", name, meta.len())),
                Err(_) => files.push(format!("📄 {}", name)),
            }
        }

        if dirs.is_empty() && files.is_empty() {
            return Ok(format!("目录为空: {}", path.display()));
        }

        dirs.sort();
        files.sort();
        let mut out = format!("{} 中共有 {} 项：", path.display(), dirs.len() + files.len());
        for line in dirs.iter().chain(files.iter()) {
            out.push('\n');
            out.push_str(line);
        }
        Ok(out)
    }
}

pub struct CreateDirectoryTool {
    guard: PathGuard,
}

impl CreateDirectoryTool {
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for CreateDirectoryTool {
    fn name(&self) -> &str {
        "create_directory"
    }

    fn description(&self) -> &str {
        "创建目录（包括不存在的上级目录）。路径必须是绝对路径或以 ~/ 开头"
    }

    fn schema(&self) -> serde_json::Value {
        path_schema("目录路径，如 ~/Projects/demo")
    }

    async fn execute(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let input: PathInput = parse_input(input)?;
        let path = self.guard.resolve(&input.path)?;

        fs::create_dir_all(&path).await?;
        Ok(format!("✅ 目录已创建: {}", path.display()))
    }
}
