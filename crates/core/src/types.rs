use crate::error::EngineError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use deskmate_providers::{ContentBlock, ImageSource};
use std::path::Path;
use tokio::task::JoinHandle;

/// A file the user attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

const IMAGE_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/gif", "image/webp"];

impl Attachment {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| EngineError::Attachment {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        Ok(Self::new(file_name, mime_for_extension(&extension), bytes))
    }

    pub fn is_image(&self) -> bool {
        IMAGE_TYPES.contains(&self.mime_type.as_str())
    }

    /// Images are inlined as base64; anything else as a fenced text block.
    pub fn to_block(&self) -> ContentBlock {
        if self.is_image() {
            return ContentBlock::Image {
                source: ImageSource::base64(self.mime_type.clone(), STANDARD.encode(&self.bytes)),
            };
        }
        ContentBlock::Text {
            text: format!(
                "附件 {}:\n```\n{}\n```",
                self.file_name,
                String::from_utf8_lossy(&self.bytes).trim_end()
            ),
        }
    }
}

pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "md" | "markdown" => "text/markdown",
        "json" => "application/json",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "txt" | "log" | "rs" | "py" | "js" | "ts" | "toml" | "yaml" | "yml" | "sh" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// One user message.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl TurnRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Result of a completed turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// All text streamed during the turn, across iterations.
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Model calls made.
    pub iterations: usize,
    pub reached_iteration_ceiling: bool,
    /// Detached memory update; awaiting it is optional.
    pub memory_update: JoinHandle<()>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_path_infers_image_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.PNG");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let attachment = Attachment::from_path(&path).await.unwrap();
        assert_eq!(attachment.file_name, "shot.PNG");
        assert_eq!(attachment.mime_type, "image/png");
        match attachment.to_block() {
            ContentBlock::Image { source } => {
                assert_eq!(source.media_type, "image/png");
                assert_eq!(source.data, "iVBORw==");
            }
            other => panic!("expected image block, got {other:?}"),
        }
    }

    #[test]
    fn test_text_attachment_is_fenced() {
        let attachment = Attachment::new("todo.md", "text/markdown", b"- a\n- b\n".to_vec());
        match attachment.to_block() {
            ContentBlock::Text { text } => assert_eq!(text, "附件 todo.md:\n```\n- a\n- b\n```"),
            other => panic!("expected text block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_attachment_is_error() {
        let result = Attachment::from_path("/definitely/not/here.txt").await;
        assert!(matches!(result, Err(EngineError::Attachment { .. })));
    }
}
