//! Path checks for filesystem tools.
//!
//! Model-supplied paths must be absolute or start with `~/`. Relative paths
//! are rejected with a message telling the model how to fix the call. This is
//! not a sandbox.

use crate::traits::ToolError;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PathGuard {
    home: Option<PathBuf>,
}

impl PathGuard {
    /// Guard that expands `~` to the current user's home directory.
    pub fn new() -> Self {
        Self {
            home: dirs::home_dir(),
        }
    }

    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
        }
    }

    pub fn resolve(&self, raw: &str) -> Result<PathBuf, ToolError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ToolError::InvalidPath(
                "❌ 路径为空，请提供绝对路径（如 /home/user/a.txt）或以 ~/ 开头的路径".into(),
            ));
        }

        if trimmed == "~" || trimmed.starts_with("~/") {
            let home = self.home.as_ref().ok_or_else(|| {
                ToolError::InvalidPath("❌ 无法确定用户主目录，请改用绝对路径".into())
            })?;
            let rest = trimmed.trim_start_matches('~').trim_start_matches('/');
            return Ok(if rest.is_empty() {
                home.clone()
            } else {
                home.join(rest)
            });
        }

        let path = Path::new(trimmed);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }

        Err(ToolError::InvalidPath(format!(
            "❌ 路径必须是绝对路径或以 ~/ 开头，收到的是相对路径 \"{}\"。请改用完整路径后重试",
            trimmed
        )))
    }
}

impl Default for PathGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_paths_pass_through() {
        let guard = PathGuard::with_home("/home/alice");
        let abs = std::env::temp_dir().join("notes.txt");
        assert_eq!(guard.resolve(abs.to_str().unwrap()).unwrap(), abs);
    }

    #[test]
    fn test_tilde_expands_to_home() {
        let guard = PathGuard::with_home("/home/alice");
        assert_eq!(
            guard.resolve("~/Desktop/a.txt").unwrap(),
            PathBuf::from("/home/alice/Desktop/a.txt")
        );
        assert_eq!(guard.resolve("~").unwrap(), PathBuf::from("/home/alice"));
    }

    #[test]
    fn test_relative_paths_get_corrective_message() {
        let guard = PathGuard::with_home("/home/alice");
        for raw in ["notes.txt", "./a", "../etc/passwd", "~alice/x", "   "] {
            match guard.resolve(raw) {
                Err(ToolError::InvalidPath(msg)) => assert!(msg.contains("~/"), "{raw}: {msg}"),
                other => panic!("{raw}: expected InvalidPath, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_home_is_reported() {
        let guard = PathGuard { home: None };
        assert!(matches!(guard.resolve("~/x"), Err(ToolError::InvalidPath(_))));
    }
}
