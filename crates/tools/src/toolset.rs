use crate::browser::{BrowserOpenTool, BrowserSession};
use crate::file_tools::{CreateDirectoryTool, ListDirectoryTool, ReadFileTool, WriteFileTool};
use crate::memory_tools::{GetAiMemoryTool, GetUserInfoTool, SaveAiMemoryTool, SaveUserInfoTool};
use crate::path_guard::PathGuard;
use crate::process_tools::{ExecuteCommandTool, DEFAULT_COMMAND_TIMEOUT, DEFAULT_MAX_OUTPUT_BYTES};
use crate::registry::ToolRegistry;
use crate::trash::{DeleteFileTool, EmptyTrashTool, TrashBackend};
use deskmate_memory::{MemoryStore, UserProfileStore};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub command_timeout: Duration,
    pub max_output_bytes: usize,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Everything the standard desktop tool set needs.
pub struct DesktopTools {
    pub settings: ToolSettings,
    pub guard: PathGuard,
    pub memory: Arc<MemoryStore>,
    pub profile: Arc<UserProfileStore>,
    pub trash: Arc<dyn TrashBackend>,
    pub browser: Option<Arc<dyn BrowserSession>>,
}

impl DesktopTools {
    pub fn into_registry(self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        let guard = self.guard;

        registry.register(Arc::new(WriteFileTool::new(guard.clone())));
        registry.register(Arc::new(ReadFileTool::new(guard.clone())));
        registry.register(Arc::new(ListDirectoryTool::new(guard.clone())));
        registry.register(Arc::new(CreateDirectoryTool::new(guard.clone())));
        registry.register(Arc::new(DeleteFileTool::new(guard.clone(), self.trash.clone())));
        registry.register(Arc::new(EmptyTrashTool::new(self.trash)));
        registry.register(Arc::new(ExecuteCommandTool::new(
            guard,
            self.settings.command_timeout,
            self.settings.max_output_bytes,
        )));
        registry.register(Arc::new(SaveUserInfoTool::new(self.profile.clone())));
        registry.register(Arc::new(GetUserInfoTool::new(self.profile)));
        registry.register(Arc::new(SaveAiMemoryTool::new(self.memory.clone())));
        registry.register(Arc::new(GetAiMemoryTool::new(self.memory)));

        if let Some(session) = self.browser {
            registry.register(Arc::new(BrowserOpenTool::new(session)));
        }

        registry
    }
}
