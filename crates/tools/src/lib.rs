pub mod browser;
pub mod dispatcher;
pub mod file_tools;
pub mod memory_tools;
mod output;
pub mod path_guard;
pub mod process_tools;
pub mod registry;
pub mod toolset;
pub mod trash;
pub mod traits;

pub use browser::{BrowserError, BrowserSession, PageInfo};
pub use dispatcher::{ToolDispatcher, AUDIT_TARGET, DEFAULT_DISPATCH_TIMEOUT};
pub use path_guard::PathGuard;
pub use registry::ToolRegistry;
pub use toolset::{DesktopTools, ToolSettings};
pub use trash::{SystemTrash, TrashBackend};
pub use traits::{Tool, ToolError};
