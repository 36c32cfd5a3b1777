pub mod cache;
pub mod history;
pub mod local;
pub mod profile;
pub mod remote;
pub mod store;
pub mod types;

pub use cache::MemoryCache;
pub use history::{MemoryDocument, HISTORY_HEADING, MAX_HISTORY_SECTIONS};
pub use local::LocalMemory;
pub use profile::UserProfileStore;
pub use remote::{RemoteMemory, SupabaseConfig, SupabaseMemory};
pub use store::MemoryStore;
pub use types::*;
