//! Tool-augmented streaming conversation engine.

pub mod conversation;
pub mod error;
pub mod prompt;
pub mod relay;
pub mod types;

pub use conversation::{ConversationLoop, LoopSettings, DEFAULT_MAX_ITERATIONS};
pub use error::EngineError;
pub use prompt::{build_system_prompt, Environment, DEFAULT_PERSONA};
pub use relay::{Delta, DeltaRelay};
pub use types::*;
