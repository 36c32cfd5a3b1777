use deskmate_providers::TransportError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The model call failed; the turn is aborted.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Cannot read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
