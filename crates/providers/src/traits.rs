use crate::types::{CompletionRequest, ModelTurn, StreamEvent};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

impl TransportError {
    /// Whether a failed request may be re-sent before any byte was streamed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Http(_) => true,
            TransportError::Api { status, .. } => *status == 429 || *status >= 500,
            TransportError::Stream(_) | TransportError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Http(err.to_string())
    }
}

pub type TurnStream = BoxStream<'static, Result<StreamEvent, TransportError>>;

/// One streaming model call per invocation.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn stream(&self, request: CompletionRequest) -> Result<TurnStream, TransportError>;

    fn name(&self) -> &str;
}

/// Drain a turn stream, forwarding every text fragment to `on_text`, and
/// return the finalized turn.
pub async fn collect_turn<F>(
    mut stream: TurnStream,
    mut on_text: F,
) -> Result<ModelTurn, TransportError>
where
    F: FnMut(&str),
{
    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::TextDelta(fragment) => on_text(&fragment),
            StreamEvent::ToolCall(_) => {}
            StreamEvent::Completed(turn) => return Ok(turn),
        }
    }
    Err(TransportError::Stream(
        "stream closed before response completed".to_string(),
    ))
}
