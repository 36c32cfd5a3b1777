use async_trait::async_trait;
use deskmate_memory::MemoryError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Validation error: {0}")]
    Validation(String),
    /// Rejected path; the message is shown to the model as-is.
    #[error("{0}")]
    InvalidPath(String),
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::Execution(err.to_string())
    }
}

impl From<MemoryError> for ToolError {
    fn from(err: MemoryError) -> Self {
        ToolError::Execution(err.to_string())
    }
}

/// A capability the model can invoke by name.
///
/// `schema` is the JSON Schema of the input object; the dispatcher checks
/// inputs against it before `execute` runs. Results are plain text for the
/// model.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> serde_json::Value;

    async fn execute(&self, input: serde_json::Value) -> Result<String, ToolError>;
}

/// Deserialize tool input into its typed form.
pub(crate) fn parse_input<T: serde::de::DeserializeOwned>(
    input: serde_json::Value,
) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::Validation(e.to_string()))
}
