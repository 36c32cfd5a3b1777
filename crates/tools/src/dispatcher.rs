use crate::registry::ToolRegistry;
use crate::traits::{Tool, ToolError};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, warn};

pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(120);

pub const AUDIT_TARGET: &str = "deskmate::audit";

/// Runs tools by name and turns every outcome into text for the model.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self::with_timeout(registry, DEFAULT_DISPATCH_TIMEOUT)
    }

    pub fn with_timeout(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Invoke `name` with `input`. Never fails: unknown tools, invalid input,
    /// tool errors, panics and timeouts all come back as strings.
    pub async fn invoke(&self, name: &str, input: Value) -> String {
        info!("Dispatching tool: {}", name);
        let started = Instant::now();

        let result = match self.registry.get(name) {
            None => Err(ToolError::Validation(format!("未知工具: {}", name))),
            Some(tool) => match validate_input(&input, &tool.schema()) {
                Err(reason) => Err(ToolError::Validation(reason)),
                Ok(()) => self.execute_isolated(tool, input).await,
            },
        };

        let elapsed = started.elapsed();
        audit(name, elapsed, &result);

        match result {
            Ok(text) => text,
            Err(ToolError::InvalidPath(msg)) => msg,
            Err(ToolError::Validation(msg)) => format!("❌ 参数错误（{}）: {}", name, msg),
            Err(ToolError::Timeout(limit)) => {
                format!("❌ 工具执行超时（{}）: {}", format_limit(limit), name)
            }
            Err(e) => format!("❌ 工具执行失败（{}）: {}", name, e),
        }
    }

    async fn execute_isolated(&self, tool: Arc<dyn Tool>, input: Value) -> Result<String, ToolError> {
        // Spawned so a panicking tool cannot unwind into the caller.
        let mut handle = tokio::spawn(async move { tool.execute(input).await });

        match timeout(self.timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    error!("Tool execution panicked");
                    Err(ToolError::Internal("tool panicked".into()))
                } else {
                    error!("Tool execution cancelled");
                    Err(ToolError::Internal("tool cancelled".into()))
                }
            }
            Err(_) => {
                // A timed-out tool must not keep producing side effects.
                handle.abort();
                warn!("Tool execution timed out after {:?}", self.timeout);
                Err(ToolError::Timeout(self.timeout))
            }
        }
    }
}

fn format_limit(limit: Duration) -> String {
    if limit.subsec_millis() == 0 {
        format!("{}秒", limit.as_secs())
    } else {
        format!("{}毫秒", limit.as_millis())
    }
}

fn audit(tool: &str, elapsed: Duration, result: &Result<String, ToolError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(ToolError::Validation(_)) | Err(ToolError::InvalidPath(_)) => "rejected",
        Err(ToolError::Timeout(_)) => "timeout",
        Err(_) => "error",
    };
    info!(
        target: AUDIT_TARGET,
        tool,
        duration_ms = elapsed.as_millis() as u64,
        outcome,
        "tool invocation"
    );
}

/// Shallow JSON Schema check: object input, required properties present,
/// primitive types of declared properties.
pub fn validate_input(input: &Value, schema: &Value) -> Result<(), String> {
    let Some(object) = input.as_object() else {
        return Err("输入必须是 JSON 对象".into());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if object.get(field).map_or(true, Value::is_null) {
                return Err(format!("缺少必填参数 '{}'", field));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (field, spec) in properties {
            let (Some(value), Some(expected)) =
                (object.get(field), spec.get("type").and_then(Value::as_str))
            else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if !type_matches(value, expected) {
                return Err(format!("参数 '{}' 应为 {} 类型", field, expected));
            }
        }
    }

    Ok(())
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}
