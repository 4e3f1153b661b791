use crate::error::ToolError;
use crate::registry::ToolRegistry;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Reply spoken back into the conversation when a tool call fails.
pub const FALLBACK_REPLY: &str = "Sorry, I wasn't able to complete that request.";

/// Upper bound on a single tool execution.
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(15);

/// Result of a dispatched tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The tool ran and produced this reply.
    Executed(String),
    /// An identical call already succeeded; its reply is returned unchanged.
    Replayed(String),
    /// The call failed; `reply` is the fallback for the conversation.
    Failed { reply: String, error: String },
}

impl DispatchOutcome {
    /// The string to hand back to the model.
    pub fn reply(&self) -> &str {
        match self {
            Self::Executed(reply) | Self::Replayed(reply) => reply,
            Self::Failed { reply, .. } => reply,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Per-session tool executor.
///
/// Successful results are memoised by [`idempotency_key`], so a model that
/// retries a call does not repeat its side effect. Concurrent duplicates wait
/// for the first execution. Failures are not memoised.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    results: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            results: Mutex::new(HashMap::new()),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Runs `name` with `args`. Never returns an error; see [`DispatchOutcome`].
    pub async fn dispatch(&self, name: &str, args: Value) -> DispatchOutcome {
        match self.try_dispatch(name, args).await {
            Ok((reply, true)) => {
                info!(tool = name, "tool executed");
                DispatchOutcome::Executed(reply)
            }
            Ok((reply, false)) => {
                info!(tool = name, "duplicate tool call, replaying previous result");
                DispatchOutcome::Replayed(reply)
            }
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed, replying with fallback");
                DispatchOutcome::Failed {
                    reply: FALLBACK_REPLY.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    async fn try_dispatch(&self, name: &str, args: Value) -> Result<(String, bool), ToolError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let args = tool.normalize(normalize_arguments(name, args)?)?;
        let key = idempotency_key(name, &args);

        let cell = {
            let mut results = self
                .results
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            results.entry(key).or_default().clone()
        };

        let executed = AtomicBool::new(false);
        let timeout = self.timeout;
        let reply = cell
            .get_or_try_init(|| {
                let executed = &executed;
                async move {
                    executed.store(true, Ordering::SeqCst);
                    tokio::time::timeout(timeout, tool.call(args))
                        .await
                        .map_err(|_| {
                            ToolError::Execution(format!(
                                "{} timed out after {} seconds",
                                name,
                                timeout.as_secs()
                            ))
                        })?
                }
            })
            .await?;

        Ok((reply.clone(), executed.load(Ordering::SeqCst)))
    }
}

/// Accepts arguments either as a JSON object or as a JSON-encoded string.
fn normalize_arguments(tool: &str, args: Value) -> Result<Value, ToolError> {
    match args {
        Value::Object(_) => Ok(args),
        Value::Null => Ok(Value::Object(serde_json::Map::new())),
        Value::String(raw) => {
            let parsed: Value = serde_json::from_str(&raw)
                .map_err(|e| ToolError::invalid_arguments(tool, e.to_string()))?;
            if parsed.is_object() {
                Ok(parsed)
            } else {
                Err(ToolError::invalid_arguments(tool, "expected a JSON object"))
            }
        }
        _ => Err(ToolError::invalid_arguments(tool, "expected a JSON object")),
    }
}

/// Stable key for a tool call: SHA-256 over the name and the arguments with
/// object keys sorted, hex-encoded.
pub fn idempotency_key(name: &str, args: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(args, &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_ignores_object_key_order() {
        let a = json!({ "caller_id": "+1555", "reason": { "x": 1, "y": [1, 2] } });
        let b: Value =
            serde_json::from_str(r#"{"reason":{"y":[1,2],"x":1},"caller_id":"+1555"}"#).unwrap();
        assert_eq!(idempotency_key("record_caller", &a), idempotency_key("record_caller", &b));
    }

    #[test]
    fn key_depends_on_name_and_values() {
        let args = json!({ "caller_id": "+1555" });
        assert_ne!(idempotency_key("a", &args), idempotency_key("b", &args));
        assert_ne!(
            idempotency_key("a", &args),
            idempotency_key("a", &json!({ "caller_id": "+1556" }))
        );
        assert_eq!(idempotency_key("a", &args).len(), 64);
    }

    #[test]
    fn string_arguments_are_parsed() {
        let parsed = normalize_arguments("t", Value::String(r#"{"a":1}"#.into())).unwrap();
        assert_eq!(parsed, json!({ "a": 1 }));
        assert_eq!(normalize_arguments("t", Value::Null).unwrap(), json!({}));
        assert!(normalize_arguments("t", json!([1, 2])).is_err());
        assert!(normalize_arguments("t", Value::String("nope".into())).is_err());
    }
}
