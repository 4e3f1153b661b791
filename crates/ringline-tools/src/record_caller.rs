use crate::error::ToolError;
use crate::notify::{Notification, NotificationSink};
use crate::registry::{Tool, ToolDefinition};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const TOOL_NAME: &str = "record_caller";

/// Longest caller identifier accepted from the model.
const MAX_CALLER_ID_LEN: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordCallerArgs {
    caller_id: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Notes the caller's number so a human can follow up.
pub struct RecordCallerTool {
    sink: Arc<dyn NotificationSink>,
}

impl RecordCallerTool {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Tool for RecordCallerTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            TOOL_NAME,
            "Record the caller's phone number so a team member can follow up. \
             Use when the caller asks to be called back or leaves a message.",
            json!({
                "type": "object",
                "required": ["caller_id"],
                "properties": {
                    "caller_id": {
                        "type": "string",
                        "description": "Caller phone number in E.164 format, e.g. +15551234567"
                    },
                    "reason": {
                        "type": "string",
                        "description": "Short reason for the follow-up"
                    }
                }
            }),
        )
    }

    fn normalize(&self, args: Value) -> Result<Value, ToolError> {
        let args: RecordCallerArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::invalid_arguments(TOOL_NAME, e.to_string()))?;

        let caller_id = args.caller_id.trim();
        if caller_id.is_empty() {
            return Err(ToolError::invalid_arguments(
                TOOL_NAME,
                "caller_id must not be empty",
            ));
        }
        if caller_id.len() > MAX_CALLER_ID_LEN {
            return Err(ToolError::invalid_arguments(TOOL_NAME, "caller_id is too long"));
        }

        let mut normalized = json!({ "caller_id": caller_id });
        if let Some(reason) = args.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            normalized["reason"] = Value::String(reason.to_string());
        }
        Ok(normalized)
    }

    async fn call(&self, args: Value) -> Result<String, ToolError> {
        let normalized = self.normalize(args)?;
        let args: RecordCallerArgs = serde_json::from_value(normalized)
            .map_err(|e| ToolError::invalid_arguments(TOOL_NAME, e.to_string()))?;

        let notification = Notification {
            kind: TOOL_NAME.to_string(),
            caller_id: args.caller_id.clone(),
            reason: args.reason,
            created_at: chrono::Utc::now(),
        };
        self.sink.notify(&notification).await?;

        Ok(format!("Thanks, I've noted your number {}.", args.caller_id))
    }
}
