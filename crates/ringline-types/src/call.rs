//! Wire types exchanged with the call-routing system.

use crate::{EndReason, SessionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length accepted for call and room identifiers.
const MAX_CALL_ID_LEN: usize = 256;

/// An inbound call routed to this worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAssignment {
    /// Routing-system identifier of the call. Unique among active calls.
    pub call_id: String,
    /// Media room the agent should join to reach the caller.
    pub room_id: String,
    /// Caller's phone number, when the carrier provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_number: Option<String>,
    /// Opaque routing metadata passed through to the session.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Reasons a [`CallAssignment`] is rejected before a session is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidAssignment {
    #[error("callId must not be empty")]
    EmptyCallId,
    #[error("roomId must not be empty")]
    EmptyRoomId,
    #[error("{0} exceeds 256 bytes")]
    TooLong(&'static str),
}

impl CallAssignment {
    pub fn new(call_id: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            room_id: room_id.into(),
            caller_number: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_caller(mut self, number: impl Into<String>) -> Self {
        self.caller_number = Some(number.into());
        self
    }

    /// Checks the identifiers the worker relies on for indexing.
    pub fn validate(&self) -> Result<(), InvalidAssignment> {
        if self.call_id.trim().is_empty() {
            return Err(InvalidAssignment::EmptyCallId);
        }
        if self.room_id.trim().is_empty() {
            return Err(InvalidAssignment::EmptyRoomId);
        }
        if self.call_id.len() > MAX_CALL_ID_LEN {
            return Err(InvalidAssignment::TooLong("callId"));
        }
        if self.room_id.len() > MAX_CALL_ID_LEN {
            return Err(InvalidAssignment::TooLong("roomId"));
        }
        Ok(())
    }
}

/// Read model of a session currently tracked by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub call_id: String,
    pub room_id: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_number: Option<String>,
}

/// Final report of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub session_id: String,
    pub call_id: String,
    pub end_reason: EndReason,
    /// Number of tool calls the model issued, duplicates included.
    pub tool_calls: u32,
    /// Whether the greeting was delivered.
    pub greeted: bool,
    /// Whether the farewell was delivered.
    pub said_farewell: bool,
    /// Error message for sessions that ended with [`EndReason::Failed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
