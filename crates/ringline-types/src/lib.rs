//! Shared types for the ringline telephony agent.
//!
//! This crate provides the foundational types used across all ringline
//! crates: the agent identifier used for call routing, the session lifecycle
//! state machine, the call-assignment wire types exchanged with the routing
//! system, and the option types describing a speech pipeline.
//!
//! No crate in the workspace depends on anything *except* `ringline-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

mod call;
mod pipeline;

pub use call::{CallAssignment, InvalidAssignment, SessionOutcome, SessionSummary};
pub use pipeline::{AvatarOptions, Modality, ModelOptions, PipelineOptions, TurnDetectionOptions};

/// Maximum length of an agent identifier.
pub const MAX_AGENT_ID_LEN: usize = 128;

/// Globally unique identifier under which an agent is registered for routing.
///
/// Identifiers are non-empty, at most [`MAX_AGENT_ID_LEN`] bytes, and contain
/// no whitespace or control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

/// Error returned when an agent identifier fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentIdError {
    #[error("agent id must not be empty")]
    Empty,
    #[error("agent id exceeds 128 bytes")]
    TooLong,
    #[error("agent id must not contain whitespace or control characters: {0:?}")]
    InvalidCharacter(String),
}

impl AgentId {
    /// Validates and wraps an agent identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, AgentIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(AgentIdError::Empty);
        }
        if id.len() > MAX_AGENT_ID_LEN {
            return Err(AgentIdError::TooLong);
        }
        if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(AgentIdError::InvalidCharacter(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AgentId {
    type Err = AgentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AgentId {
    type Error = AgentIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.0
    }
}

/// Lifecycle state of a call session.
///
/// ```text
/// Disconnected ──connect──► Connected ──start──► Active
///      │                        │                  │
///      └────────────────────────┴──────────────────┴──► Closing ──► Terminated
/// ```
///
/// `Closing` is reachable from every live state so that cleanup runs even
/// when connecting or starting the pipeline fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    Disconnected,
    Connected,
    Active,
    Closing,
    Terminated,
}

impl SessionState {
    /// Returns the canonical string label for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connected => "CONNECTED",
            Self::Active => "ACTIVE",
            Self::Closing => "CLOSING",
            Self::Terminated => "TERMINATED",
        }
    }

    /// Returns `true` if the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Disconnected, Connected)
                | (Connected, Active)
                | (Disconnected | Connected | Active, Closing)
                | (Closing, Terminated)
        )
    }

    /// Returns `true` once the session has begun tearing down.
    pub fn is_finishing(self) -> bool {
        matches!(self, Self::Closing | Self::Terminated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an active session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The call context reported that the caller hung up.
    CallEnded,
    /// The worker is shutting down or the session was cancelled.
    Interrupted,
    /// The speech pipeline dropped its model connection.
    ModelDisconnected,
    /// Connecting, starting, or running the session failed.
    Failed,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CallEnded => "call_ended",
            Self::Interrupted => "interrupted",
            Self::ModelDisconnected => "model_disconnected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
