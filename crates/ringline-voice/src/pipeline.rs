//! Seams to the external speech pipeline and call transport.

use crate::error::SessionError;
use async_trait::async_trait;
use ringline_tools::ToolDefinition;
use ringline_types::CallAssignment;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What the pipeline needs to know about the agent when it starts.
#[derive(Debug, Clone)]
pub struct PipelineSetup {
    pub instructions: String,
    pub tools: Vec<ToolDefinition>,
}

/// Events raised by a running pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The model wants a tool executed. The result must be submitted with
    /// [`Pipeline::submit_tool_result`] under the same `call_id`.
    ToolCall {
        call_id: String,
        name: String,
        arguments: Value,
    },
    /// A finished utterance, from the caller or the agent.
    Transcript { speaker: Speaker, text: String },
    /// The model connection dropped.
    Disconnected { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Caller,
    Agent,
}

/// Real-time model, optional avatar and turn detector for one call.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Opens the model stream and returns its event channel.
    async fn start(&self, setup: PipelineSetup)
        -> Result<mpsc::Receiver<PipelineEvent>, SessionError>;

    /// Speaks `text` to the caller.
    async fn say(&self, text: &str) -> Result<(), SessionError>;

    async fn submit_tool_result(&self, call_id: &str, output: &str) -> Result<(), SessionError>;

    /// Releases the model stream. Must tolerate a pipeline that never started.
    async fn close(&self) -> Result<(), SessionError>;
}

/// Builds one pipeline per call.
pub trait PipelineFactory: Send + Sync {
    fn create(&self, call: &CallAssignment) -> Result<Arc<dyn Pipeline>, SessionError>;
}

/// Connection to the call's media room.
#[async_trait]
pub trait CallContext: Send + Sync {
    async fn connect(&self) -> Result<(), SessionError>;

    /// Resolves once the caller has hung up.
    async fn ended(&self);

    async fn shutdown(&self);
}
