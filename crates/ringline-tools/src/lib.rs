//! Tools the conversational model may call mid-session.
//!
//! A tool is a named async function with a JSON-schema parameter object.
//! Tools are collected into a [`ToolRegistry`] when the agent is built and
//! the registry is shared read-only by every session. Each session wraps the
//! registry in a [`ToolDispatcher`], which:
//!
//! - looks the requested tool up by name,
//! - suppresses duplicate invocations (real-time models retry tool calls),
//! - converts every failure into a short fallback reply so a broken tool
//!   never aborts the conversation.
//!
//! Side effects leave the process through a [`NotificationSink`].

mod dispatch;
mod error;
mod notify;
mod record_caller;
mod registry;

pub use dispatch::{idempotency_key, DispatchOutcome, ToolDispatcher, FALLBACK_REPLY};
pub use error::ToolError;
pub use notify::{
    LogNotifier, MemoryNotifier, Notification, NotificationSink, WebhookNotifier,
};
pub use record_caller::RecordCallerTool;
pub use registry::{Tool, ToolDefinition, ToolRegistry};
