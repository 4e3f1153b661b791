//! Agent and call-session runtime for ringline.
//!
//! An [`Agent`] carries the instructions, tools and announcements shared by
//! every call. Each routed call becomes an [`AgentSession`] that owns its own
//! speech [`Pipeline`] and [`CallContext`], and is driven from connect to
//! termination by [`run_session`].
//!
//! The real-time model, avatar and turn detector are external collaborators
//! reached through the [`Pipeline`] trait. [`SimulatedPipeline`] stands in
//! for them in tests and local runs.

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod simulated;

pub use agent::{Agent, AgentBuilder, DEFAULT_FAREWELL, DEFAULT_GREETING, DEFAULT_INSTRUCTIONS};
pub use config::PipelineConfig;
pub use context::RoomContext;
pub use error::SessionError;
pub use pipeline::{
    CallContext, Pipeline, PipelineEvent, PipelineFactory, PipelineSetup, Speaker,
};
pub use session::{run_session, AgentSession};
pub use simulated::{
    PipelineHandle, SimulatedBehavior, SimulatedPipeline, SimulatedPipelineFactory,
    MAX_TRACKED_HANDLES,
};
