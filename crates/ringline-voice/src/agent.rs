use crate::error::SessionError;
use crate::pipeline::{Pipeline, PipelineSetup};
use ringline_tools::ToolRegistry;
use ringline_types::AgentId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful AI assistant that answers phone calls. \
     Keep your responses concise and friendly.";
pub const DEFAULT_GREETING: &str =
    "Hello! I'm your real-time assistant. How can I help you today?";
pub const DEFAULT_FAREWELL: &str = "Goodbye! It was great talking with you!";

/// Upper bound on delivering a single announcement.
const UTTERANCE_TIMEOUT: Duration = Duration::from_secs(10);

/// The agent answering calls: instructions, tools and announcements.
///
/// Built once at startup and shared by every session through an `Arc`.
#[derive(Debug)]
pub struct Agent {
    id: AgentId,
    instructions: String,
    tools: Arc<ToolRegistry>,
    greeting: Option<String>,
    farewell: Option<String>,
}

impl Agent {
    pub fn builder(id: AgentId) -> AgentBuilder {
        AgentBuilder {
            id,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            tools: ToolRegistry::new(),
            greeting: Some(DEFAULT_GREETING.to_string()),
            farewell: Some(DEFAULT_FAREWELL.to_string()),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn greeting(&self) -> Option<&str> {
        self.greeting.as_deref()
    }

    pub fn farewell(&self) -> Option<&str> {
        self.farewell.as_deref()
    }

    pub fn setup(&self) -> PipelineSetup {
        PipelineSetup {
            instructions: self.instructions.clone(),
            tools: self.tools.definitions(),
        }
    }

    /// Greets the caller. Returns whether the greeting was delivered.
    pub async fn on_enter(&self, pipeline: &dyn Pipeline) -> bool {
        match &self.greeting {
            Some(text) => announce(pipeline, text, "greeting").await,
            None => false,
        }
    }

    /// Says goodbye. Returns whether the farewell was delivered.
    pub async fn on_exit(&self, pipeline: &dyn Pipeline) -> bool {
        match &self.farewell {
            Some(text) => announce(pipeline, text, "farewell").await,
            None => false,
        }
    }
}

/// Delivery failures are logged and swallowed.
async fn announce(pipeline: &dyn Pipeline, text: &str, kind: &'static str) -> bool {
    let result = match tokio::time::timeout(UTTERANCE_TIMEOUT, pipeline.say(text)).await {
        Ok(result) => result,
        Err(_) => Err(SessionError::SpeechTimeout(UTTERANCE_TIMEOUT.as_secs())),
    };

    match result {
        Ok(()) => {
            info!(kind, "announcement delivered");
            true
        }
        Err(e) => {
            warn!(kind, error = %e, "failed to deliver announcement");
            false
        }
    }
}

pub struct AgentBuilder {
    id: AgentId,
    instructions: String,
    tools: ToolRegistry,
    greeting: Option<String>,
    farewell: Option<String>,
}

impl AgentBuilder {
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// `None` (or an empty string) disables the greeting.
    pub fn greeting(mut self, greeting: Option<String>) -> Self {
        self.greeting = greeting.filter(|g| !g.trim().is_empty());
        self
    }

    /// `None` (or an empty string) disables the farewell.
    pub fn farewell(mut self, farewell: Option<String>) -> Self {
        self.farewell = farewell.filter(|f| !f.trim().is_empty());
        self
    }

    pub fn build(self) -> Agent {
        Agent {
            id: self.id,
            instructions: self.instructions,
            tools: Arc::new(self.tools),
            greeting: self.greeting,
            farewell: self.farewell,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let agent = Agent::builder(AgentId::new("MyTelephonyAgent").unwrap()).build();
        assert_eq!(agent.id().as_str(), "MyTelephonyAgent");
        assert_eq!(agent.instructions(), DEFAULT_INSTRUCTIONS);
        assert_eq!(agent.greeting(), Some(DEFAULT_GREETING));
        assert_eq!(agent.farewell(), Some(DEFAULT_FAREWELL));
        assert!(agent.tools().is_empty());
    }

    #[test]
    fn blank_announcements_are_disabled() {
        let agent = Agent::builder(AgentId::new("a").unwrap())
            .greeting(Some("  ".into()))
            .farewell(None)
            .build();
        assert_eq!(agent.greeting(), None);
        assert_eq!(agent.farewell(), None);
    }
}
