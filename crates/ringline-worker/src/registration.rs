//! Registration with the call-routing system.

use ringline_types::AgentId;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of `POST /v1/agents/register`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub agent_id: AgentId,
    pub host: String,
    pub port: u16,
    pub max_sessions: usize,
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("registry url must not be empty")]
    MissingUrl,

    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry rejected registration with {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Client for the routing registry.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl RegistryClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, RegistrationError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(RegistrationError::MissingUrl);
        }
        let client = reqwest::Client::builder()
            .timeout(REGISTRATION_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url,
            token,
            client,
        })
    }

    /// Announces the agent so the router starts dispatching calls to it.
    pub async fn register(&self, registration: &Registration) -> Result<(), RegistrationError> {
        self.post("/v1/agents/register", registration).await?;
        tracing::info!(
            agent_id = %registration.agent_id,
            registry = %self.base_url,
            max_sessions = registration.max_sessions,
            "registered with routing system"
        );
        Ok(())
    }

    /// Withdraws the agent from routing. Used during shutdown.
    pub async fn deregister(&self, agent_id: &AgentId) -> Result<(), RegistrationError> {
        let body = serde_json::json!({ "agentId": agent_id });
        self.post("/v1/agents/deregister", &body).await?;
        tracing::info!(agent_id = %agent_id, "deregistered from routing system");
        Ok(())
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), RegistrationError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RegistrationError::Rejected { status, body });
        }
        Ok(())
    }
}
