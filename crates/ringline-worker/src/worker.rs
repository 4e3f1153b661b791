//! Bounded pool of call sessions.
//!
//! The worker owns one [`Agent`] shared by every call, a semaphore sized to
//! `max_sessions`, and a root cancellation token. Each assignment becomes a
//! session task holding one permit and a child token; the permit is returned
//! when the task finishes, so the number of live sessions never exceeds the
//! limit.

use chrono::{DateTime, Utc};
use ringline_types::{CallAssignment, InvalidAssignment, SessionOutcome, SessionSummary};
use ringline_voice::{run_session, Agent, AgentSession, PipelineFactory, RoomContext, SessionError};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Buffered outcomes per subscriber before old ones are dropped.
const OUTCOME_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker is at capacity ({0} sessions)")]
    AtCapacity(usize),

    #[error("call '{0}' already has an active session")]
    DuplicateCall(String),

    #[error("invalid call assignment: {0}")]
    InvalidAssignment(#[from] InvalidAssignment),

    #[error("no active session for call '{0}'")]
    UnknownCall(String),

    #[error("failed to build session: {0}")]
    Session(#[from] SessionError),

    #[error("worker is shutting down")]
    ShuttingDown,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerLimits {
    pub max_sessions: usize,
    /// How long [`Worker::shutdown`] waits for sessions to finish.
    pub drain_timeout: Duration,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self {
            max_sessions: 10,
            drain_timeout: Duration::from_secs(10),
        }
    }
}

struct ActiveCall {
    session: Arc<AgentSession>,
    end_signal: CancellationToken,
    started_at: DateTime<Utc>,
}

impl ActiveCall {
    fn summary(&self) -> SessionSummary {
        let call = self.session.call();
        SessionSummary {
            session_id: self.session.id().to_string(),
            call_id: call.call_id.clone(),
            room_id: call.room_id.clone(),
            state: self.session.state(),
            started_at: self.started_at,
            caller_number: call.caller_number.clone(),
        }
    }
}

type CallIndex = Arc<RwLock<HashMap<String, ActiveCall>>>;

pub struct Worker {
    agent: Arc<Agent>,
    factory: Arc<dyn PipelineFactory>,
    limits: WorkerLimits,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    calls: CallIndex,
    tasks: TaskTracker,
    outcomes: broadcast::Sender<SessionOutcome>,
}

impl Worker {
    pub fn new(agent: Arc<Agent>, factory: Arc<dyn PipelineFactory>, limits: WorkerLimits) -> Self {
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        Self {
            agent,
            factory,
            limits,
            permits: Arc::new(Semaphore::new(limits.max_sessions)),
            cancel: CancellationToken::new(),
            calls: Arc::new(RwLock::new(HashMap::new())),
            tasks: TaskTracker::new(),
            outcomes,
        }
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn max_sessions(&self) -> usize {
        self.limits.max_sessions
    }

    pub fn active_sessions(&self) -> usize {
        self.calls.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Receiver for the outcome of every session that finishes after this call.
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<SessionOutcome> {
        self.outcomes.subscribe()
    }

    /// Starts a session for `call` in the background.
    ///
    /// Fails fast when the worker is full; the caller is expected to route
    /// the call elsewhere.
    pub fn assign(&self, call: CallAssignment) -> Result<SessionSummary, WorkerError> {
        if self.cancel.is_cancelled() {
            return Err(WorkerError::ShuttingDown);
        }
        call.validate()?;
        if self
            .calls
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(&call.call_id)
        {
            return Err(WorkerError::DuplicateCall(call.call_id));
        }

        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| WorkerError::AtCapacity(self.limits.max_sessions))?;

        let pipeline = self.factory.create(&call)?;
        let context = Arc::new(RoomContext::new(&call));
        let end_signal = context.end_signal();
        let call_id = call.call_id.clone();
        let session = Arc::new(AgentSession::new(
            call,
            self.agent.clone(),
            pipeline,
            context,
        ));
        let active = ActiveCall {
            session: session.clone(),
            end_signal,
            started_at: Utc::now(),
        };
        let summary = active.summary();

        {
            let mut calls = self.calls.write().unwrap_or_else(|p| p.into_inner());
            if calls.contains_key(&call_id) {
                return Err(WorkerError::DuplicateCall(call_id));
            }
            calls.insert(call_id.clone(), active);
        }

        info!(
            session_id = %summary.session_id,
            call_id = %call_id,
            active = self.active_sessions(),
            max = self.limits.max_sessions,
            "call assigned"
        );

        let calls = self.calls.clone();
        let outcomes = self.outcomes.clone();
        let cancel = self.cancel.child_token();
        self.tasks.spawn(async move {
            let session_id = session.id().to_string();
            let outcome = run_session(session, cancel).await;

            {
                let mut calls = calls.write().unwrap_or_else(|p| p.into_inner());
                if calls
                    .get(&call_id)
                    .is_some_and(|c| c.session.id() == session_id)
                {
                    calls.remove(&call_id);
                }
            }
            drop(permit);

            match &outcome.error {
                Some(e) => error!(
                    session_id = %outcome.session_id,
                    call_id = %outcome.call_id,
                    reason = %outcome.end_reason,
                    error = %e,
                    "session failed"
                ),
                None => info!(
                    session_id = %outcome.session_id,
                    call_id = %outcome.call_id,
                    reason = %outcome.end_reason,
                    tool_calls = outcome.tool_calls,
                    "session finished"
                ),
            }
            let _ = outcomes.send(outcome);
        });

        Ok(summary)
    }

    /// Signals that the caller hung up.
    pub fn end_call(&self, call_id: &str) -> Result<(), WorkerError> {
        let calls = self.calls.read().unwrap_or_else(|p| p.into_inner());
        let active = calls
            .get(call_id)
            .ok_or_else(|| WorkerError::UnknownCall(call_id.to_string()))?;
        active.end_signal.cancel();
        Ok(())
    }

    pub fn session(&self, call_id: &str) -> Option<SessionSummary> {
        self.calls
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(call_id)
            .map(ActiveCall::summary)
    }

    /// Summaries of all live sessions, oldest first.
    pub fn sessions(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<SessionSummary> = self
            .calls
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .map(ActiveCall::summary)
            .collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        sessions
    }

    /// Stops accepting calls, cancels every session and waits for them to
    /// finish, up to the drain timeout.
    ///
    /// Returns `true` if every session finished in time.
    pub async fn shutdown(&self) -> bool {
        info!(active = self.active_sessions(), "worker shutting down");
        self.cancel.cancel();
        self.tasks.close();

        match tokio::time::timeout(self.limits.drain_timeout, self.tasks.wait()).await {
            Ok(()) => {
                info!("all sessions drained");
                true
            }
            Err(_) => {
                warn!(
                    remaining = self.active_sessions(),
                    timeout_secs = self.limits.drain_timeout.as_secs(),
                    "drain timeout elapsed with sessions still running"
                );
                false
            }
        }
    }
}
