//! Per-call session lifecycle.
//!
//! A session binds one call to the shared [`Agent`], a freshly built
//! pipeline, and the call's [`CallContext`]:
//!
//! ```text
//! connect()  Disconnected → Connected   context joins the room
//! start()    Connected    → Active      pipeline starts, agent greets
//! run()      Active       → Closing     hang-up, cancellation or model drop
//! close()    (any)        → Closing     agent says goodbye, pipeline closes
//! shutdown() Closing      → Terminated  context leaves the room
//! ```
//!
//! [`run_session`] drives the whole sequence and guarantees that `close` and
//! `shutdown` run exactly once on every exit path, including a panic inside
//! the connect/start/run phase.

use crate::agent::Agent;
use crate::error::SessionError;
use crate::pipeline::{CallContext, Pipeline, PipelineEvent, Speaker};
use ringline_tools::ToolDispatcher;
use ringline_types::{CallAssignment, EndReason, SessionOutcome, SessionState};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

pub struct AgentSession {
    id: String,
    call: CallAssignment,
    agent: Arc<Agent>,
    pipeline: Arc<dyn Pipeline>,
    context: Arc<dyn CallContext>,
    dispatcher: ToolDispatcher,
    state: watch::Sender<SessionState>,
    events: Mutex<Option<mpsc::Receiver<PipelineEvent>>>,
    entered: AtomicBool,
    greeted: AtomicBool,
    said_farewell: AtomicBool,
    closed: AtomicBool,
    shut_down: AtomicBool,
    tool_calls: AtomicU32,
}

impl AgentSession {
    pub fn new(
        call: CallAssignment,
        agent: Arc<Agent>,
        pipeline: Arc<dyn Pipeline>,
        context: Arc<dyn CallContext>,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(agent.tools().clone());
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            call,
            agent,
            pipeline,
            context,
            dispatcher,
            state,
            events: Mutex::new(None),
            entered: AtomicBool::new(false),
            greeted: AtomicBool::new(false),
            said_farewell: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            tool_calls: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn call(&self) -> &CallAssignment {
        &self.call
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn transition(&self, next: SessionState) -> Result<(), SessionError> {
        let mut result = Ok(());
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                debug!(session_id = %self.id, from = %current, to = %next, "session transition");
                *current = next;
                true
            } else {
                result = Err(SessionError::InvalidTransition {
                    from: *current,
                    to: next,
                });
                false
            }
        });
        result
    }

    fn expect_state(&self, expected: SessionState, next: SessionState) -> Result<(), SessionError> {
        let current = self.state();
        if current != expected {
            return Err(SessionError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        Ok(())
    }

    /// Joins the call. Disconnected → Connected.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.expect_state(SessionState::Disconnected, SessionState::Connected)?;
        self.context.connect().await?;
        self.transition(SessionState::Connected)
    }

    /// Starts the pipeline and greets the caller. Connected → Active.
    pub async fn start(&self) -> Result<(), SessionError> {
        self.expect_state(SessionState::Connected, SessionState::Active)?;
        let events = self.pipeline.start(self.agent.setup()).await?;
        *self.events.lock().await = Some(events);
        self.transition(SessionState::Active)?;
        self.entered.store(true, Ordering::SeqCst);
        info!(session_id = %self.id, "agent entered session");

        let greeted = self.agent.on_enter(self.pipeline.as_ref()).await;
        self.greeted.store(greeted, Ordering::SeqCst);
        Ok(())
    }

    /// Serves the active call until it ends. Active → Closing.
    ///
    /// Tool calls raised by the pipeline are dispatched in order; their
    /// replies are submitted back to the pipeline. A hang-up or cancellation
    /// abandons the tool call in flight.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<EndReason, SessionError> {
        self.expect_state(SessionState::Active, SessionState::Closing)?;
        let mut events = self.events.lock().await.take().ok_or_else(|| {
            SessionError::Pipeline("pipeline event stream already consumed".into())
        })?;
        let mut ended = self.context.ended();

        let reason = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break EndReason::Interrupted,
                _ = &mut ended => break EndReason::CallEnded,
                event = events.recv() => match event {
                    Some(PipelineEvent::ToolCall { call_id, name, arguments }) => {
                        // A stuck tool must not hold the call open.
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                warn!(session_id = %self.id, tool = %name, "tool call abandoned");
                                break EndReason::Interrupted;
                            }
                            _ = &mut ended => {
                                warn!(session_id = %self.id, tool = %name, "tool call abandoned");
                                break EndReason::CallEnded;
                            }
                            _ = self.handle_tool_call(&call_id, &name, arguments) => {}
                        }
                    }
                    Some(PipelineEvent::Transcript { speaker, text }) => {
                        let speaker = match speaker {
                            Speaker::Caller => "caller",
                            Speaker::Agent => "agent",
                        };
                        debug!(session_id = %self.id, speaker, text = %text, "transcript");
                    }
                    Some(PipelineEvent::Disconnected { reason }) => {
                        warn!(session_id = %self.id, reason = %reason, "model disconnected");
                        break EndReason::ModelDisconnected;
                    }
                    None => {
                        warn!(session_id = %self.id, "pipeline event stream closed");
                        break EndReason::ModelDisconnected;
                    }
                },
            }
        };

        self.transition(SessionState::Closing)?;
        info!(session_id = %self.id, reason = %reason, "session ending");
        Ok(reason)
    }

    async fn handle_tool_call(&self, call_id: &str, name: &str, arguments: serde_json::Value) {
        self.tool_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.dispatcher.dispatch(name, arguments).await;
        if let Err(e) = self
            .pipeline
            .submit_tool_result(call_id, outcome.reply())
            .await
        {
            warn!(
                session_id = %self.id,
                tool = name,
                call_id,
                error = %e,
                "failed to submit tool result"
            );
        }
    }

    /// Says goodbye (if the agent entered) and closes the pipeline.
    ///
    /// Runs once; later calls return immediately.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.state().is_finishing() {
            // A failed connect/start leaves the session in a live state.
            let _ = self.transition(SessionState::Closing);
        }

        if self.entered.load(Ordering::SeqCst) {
            let said = self.agent.on_exit(self.pipeline.as_ref()).await;
            self.said_farewell.store(said, Ordering::SeqCst);
        }

        if let Err(e) = self.pipeline.close().await {
            warn!(session_id = %self.id, error = %e, "failed to close pipeline");
        }
    }

    /// Leaves the call. Closing → Terminated.
    ///
    /// Runs once; later calls return immediately.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.state().is_finishing() {
            let _ = self.transition(SessionState::Closing);
        }
        self.context.shutdown().await;
        if let Err(e) = self.transition(SessionState::Terminated) {
            warn!(session_id = %self.id, error = %e, "unexpected state at shutdown");
        }
    }

    fn outcome(&self, end_reason: EndReason, error: Option<String>) -> SessionOutcome {
        SessionOutcome {
            session_id: self.id.clone(),
            call_id: self.call.call_id.clone(),
            end_reason,
            tool_calls: self.tool_calls.load(Ordering::SeqCst),
            greeted: self.greeted.load(Ordering::SeqCst),
            said_farewell: self.said_farewell.load(Ordering::SeqCst),
            error,
        }
    }
}

/// Runs a session from connect to termination.
///
/// Connect, start and the active phase run in their own task so that an
/// error or a panic there is observed here; `close` and `shutdown` then run
/// unconditionally. Cancelling `cancel` at any point takes the closing path.
pub async fn run_session(session: Arc<AgentSession>, cancel: CancellationToken) -> SessionOutcome {
    let span = tracing::info_span!(
        "session",
        session_id = %session.id(),
        call_id = %session.call().call_id
    );

    let body = {
        let session = session.clone();
        let cancel = cancel.clone();
        tokio::spawn(
            async move {
                let ready = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = async {
                        session.connect().await?;
                        session.start().await
                    } => Some(result),
                };
                match ready {
                    None => Ok(EndReason::Interrupted),
                    Some(Err(e)) => Err(e),
                    Some(Ok(())) => session.run(&cancel).await,
                }
            }
            .instrument(span.clone()),
        )
    };

    let (end_reason, error) = match body.await {
        Ok(Ok(reason)) => (reason, None),
        Ok(Err(e)) => {
            warn!(parent: &span, error = %e, "session failed");
            (EndReason::Failed, Some(e.to_string()))
        }
        Err(join_error) => {
            error!(parent: &span, error = %join_error, "session task aborted");
            (EndReason::Failed, Some(format!("session task aborted: {}", join_error)))
        }
    };

    async {
        session.close().await;
        session.shutdown().await;
        info!(reason = %end_reason, "session terminated");
    }
    .instrument(span.clone())
    .await;

    session.outcome(end_reason, error)
}
