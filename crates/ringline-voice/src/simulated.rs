//! In-process stand-in for the external speech pipeline.
//!
//! Audio transport, model inference and avatar rendering live outside this
//! workspace. The simulated pipeline accepts the same calls as a real one,
//! records what the agent said, and lets callers inject model events through
//! a [`PipelineHandle`]. The worker binary runs on it until a provider
//! integration is plugged in through [`PipelineFactory`].

use crate::config::PipelineConfig;
use crate::error::SessionError;
use crate::pipeline::{Pipeline, PipelineEvent, PipelineFactory, PipelineSetup};
use async_trait::async_trait;
use ringline_types::CallAssignment;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Capacity of the pipeline event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Handles kept by [`SimulatedPipelineFactory`]; older calls are forgotten.
pub const MAX_TRACKED_HANDLES: usize = 128;

/// Failure injection for the simulated pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedBehavior {
    /// `start` returns an error.
    pub fail_start: bool,
    /// Every `say` returns an error.
    pub fail_speech: bool,
}

#[derive(Default)]
struct SimState {
    utterances: Mutex<Vec<String>>,
    tool_results: Mutex<Vec<(String, String)>>,
    events_tx: Mutex<Option<mpsc::Sender<PipelineEvent>>>,
    setup: Mutex<Option<PipelineSetup>>,
    starts: AtomicU32,
    closes: AtomicU32,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct SimulatedPipeline {
    label: String,
    behavior: SimulatedBehavior,
    state: Arc<SimState>,
}

impl SimulatedPipeline {
    pub fn new(label: impl Into<String>, behavior: SimulatedBehavior) -> Self {
        Self {
            label: label.into(),
            behavior,
            state: Arc::new(SimState::default()),
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            state: self.state.clone(),
        }
    }
}

#[async_trait]
impl Pipeline for SimulatedPipeline {
    async fn start(
        &self,
        setup: PipelineSetup,
    ) -> Result<mpsc::Receiver<PipelineEvent>, SessionError> {
        self.state.starts.fetch_add(1, Ordering::SeqCst);
        if self.behavior.fail_start {
            return Err(SessionError::Pipeline(format!(
                "simulated start failure for '{}'",
                self.label
            )));
        }

        info!(
            pipeline = %self.label,
            tools = setup.tools.len(),
            "simulated pipeline started"
        );
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        *lock(&self.state.events_tx) = Some(tx);
        *lock(&self.state.setup) = Some(setup);
        Ok(rx)
    }

    async fn say(&self, text: &str) -> Result<(), SessionError> {
        if self.behavior.fail_speech {
            return Err(SessionError::Pipeline("simulated speech failure".into()));
        }
        debug!(pipeline = %self.label, text, "agent speaking");
        lock(&self.state.utterances).push(text.to_string());
        Ok(())
    }

    async fn submit_tool_result(&self, call_id: &str, output: &str) -> Result<(), SessionError> {
        debug!(pipeline = %self.label, call_id, output, "tool result submitted");
        lock(&self.state.tool_results).push((call_id.to_string(), output.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.events_tx).take();
        info!(pipeline = %self.label, "simulated pipeline closed");
        Ok(())
    }
}

/// Observes and drives a [`SimulatedPipeline`] from outside the session.
#[derive(Clone)]
pub struct PipelineHandle {
    state: Arc<SimState>,
}

impl PipelineHandle {
    /// Delivers an event as if the model had produced it.
    ///
    /// Returns `false` if the pipeline is not running.
    pub async fn inject(&self, event: PipelineEvent) -> bool {
        let tx = lock(&self.state.events_tx).clone();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Simulates the model connection dropping.
    pub async fn disconnect(&self, reason: impl Into<String>) -> bool {
        self.inject(PipelineEvent::Disconnected {
            reason: reason.into(),
        })
        .await
    }

    pub fn utterances(&self) -> Vec<String> {
        lock(&self.state.utterances).clone()
    }

    pub fn tool_results(&self) -> Vec<(String, String)> {
        lock(&self.state.tool_results).clone()
    }

    pub fn setup(&self) -> Option<PipelineSetup> {
        lock(&self.state.setup).clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state.events_tx).is_some()
    }

    pub fn start_count(&self) -> u32 {
        self.state.starts.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.state.closes.load(Ordering::SeqCst)
    }
}

/// Creates a [`SimulatedPipeline`] per call and keeps handles to the
/// [`MAX_TRACKED_HANDLES`] most recent ones.
pub struct SimulatedPipelineFactory {
    config: PipelineConfig,
    behavior: SimulatedBehavior,
    handles: Mutex<TrackedHandles>,
}

#[derive(Default)]
struct TrackedHandles {
    by_call: HashMap<String, PipelineHandle>,
    order: VecDeque<String>,
}

impl TrackedHandles {
    fn insert(&mut self, call_id: String, handle: PipelineHandle) {
        if self.by_call.insert(call_id.clone(), handle).is_some() {
            self.order.retain(|id| id != &call_id);
        }
        self.order.push_back(call_id);
        while self.order.len() > MAX_TRACKED_HANDLES {
            if let Some(oldest) = self.order.pop_front() {
                self.by_call.remove(&oldest);
            }
        }
    }
}

impl SimulatedPipelineFactory {
    pub fn new(config: PipelineConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            config,
            behavior: SimulatedBehavior::default(),
            handles: Mutex::new(TrackedHandles::default()),
        })
    }

    pub fn with_behavior(mut self, behavior: SimulatedBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn tracked_handles(&self) -> usize {
        lock(&self.handles).by_call.len()
    }

    /// Handle of the most recent pipeline created for `call_id`, if it is
    /// still tracked.
    pub fn handle(&self, call_id: &str) -> Option<PipelineHandle> {
        lock(&self.handles).by_call.get(call_id).cloned()
    }
}

impl PipelineFactory for SimulatedPipelineFactory {
    fn create(&self, call: &CallAssignment) -> Result<Arc<dyn Pipeline>, SessionError> {
        let options = &self.config.options;
        info!(
            call_id = %call.call_id,
            model = %options.model.name,
            voice = %options.model.voice,
            avatar = options.avatar.is_some(),
            turn_threshold = options.turn_detection.threshold,
            "building pipeline"
        );

        let pipeline = SimulatedPipeline::new(call.call_id.clone(), self.behavior);
        lock(&self.handles).insert(call.call_id.clone(), pipeline.handle());
        Ok(Arc::new(pipeline))
    }
}
