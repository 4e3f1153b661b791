use ringline_tools::{MemoryNotifier, RecordCallerTool, ToolRegistry};
use ringline_types::{AgentId, CallAssignment, EndReason, SessionOutcome, SessionState};
use ringline_voice::{
    Agent, PipelineConfig, PipelineEvent, SimulatedBehavior, SimulatedPipelineFactory,
    DEFAULT_FAREWELL, DEFAULT_GREETING,
};
use ringline_worker::worker::{Worker, WorkerError, WorkerLimits};
use ringline_types::PipelineOptions;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Fixture {
    worker: Arc<Worker>,
    factory: Arc<SimulatedPipelineFactory>,
    notifier: MemoryNotifier,
}

fn fixture(max_sessions: usize, behavior: SimulatedBehavior) -> Fixture {
    let notifier = MemoryNotifier::new();
    let tools = ToolRegistry::new()
        .with(Arc::new(RecordCallerTool::new(Arc::new(notifier.clone()))))
        .unwrap();
    let agent = Agent::builder(AgentId::new("MyTelephonyAgent").unwrap())
        .tools(tools)
        .build();
    let factory = Arc::new(
        SimulatedPipelineFactory::new(PipelineConfig::new(PipelineOptions::default(), "test-key"))
            .unwrap()
            .with_behavior(behavior),
    );
    let worker = Arc::new(Worker::new(
        Arc::new(agent),
        factory.clone(),
        WorkerLimits {
            max_sessions,
            drain_timeout: Duration::from_secs(5),
        },
    ));
    Fixture {
        worker,
        factory,
        notifier,
    }
}

fn call(id: &str) -> CallAssignment {
    CallAssignment::new(id, format!("room-{}", id))
}

async fn wait_for_state(worker: &Worker, call_id: &str, state: SessionState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if worker.session(call_id).map(|s| s.state) == Some(state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session did not reach the expected state");
}

async fn next_outcome(rx: &mut broadcast::Receiver<SessionOutcome>) -> SessionOutcome {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a session outcome")
        .expect("outcome channel open")
}

#[tokio::test]
async fn concurrent_assignments_never_exceed_the_limit() {
    let f = fixture(3, SimulatedBehavior::default());

    let mut tasks = Vec::new();
    for i in 0..20 {
        let worker = f.worker.clone();
        tasks.push(tokio::spawn(async move {
            worker.assign(call(&format!("call-{}", i)))
        }));
    }

    let mut accepted = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(WorkerError::AtCapacity(3)) => rejected += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(accepted, 3);
    assert_eq!(rejected, 17);
    assert_eq!(f.worker.active_sessions(), 3);
    assert!(f.worker.shutdown().await);
}

#[tokio::test]
async fn capacity_is_released_when_a_call_ends() {
    let f = fixture(1, SimulatedBehavior::default());
    let mut outcomes = f.worker.subscribe_outcomes();

    f.worker.assign(call("a")).unwrap();
    assert!(matches!(
        f.worker.assign(call("b")),
        Err(WorkerError::AtCapacity(1))
    ));

    wait_for_state(&f.worker, "a", SessionState::Active).await;
    f.worker.end_call("a").unwrap();
    let outcome = next_outcome(&mut outcomes).await;
    assert_eq!(outcome.call_id, "a");
    assert_eq!(outcome.end_reason, EndReason::CallEnded);
    assert!(outcome.greeted);
    assert!(outcome.said_farewell);
    assert!(outcome.error.is_none());

    assert_eq!(f.worker.active_sessions(), 0);
    assert!(f.worker.session("a").is_none());
    f.worker.assign(call("b")).unwrap();
    assert!(f.worker.shutdown().await);
}

#[tokio::test]
async fn hangup_right_after_assignment_still_greets_and_says_goodbye() {
    let f = fixture(2, SimulatedBehavior::default());
    let mut outcomes = f.worker.subscribe_outcomes();

    f.worker.assign(call("quick")).unwrap();
    f.worker.end_call("quick").unwrap();

    let outcome = next_outcome(&mut outcomes).await;
    assert_eq!(outcome.call_id, "quick");
    assert_eq!(outcome.end_reason, EndReason::CallEnded);
    assert!(outcome.greeted);
    assert!(outcome.said_farewell);
    assert!(outcome.error.is_none());

    let pipeline = f.factory.handle("quick").unwrap();
    assert_eq!(
        pipeline.utterances(),
        vec![DEFAULT_GREETING, DEFAULT_FAREWELL]
    );
    assert_eq!(pipeline.close_count(), 1);
    assert_eq!(f.worker.active_sessions(), 0);
    assert!(f.worker.shutdown().await);
}

#[tokio::test]
async fn duplicate_and_invalid_assignments_are_rejected() {
    let f = fixture(4, SimulatedBehavior::default());

    f.worker.assign(call("dup")).unwrap();
    assert!(matches!(
        f.worker.assign(call("dup")),
        Err(WorkerError::DuplicateCall(id)) if id == "dup"
    ));
    assert!(matches!(
        f.worker.assign(CallAssignment::new("", "room")),
        Err(WorkerError::InvalidAssignment(_))
    ));
    assert_eq!(f.worker.active_sessions(), 1);
    assert!(matches!(
        f.worker.end_call("missing"),
        Err(WorkerError::UnknownCall(_))
    ));
    assert!(f.worker.shutdown().await);
}

#[tokio::test]
async fn failed_session_does_not_take_down_the_worker() {
    let f = fixture(
        1,
        SimulatedBehavior {
            fail_start: true,
            ..Default::default()
        },
    );
    let mut outcomes = f.worker.subscribe_outcomes();

    f.worker.assign(call("broken")).unwrap();
    let outcome = next_outcome(&mut outcomes).await;
    assert_eq!(outcome.end_reason, EndReason::Failed);
    assert!(outcome.error.is_some());
    assert_eq!(f.factory.handle("broken").unwrap().close_count(), 1);

    // The permit came back, so the next call is accepted.
    f.worker.assign(call("next")).unwrap();
    let outcome = next_outcome(&mut outcomes).await;
    assert_eq!(outcome.call_id, "next");
    assert!(f.worker.shutdown().await);
}

#[tokio::test]
async fn shutdown_interrupts_every_session() {
    let f = fixture(4, SimulatedBehavior::default());
    let mut outcomes = f.worker.subscribe_outcomes();

    for id in ["s1", "s2"] {
        f.worker.assign(call(id)).unwrap();
        wait_for_state(&f.worker, id, SessionState::Active).await;
    }
    assert_eq!(f.worker.sessions().len(), 2);

    assert!(f.worker.shutdown().await);
    assert!(f.worker.is_shutting_down());
    assert_eq!(f.worker.active_sessions(), 0);

    for _ in 0..2 {
        let outcome = next_outcome(&mut outcomes).await;
        assert_eq!(outcome.end_reason, EndReason::Interrupted);
        assert!(outcome.said_farewell);
    }
    for id in ["s1", "s2"] {
        let handle = f.factory.handle(id).unwrap();
        assert_eq!(handle.close_count(), 1);
        assert!(!handle.is_running());
    }
    assert!(matches!(
        f.worker.assign(call("late")),
        Err(WorkerError::ShuttingDown)
    ));
}

#[tokio::test]
async fn tool_calls_reach_the_notifier_once() {
    let f = fixture(2, SimulatedBehavior::default());
    let mut outcomes = f.worker.subscribe_outcomes();

    f.worker
        .assign(call("tools").with_caller("+15551234567"))
        .unwrap();
    wait_for_state(&f.worker, "tools", SessionState::Active).await;

    let pipeline = f.factory.handle("tools").unwrap();
    for call_id in ["t1", "t2"] {
        assert!(
            pipeline
                .inject(PipelineEvent::ToolCall {
                    call_id: call_id.into(),
                    name: "record_caller".into(),
                    arguments: json!({ "caller_id": "+15551234567" }),
                })
                .await
        );
    }
    pipeline.disconnect("model went away").await;

    let outcome = next_outcome(&mut outcomes).await;
    assert_eq!(outcome.end_reason, EndReason::ModelDisconnected);
    assert_eq!(outcome.tool_calls, 2);
    assert_eq!(f.notifier.len(), 1);
    assert_eq!(f.notifier.sent()[0].caller_id, "+15551234567");
    assert!(f.worker.shutdown().await);
}
