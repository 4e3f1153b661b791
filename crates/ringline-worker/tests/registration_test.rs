use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    routing::post,
    Json, Router,
};
use ringline_types::AgentId;
use ringline_worker::registration::{Registration, RegistrationError, RegistryClient};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Captured {
    requests: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

async fn record(
    State(captured): State<Captured>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    captured
        .requests
        .lock()
        .unwrap()
        .push((uri.path().to_string(), auth, body));
    StatusCode::OK
}

async fn spawn_registry(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn registration() -> Registration {
    Registration {
        agent_id: AgentId::new("MyTelephonyAgent").unwrap(),
        host: "worker-1.internal".into(),
        port: 8081,
        max_sessions: 10,
    }
}

#[tokio::test]
async fn register_and_deregister_post_to_the_registry() {
    let captured = Captured::default();
    let router = Router::new()
        .route("/v1/agents/register", post(record))
        .route("/v1/agents/deregister", post(record))
        .with_state(captured.clone());
    let url = spawn_registry(router).await;

    // Trailing slash is tolerated.
    let client = RegistryClient::new(&format!("{}/", url), Some("t0ken".into())).unwrap();
    client.register(&registration()).await.unwrap();
    client
        .deregister(&AgentId::new("MyTelephonyAgent").unwrap())
        .await
        .unwrap();

    let requests = captured.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);

    let (path, auth, body) = &requests[0];
    assert_eq!(path, "/v1/agents/register");
    assert_eq!(auth.as_deref(), Some("Bearer t0ken"));
    assert_eq!(body["agentId"], "MyTelephonyAgent");
    assert_eq!(body["host"], "worker-1.internal");
    assert_eq!(body["port"], 8081);
    assert_eq!(body["maxSessions"], 10);

    let (path, _, body) = &requests[1];
    assert_eq!(path, "/v1/agents/deregister");
    assert_eq!(body["agentId"], "MyTelephonyAgent");
}

#[tokio::test]
async fn rejected_registration_is_an_error() {
    let router = Router::new().route(
        "/v1/agents/register",
        post(|| async { (StatusCode::FORBIDDEN, "agent name taken") }),
    );
    let url = spawn_registry(router).await;

    let client = RegistryClient::new(&url, None).unwrap();
    match client.register(&registration()).await {
        Err(RegistrationError::Rejected { status, body }) => {
            assert_eq!(status, reqwest::StatusCode::FORBIDDEN);
            assert_eq!(body, "agent name taken");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_registry_is_an_http_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = RegistryClient::new(&format!("http://{}", addr), None).unwrap();
    assert!(matches!(
        client.register(&registration()).await,
        Err(RegistrationError::Http(_))
    ));
}

#[test]
fn empty_registry_url_is_rejected() {
    assert!(matches!(
        RegistryClient::new("  ", None),
        Err(RegistrationError::MissingUrl)
    ));
}
