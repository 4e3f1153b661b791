//! ringline worker binary: the process entry point for a telephony agent.
//!
//! Loads configuration, registers the agent with the routing system, serves
//! call assignments over HTTP, and drains sessions on SIGTERM/SIGINT.

use ringline_voice::{PipelineFactory, SimulatedPipelineFactory};
use ringline_worker::config::{self, Config};
use ringline_worker::registration::{Registration, RegistryClient};
use ringline_worker::worker::{Worker, WorkerLimits};
use ringline_worker::{app, AppState};
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("RINGLINE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Provider keys usually live in a local .env file.
    let dotenv = dotenvy::dotenv();

    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = match config::load_config(selected_config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config);

    match dotenv {
        Ok(path) => tracing::info!(path = %path.display(), "loaded environment file"),
        Err(e) if e.not_found() => tracing::debug!("no .env file found"),
        Err(e) => tracing::warn!(error = %e, "failed to load .env file"),
    }
    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    match run(config).await {
        Ok(()) => {
            tracing::info!("ringline worker shut down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let mut message = e.to_string();
            let mut source = e.source();
            while let Some(cause) = source {
                message.push_str(": ");
                message.push_str(&cause.to_string());
                source = cause.source();
            }
            tracing::error!(error = %message, "ringline worker failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn Error + Send + Sync>> {
    let agent_id = config.agent_id()?;
    let agent = Arc::new(config.build_agent(config.notification_sink()?)?);
    let factory: Arc<dyn PipelineFactory> =
        Arc::new(SimulatedPipelineFactory::new(config.pipeline_config())?);
    let worker = Arc::new(Worker::new(
        agent,
        factory,
        WorkerLimits {
            max_sessions: config.agent.max_sessions,
            drain_timeout: config.drain_timeout(),
        },
    ));

    let registry = if config.agent.register {
        let client = RegistryClient::new(&config.registry.url, config.registry.token.clone())?;
        client
            .register(&Registration {
                agent_id: agent_id.clone(),
                host: config.server.host.clone(),
                port: config.server.port,
                max_sessions: config.agent.max_sessions,
            })
            .await?;
        Some(client)
    } else {
        tracing::info!(agent_id = %agent_id, "registration disabled, skipping");
        None
    };

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        agent_id = %agent_id,
        max_sessions = config.agent.max_sessions,
        "starting ringline worker"
    );

    let router = app(AppState {
        worker: worker.clone(),
    });
    let shutdown = async move {
        shutdown_signal().await;
        if let Some(client) = &registry {
            if let Err(e) = client.deregister(&agent_id).await {
                tracing::warn!(error = %e, "failed to deregister from routing system");
            }
        }
        worker.shutdown().await;
    };
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
