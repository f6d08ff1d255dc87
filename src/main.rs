use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use proctor_sync::api;
use proctor_sync::config::Config;
use proctor_sync::exam::HttpExamService;
use proctor_sync::session::{SessionEvent, SessionMode, SessionSynchronizer};
use proctor_sync::SyncError;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Proctor sync stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> proctor_sync::Result<()> {
    let service = Arc::new(HttpExamService::new(&config.exam_service)?);
    tracing::info!(
        exam_api = %service.base_url(),
        session_id = %config.session.session_id,
        "Connecting to exam service"
    );

    let (sync, mut events) = SessionSynchronizer::open(service, config.session.clone())?;
    let sync = Arc::new(sync);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (addr, server) = warp::serve(api::session_routes::session_routes(sync.clone()))
        .try_bind_with_graceful_shutdown(config.bind_address(), async {
            shutdown_rx.await.ok();
        })
        .map_err(|e| SyncError::internal(format!("Failed to bind control API: {}", e)))?;
    let server = tokio::spawn(server);
    tracing::info!(%addr, "Control API listening");

    sync.start().await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::EndedRemotely { reason }) => {
                    tracing::info!(?reason, "Session ended by the server, shutting down");
                    break;
                }
                Some(SessionEvent::Error(err)) => {
                    tracing::warn!(operation = %err.operation, error = %err.message, "Session reported an error");
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C");
                if sync.mode() == SessionMode::Active {
                    if let Err(e) = sync.finish().await {
                        tracing::error!(error = %e, "Could not close the session, leaving it open on the server");
                    }
                }
                sync.leave();
                break;
            }
        }
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = server.await {
        tracing::error!(error = %e, "Control API task failed");
    }
    Ok(())
}
