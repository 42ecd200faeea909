//! Binary entry point: loads configuration, wires the component graph, and
//! runs the HTTP server until a shutdown signal arrives.

use std::process::ExitCode;

use ai_sorter_sidecar::config::Config;
use ai_sorter_sidecar::{app, AppState};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("startup failed: {err:#}");
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .init();

    let listen_addr = config.listen_addr.clone();
    let shutdown_grace = config.shutdown_grace;
    let state = AppState::build(config);
    let metrics = state.metrics.clone();
    let lifecycle = state.lifecycle.clone();

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, "failed to bind listen address");
            return ExitCode::from(1);
        }
    };
    info!(addr = %listen_addr, "ai-sorter listening");
    lifecycle.mark_ready();

    let router = app(state);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    // Run the server on its own task so a grace-period timeout can abort it
    // outright instead of waiting on `server.await`, which only resolves once
    // every in-flight connection closes on its own, something a hung request
    // never does.
    let mut serve_task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    lifecycle.wait_for_shutdown_signal().await;
    let _ = shutdown_tx.send(());

    info!("draining in-flight requests");
    let clean = lifecycle.drain(&metrics, shutdown_grace).await;
    serve_task.abort();
    let serve_result = (&mut serve_task).await;

    if !clean {
        warn!("shutdown grace period exceeded, forcing exit");
        return ExitCode::from(1);
    }

    match serve_result {
        Ok(Ok(())) => {
            info!("shutdown complete");
            ExitCode::from(0)
        }
        Ok(Err(err)) => {
            error!(error = %err, "server error");
            ExitCode::from(1)
        }
        Err(_) => {
            // Aborted right after a clean drain, before the connection close
            // notification reached the server task. The drain already
            // confirmed no handler was still running.
            info!("shutdown complete");
            ExitCode::from(0)
        }
    }
}
