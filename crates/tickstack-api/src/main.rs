//! Tickstack API server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use serde_json::Value;
use tickstack_api::error::AppError;
use tickstack_api::state::{AppState, DEFAULT_OBSERVER_CAPACITY};
use tickstack_api::{build_router, demo};
use tickstack_bus::EventBus;
use tickstack_core::clock::SystemClock;
use tickstack_core::config::EngineConfig;
use tickstack_scheduler::{Scheduler, SchedulerHandle};
use tickstack_state::StateTransitionAdapter;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Tickstack API server");

    // Read configuration from environment.
    let config = EngineConfig::from_env()?;
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?;

    // Build the runtime. The view and bridge attach before the adapter sees
    // its first push.
    let clock = Arc::new(SystemClock);
    let bus = EventBus::new(clock.clone(), config.bus.clone());
    let scheduler = Scheduler::new(bus.clone(), clock, config.scheduler.clone());
    let handle = scheduler.handle();
    let (app_state, _subscriptions) = AppState::attach(
        bus.clone(),
        handle.clone(),
        demo::registry(),
        DEFAULT_OBSERVER_CAPACITY,
    );
    let adapter = StateTransitionAdapter::install(&bus);
    let initial = app_state.registry.request(demo::IDLE, Value::Null)?;

    // The scheduler thread owns the adapter and is the only thread that
    // drains the bus.
    let (stopped_tx, stopped_rx) = oneshot::channel();
    let engine = thread::Builder::new()
        .name("tickstack-scheduler".to_string())
        .spawn(move || {
            let _adapter = adapter;
            let result = scheduler.run(Some(initial));
            if stopped_tx.send(()).is_err() {
                debug!("server already gone when scheduler stopped");
            }
            result
        })?;

    tokio::spawn(log_observed_events(app_state.bridge.observe()));

    // Start server.
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(shutdown_signal(handle.clone(), stopped_rx))
        .await;

    // Covers the server failing while the scheduler is still running.
    handle.shutdown();
    let summary = engine
        .join()
        .map_err(|_| AppError::SchedulerPanicked)??;
    info!(
        frames = summary.frames,
        overruns = summary.overruns,
        backlog_frames = summary.backlog_frames,
        "scheduler finished"
    );

    served?;
    Ok(())
}

/// Resolves on Ctrl-C (after asking the scheduler to stop) or once the
/// scheduler stops by itself.
async fn shutdown_signal(scheduler: SchedulerHandle, stopped: oneshot::Receiver<()>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown signal received");
            scheduler.shutdown();
        }
        _ = stopped => {
            info!("scheduler stopped; shutting down server");
        }
    }
}

async fn log_observed_events(mut observer: broadcast::Receiver<Value>) {
    loop {
        match observer.recv().await {
            Ok(event) => debug!(%event, "bus event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event observer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
