#![forbid(unsafe_code)]

use std::{env, net::SocketAddr};

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use smarthome_adapter::{
    door_open_error_response, nodes_health_error_response, AdapterFailure, AdapterFailureKind,
    AdapterHealthResponse, AdapterRuntime, DoorOpenResponse, NodesHealthResponse,
    NodesListResponse, OtpResponse,
};
use smarthome_os::scheduler::SchedulerEvent;
use tracing::{debug, info, level_filters::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let bind = env::var("SMARTHOME_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let addr: SocketAddr = bind.parse()?;

    let runtime = AdapterRuntime::default_from_env()?;
    let (scheduler, mut events) = runtime.control().spawn_scheduler();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SchedulerEvent::OtpRefreshed { sequence, .. } => {
                    info!(sequence, "otp refreshed");
                }
                SchedulerEvent::ClockTick { at, .. } => {
                    debug!(at = %at.format("%H:%M:%S"), "clock tick");
                }
            }
        }
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/otp", get(current_otp))
        .route("/v1/nodes", get(list_nodes))
        .route("/v1/nodes/health", post(check_nodes))
        .route("/v1/door/open", post(open_door))
        .with_state(runtime);

    info!(%addr, "smarthome_adapter_http listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    scheduler.shutdown();
    info!("smarthome_adapter_http stopped");
    Ok(())
}

async fn healthz(State(runtime): State<AdapterRuntime>) -> Json<AdapterHealthResponse> {
    Json(runtime.health_report())
}

async fn current_otp(State(runtime): State<AdapterRuntime>) -> Json<OtpResponse> {
    Json(runtime.current_otp())
}

async fn list_nodes(State(runtime): State<AdapterRuntime>) -> Json<NodesListResponse> {
    Json(runtime.list_nodes())
}

async fn open_door(
    State(runtime): State<AdapterRuntime>,
) -> (StatusCode, Json<DoorOpenResponse>) {
    let result = tokio::task::spawn_blocking(move || runtime.open_door())
        .await
        .unwrap_or_else(|err| Err(join_failure(err)));
    match result {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(failure) => (
            failure_status(&failure),
            Json(door_open_error_response(&failure)),
        ),
    }
}

async fn check_nodes(
    State(runtime): State<AdapterRuntime>,
) -> (StatusCode, Json<NodesHealthResponse>) {
    let result = tokio::task::spawn_blocking(move || runtime.check_nodes())
        .await
        .unwrap_or_else(|err| Err(join_failure(err)));
    match result {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(failure) => (
            failure_status(&failure),
            Json(nodes_health_error_response(&failure)),
        ),
    }
}

fn failure_status(failure: &AdapterFailure) -> StatusCode {
    match failure.kind {
        AdapterFailureKind::Busy => StatusCode::CONFLICT,
        AdapterFailureKind::DoorUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        AdapterFailureKind::Rejected => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn join_failure(err: tokio::task::JoinError) -> AdapterFailure {
    AdapterFailure {
        kind: AdapterFailureKind::Rejected,
        reason: format!("node action task failed: {err}"),
    }
}
