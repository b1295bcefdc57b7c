//! The HTTP surface (§6): warp routes for webhook ingestion, alert/job
//! queries, the SSE event stream, health/readiness, and `/metrics` — built
//! with `warp::Filter` combinators the same way the webhook and metrics
//! servers are built elsewhere in this codebase, generalized from a single
//! route each into the full surface named here.

use std::convert::Infallible;
use std::sync::Arc;

use event_broker::EventBroker;
use futures::StreamExt as _;
use kube::ResourceExt;
use openfero_core::{Event, HookMessage};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use warp::http::StatusCode;
use warp::{Filter, Reply};

use crate::dispatcher::intake;
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub limit: usize,
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

#[instrument(skip(state, msg))]
async fn post_alerts(msg: HookMessage, state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    if !msg.is_supported_version() {
        warn!(version = %msg.version, "rejecting hook message with unsupported version");
        return Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({"error": "unsupported version"})),
            StatusCode::BAD_REQUEST,
        ));
    }

    match intake::accept(&state, msg).await {
        Ok(()) => Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({"status": "accepted"})),
            StatusCode::OK,
        )),
        Err(e) => {
            warn!(error = %e, "failed to accept hook message");
            metrics::DISPATCHER_ERRORS_TOTAL.inc();
            Ok(warp::reply::with_status(
                warp::reply::json(&serde_json::json!({"error": e.to_string()})),
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}

async fn get_alerts(query: AlertQuery, state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    let entries = state.store.get_alerts(&query.q, query.limit).await;
    Ok(warp::reply::json(&entries))
}

async fn get_jobs(state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    let descriptors = state.descriptor_cache.list();
    let view: Vec<_> = descriptors
        .iter()
        .map(|d| {
            serde_json::json!({
                "descriptor": d.name_any(),
                "alertname": d.spec.alert_selector.alertname,
                "status": d.spec.alert_selector.status,
                "enabled": d.spec.enabled,
                "priority": d.spec.priority,
                "executionCount": d.status.as_ref().map(|s| s.execution_count).unwrap_or(0),
                "lastExecutionTime": d.status.as_ref().and_then(|s| s.last_execution_time),
                "lastExecutedJobName": d.status.as_ref().and_then(|s| s.last_executed_job_name.clone()),
                "conditions": d.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default(),
            })
        })
        .collect();
    Ok(warp::reply::json(&view))
}

async fn get_events(state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    let greeting = tokio_stream::once(Event::Connected {
        message: "connected".to_string(),
    });
    let stream = greeting.chain(state.broker.subscribe()).map(|event| {
        let name = event.type_name();
        Ok::<_, Infallible>(warp::sse::Event::default().event(name).json_data(&event).unwrap_or_else(|_| {
            warp::sse::Event::default().event(name).data("null")
        }))
    });
    Ok(warp::sse::reply(warp::sse::keep_alive().stream(stream)))
}

async fn healthz() -> Result<impl Reply, Infallible> {
    Ok(StatusCode::OK)
}

async fn readiness(state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    if state.is_ready() {
        Ok(StatusCode::OK)
    } else {
        Ok(StatusCode::SERVICE_UNAVAILABLE)
    }
}

async fn metrics_handler(registry: Arc<Registry>, broker: EventBroker) -> Result<impl Reply, Infallible> {
    metrics::sync_broker_dropped(broker.dropped_count());
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        warn!(error = %e, "failed to encode metrics");
    }
    let body = String::from_utf8(buffer).unwrap_or_default();
    Ok(warp::reply::with_header(body, "Content-Type", encoder.format_type()))
}

/// Builds the combined webhook/API/SSE/health route set (§6). `/metrics` is
/// served from the same process on a separate port via `run_metrics_server`,
/// kept independent of the main route table so it stays reachable even if
/// the primary server's dependencies are unhealthy.
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let alerts_post = warp::post()
        .and(warp::path!("api" / "alerts"))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(post_alerts);

    let alerts_get = warp::get()
        .and(warp::path!("api" / "alerts"))
        .and(warp::query::<AlertQuery>())
        .and(with_state(state.clone()))
        .and_then(get_alerts);

    let jobs_get = warp::get()
        .and(warp::path!("api" / "jobs"))
        .and(with_state(state.clone()))
        .and_then(get_jobs);

    let events_get = warp::get()
        .and(warp::path!("api" / "events"))
        .and(with_state(state.clone()))
        .and_then(get_events);

    let health = warp::get().and(warp::path("healthz")).and_then(healthz);

    let ready = warp::get()
        .and(warp::path("readiness"))
        .and(with_state(state))
        .and_then(readiness);

    alerts_post
        .or(alerts_get)
        .or(jobs_get)
        .or(events_get)
        .or(health)
        .or(ready)
}

pub async fn run_http_server(state: Arc<AppState>, port: u16) {
    info!(port, "starting openfero HTTP server");
    warp::serve(routes(state)).run(([0, 0, 0, 0], port)).await;
}

pub async fn run_metrics_server(registry: Arc<Registry>, broker: EventBroker, port: u16) {
    let route = warp::path("metrics")
        .and(warp::get())
        .and(warp::any().map(move || registry.clone()))
        .and(warp::any().map(move || broker.clone()))
        .and_then(metrics_handler);

    info!(port, "starting openfero metrics server");
    warp::serve(route).run(([0, 0, 0, 0], port)).await;
}
