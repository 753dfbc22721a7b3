// CLASSIFICATION: COMMUNITY
// Filename: http.rs v0.9
// Author: Lukas Bower
// Date Modified: 2026-07-31

//! HTTP surface.
//!
//! One envelope route (`POST /run`) plus the fixed protocol routes.
//! Handler execution is synchronous behind `spawn_blocking`; the
//! single failure-to-envelope conversion lives in `Host::run_envelope`.
//! CORS is permissive and explicitly not a security boundary.

use crate::error::{ErrorKind, HostError};
use crate::host::Host;
use crate::proxy::{self, ProxyRequest};
use crate::util::build_agent;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{info, warn};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Deadline for externally proxied service calls.
const EXTERNAL_DEADLINE: Duration = Duration::from_secs(30);

/// Build the full route table over a shared host.
pub fn app(host: Arc<Host>) -> Router {
    Router::new()
        .route("/run", post(run_envelope))
        .route("/health", get(health))
        .route("/tapes", get(tapes_list))
        .route("/tapes/:id", get(tapes_get))
        .route("/tapes/:id/mount", post(tapes_mount))
        .route("/tapes/:id/unmount", post(tapes_unmount))
        .route("/tapes/:id/reload", post(tapes_reload))
        .route("/proxy/:id", post(proxy_tape))
        .route("/proxy-external/:service", post(proxy_external))
        .route("/swarm/route", post(swarm_route))
        .route("/metrics", get(metrics))
        .layer(axum::middleware::from_fn(cors))
        .with_state(host)
}

/// Serve until `shutdown` fires, then drain inflight requests up to
/// `drain`. Returns once drained or forced.
pub async fn serve(
    host: Arc<Host>,
    listener: TcpListener,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    drain: Duration,
) -> std::io::Result<()> {
    let app = app(host);
    let (notify_tx, mut notify_rx) = tokio::sync::watch::channel(false);
    let graceful = std::future::IntoFuture::into_future(axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            let _ = notify_tx.send(true);
        }));
    tokio::pin!(graceful);
    tokio::select! {
        result = &mut graceful => result,
        _ = async {
            let _ = notify_rx.wait_for(|fired| *fired).await;
            tokio::time::sleep(drain).await;
        } => {
            warn!("drain deadline elapsed with requests still inflight; forcing shutdown");
            Ok(())
        }
    }
}

async fn cors(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    if req.method() == Method::OPTIONS {
        return with_cors_headers(StatusCode::NO_CONTENT.into_response());
    }
    with_cors_headers(next.run(req).await)
}

fn with_cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
    response
}

async fn run_envelope(State(host): State<Arc<Host>>, body: String) -> impl IntoResponse {
    let reply = tokio::task::spawn_blocking(move || host.run_envelope(&body))
        .await
        .unwrap_or_else(|err| {
            json!({
                "ok": false,
                "error": ErrorKind::BackendError.as_str(),
                "message": format!("handler task failed: {err}"),
                "backend": crate::router::LOCAL_BACKEND,
            })
        });
    Json(reply)
}

async fn health(State(host): State<Arc<Host>>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "handlers": host.handlers.names(),
        "uptime_secs": host.uptime_secs(),
    }))
}

async fn tapes_list(State(host): State<Arc<Host>>) -> impl IntoResponse {
    let tapes: Vec<Value> = host.registry.list().iter().map(|v| v.to_json()).collect();
    Json(json!({"total": tapes.len(), "tapes": tapes}))
}

async fn tapes_get(State(host): State<Arc<Host>>, Path(id): Path<String>) -> Response {
    match host.registry.get(&id) {
        Some(view) => Json(view.to_json()).into_response(),
        None => failure(crate::host_err!(ErrorKind::TapeNotFound, "no tape {id}")),
    }
}

async fn tapes_mount(State(host): State<Arc<Host>>, Path(id): Path<String>) -> Response {
    lifecycle(host, id, |host, id| {
        host.registry.mount(id, &|name| host.handlers.contains(name))
    })
    .await
}

async fn tapes_unmount(State(host): State<Arc<Host>>, Path(id): Path<String>) -> Response {
    lifecycle(host, id, |host, id| host.registry.unmount(id)).await
}

async fn tapes_reload(State(host): State<Arc<Host>>, Path(id): Path<String>) -> Response {
    lifecycle(host, id, |host, id| {
        host.registry.reload(id, &|name| host.handlers.contains(name))
    })
    .await
}

async fn lifecycle<F>(host: Arc<Host>, id: String, op: F) -> Response
where
    F: FnOnce(&Host, &str) -> crate::error::HostResult<crate::tape::TapeView> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || op(&host, &id).map(|view| view.to_json()))
        .await
        .unwrap_or_else(|err| {
            Err(crate::host_err!(
                ErrorKind::BackendError,
                "lifecycle task failed: {err}"
            ))
        });
    match result {
        Ok(view) => Json(json!({"ok": true, "tape": view})).into_response(),
        Err(err) => failure(err),
    }
}

async fn proxy_tape(
    State(host): State<Arc<Host>>,
    Path(id): Path<String>,
    body: String,
) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        let input: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let request = ProxyRequest::from_input(&input);
        let mut ctx = crate::handlers::CallContext::from_envelope(input.get("context").cloned());
        proxy::call(&host, &id, &request, &mut ctx)
    })
    .await
    .unwrap_or_else(|err| {
        Err(crate::host_err!(
            ErrorKind::BackendError,
            "proxy task failed: {err}"
        ))
    });
    match result {
        Ok(reply) => Json(json!({"ok": true, "result": reply})).into_response(),
        Err(err) => failure(err),
    }
}

/// Route to a named external service from the host config. Analogous
/// to the inter-tape proxy, but the target set is fixed at boot.
async fn proxy_external(
    State(host): State<Arc<Host>>,
    Path(service): Path<String>,
    body: String,
) -> Response {
    let Some(url) = host.config.services.get(&service).cloned() else {
        return failure(crate::host_err!(
            ErrorKind::BadRequest,
            "no external service named {service}"
        ));
    };
    info!("proxy-external {service} -> {url}");
    let result = tokio::task::spawn_blocking(move || -> crate::error::HostResult<Value> {
        let agent = build_agent(EXTERNAL_DEADLINE);
        let response = agent
            .post(&url)
            .content_type("application/json")
            .send(body)
            .map_err(|err| {
                crate::host_err!(ErrorKind::BackendError, "service {service} failed: {err}")
            })?;
        let text = response.into_body().read_to_string().map_err(|err| {
            crate::host_err!(
                ErrorKind::BackendError,
                "service {service} body unreadable: {err}"
            )
        })?;
        Ok(serde_json::from_str::<Value>(&text).unwrap_or_else(|_| json!({"raw": text})))
    })
    .await
    .unwrap_or_else(|err| {
        Err(crate::host_err!(
            ErrorKind::BackendError,
            "external proxy task failed: {err}"
        ))
    });
    match result {
        Ok(reply) => Json(json!({"ok": true, "result": reply})).into_response(),
        Err(err) => failure(err),
    }
}

async fn swarm_route(State(host): State<Arc<Host>>, body: String) -> Response {
    let input: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let Some(task) = input.get("task").and_then(Value::as_str) else {
        return failure(crate::host_err!(
            ErrorKind::BadRequest,
            "swarm route requires a task string"
        ));
    };
    match host.route_task(task) {
        Ok((id, agent)) => Json(json!({
            "ok": true,
            "task": task,
            "agent": id,
            "url": agent.url,
            "skills": agent.skills,
            "strategy": host.config.swarm.router.strategy,
        }))
        .into_response(),
        Err(err) => failure(err),
    }
}

async fn metrics(State(host): State<Arc<Host>>) -> impl IntoResponse {
    let (total, mounted) = host.registry.counts();
    Json(json!({
        "ok": true,
        "uptime_secs": host.uptime_secs(),
        "requests": {
            "served": host.metrics.served.load(Ordering::Relaxed),
            "failed": host.metrics.failed.load(Ordering::Relaxed),
        },
        "tapes": {"total": total, "mounted": mounted},
        "scheduler": host.scheduler.metrics(),
        "tribunal": {
            "stats": host.tribunal.stats(),
            "disagreements": host.tribunal.analysis(),
        },
        "backends": host.router.backend_names(),
    }))
}

/// Convert a host error into a protocol-route response. Envelope
/// routes never come here; they embed failures in the reply envelope.
fn failure(err: HostError) -> Response {
    let status = match err.kind {
        ErrorKind::TapeNotFound | ErrorKind::PathNotFound => StatusCode::NOT_FOUND,
        ErrorKind::TapeBusy => StatusCode::CONFLICT,
        ErrorKind::TapePermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let mut body = json!({
        "ok": false,
        "error": err.kind.as_str(),
        "message": err.message,
    });
    if let Some(context) = err.context {
        body["context"] = context;
    }
    (status, Json(body)).into_response()
}
