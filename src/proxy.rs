// CLASSIFICATION: COMMUNITY
// Filename: proxy.rs v0.7
// Author: Lukas Bower
// Date Modified: 2026-07-25

//! Inter-tape proxy.
//!
//! A request addressed to a tape is forwarded to the tape's declared
//! API endpoint: a local handler through the backend router, or a
//! remote URL over HTTP. Declared permissions gate delivery, a hop
//! counter bounds proxy chains, and the registry's inflight counter is
//! held for the duration of the forwarded call.

use crate::error::{ErrorKind, HostResult};
use crate::handlers::CallContext;
use crate::host::Host;
use crate::host_bail;
use crate::router;
use crate::tape::manifest::{ApiEndpoint, NetworkPermission};
use crate::util::build_agent;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Default deadline for forwarded HTTP calls.
const REMOTE_DEADLINE: Duration = Duration::from_secs(30);

/// A request to forward to a tape.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub path: String,
    pub method: String,
    pub payload: Value,
}

impl ProxyRequest {
    /// Parse the proxy body `{path?, method?, payload?}`.
    pub fn from_input(input: &Value) -> Self {
        Self {
            path: input
                .get("path")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            method: input
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or("POST")
                .to_ascii_uppercase(),
            payload: input.get("payload").cloned().unwrap_or(Value::Null),
        }
    }
}

/// Forward a request to a tape's declared API endpoint.
pub fn call(
    host: &Host,
    tape_id: &str,
    request: &ProxyRequest,
    ctx: &mut CallContext,
) -> HostResult<Value> {
    if ctx.hops == 0 {
        host_bail!(
            ErrorKind::HopLimitExceeded,
            "proxy chain exhausted its hop budget at tape {tape_id}"
        );
    }
    ctx.hops -= 1;

    let view = host
        .registry
        .get(tape_id)
        .ok_or_else(|| crate::host_err!(ErrorKind::TapeNotFound, "no tape {tape_id}"))?;

    match view.descriptor.permissions.network {
        NetworkPermission::None => host_bail!(
            ErrorKind::TapePermissionDenied,
            "tape {tape_id} declares network: none"
        ),
        NetworkPermission::Loopback => {
            if let Some(ApiEndpoint::RemoteHttp(url)) = &view.descriptor.api {
                if !is_loopback(url) {
                    host_bail!(
                        ErrorKind::TapePermissionDenied,
                        "tape {tape_id} is loopback-only but declares {url}"
                    );
                }
            }
        }
        NetworkPermission::Any => {}
    }

    let endpoint = view.descriptor.api.clone().ok_or_else(|| {
        crate::host_err!(ErrorKind::BadRequest, "tape {tape_id} declares no api")
    })?;

    let _guard = host.registry.begin_request(tape_id)?;
    match endpoint {
        ApiEndpoint::LocalHandler(name) => {
            let mut input = match &request.payload {
                Value::Object(map) => map.clone(),
                Value::Null => Map::new(),
                other => {
                    let mut map = Map::new();
                    map.insert("payload".into(), other.clone());
                    map
                }
            };
            input.insert("path".into(), json!(request.path));
            input.insert("method".into(), json!(request.method));
            let routed = router::call(host, &name, &Value::Object(input), ctx);
            routed.outcome
        }
        ApiEndpoint::RemoteHttp(url) => forward_http(&url, request, ctx),
    }
}

fn forward_http(base: &str, request: &ProxyRequest, ctx: &CallContext) -> HostResult<Value> {
    let url = join_url(base, &request.path);
    let timeout = ctx.bounded_timeout(REMOTE_DEADLINE);
    let agent = build_agent(timeout);
    let body = request.payload.to_string();
    let response = match request.method.as_str() {
        "GET" => agent.get(&url).call(),
        "DELETE" => agent.delete(&url).call(),
        "PUT" => agent
            .put(&url)
            .content_type("application/json")
            .send(body),
        _ => agent
            .post(&url)
            .content_type("application/json")
            .send(body),
    };
    let response = response.map_err(|err| {
        crate::host_err!(ErrorKind::BackendError, "tape endpoint {url} failed: {err}")
    })?;
    let text = response.into_body().read_to_string().map_err(|err| {
        crate::host_err!(
            ErrorKind::BackendError,
            "tape endpoint {url} returned an unreadable body: {err}"
        )
    })?;
    match serde_json::from_str::<Value>(&text) {
        Ok(parsed) => Ok(parsed),
        Err(_) => Ok(json!({ "raw": text })),
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn is_loopback(url: &str) -> bool {
    let after_scheme = url.splitn(2, "://").nth(1).unwrap_or(url);
    let authority = after_scheme.split('/').next().unwrap_or("");
    let host = authority.rsplit_once(':').map(|(h, _)| h).unwrap_or(authority);
    matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1")
}
