// CLASSIFICATION: COMMUNITY
// Filename: router.rs v0.8
// Author: Lukas Bower
// Date Modified: 2026-07-24

//! Backend router.
//!
//! Remote handler servers are tried in descending priority with a
//! per-backend deadline; any transport failure, timeout, or non-2xx
//! moves on to the next. The in-process handler set terminates the
//! chain and never reports connection failure, so `backend-unreachable`
//! cannot happen at the envelope boundary. A short negative cache stops
//! a dead backend from being probed on every call, and expires within
//! a second.

use crate::config::BackendDecl;
use crate::error::{ErrorKind, HostResult};
use crate::handlers::{self, CallContext};
use crate::host::Host;
use crate::util::build_agent;
use log::warn;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Negative-cache lifetime for a failed backend probe.
const COOLDOWN: Duration = Duration::from_millis(1_000);

/// Name and priority of the always-available local terminator.
pub const LOCAL_BACKEND: &str = "local";
const LOCAL_PRIORITY: i64 = 1;

#[derive(Debug, Clone)]
enum BackendKind {
    Remote { url: String, timeout: Duration },
    Local,
}

#[derive(Debug, Clone)]
struct Backend {
    name: String,
    kind: BackendKind,
    priority: i64,
}

/// Outcome of one routed call: which backend served it, and what it
/// said. Handler-level errors from the serving backend pass through
/// verbatim; the router never retries them.
pub struct Routed {
    pub backend: String,
    pub outcome: HostResult<Value>,
}

/// Priority-ordered backend list plus the probe cooldown map.
pub struct BackendRouter {
    backends: Vec<Backend>,
    cooldown: Mutex<HashMap<String, Instant>>,
}

impl BackendRouter {
    pub fn new(decls: &[BackendDecl]) -> Self {
        let mut backends: Vec<Backend> = decls
            .iter()
            .map(|decl| Backend {
                name: decl.name.clone(),
                kind: BackendKind::Remote {
                    url: decl.url.clone(),
                    timeout: Duration::from_millis(decl.timeout_ms),
                },
                priority: decl.priority,
            })
            .collect();
        backends.push(Backend {
            name: LOCAL_BACKEND.into(),
            kind: BackendKind::Local,
            priority: LOCAL_PRIORITY,
        });
        backends.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            backends,
            cooldown: Mutex::new(HashMap::new()),
        }
    }

    /// Configured backend names, highest priority first.
    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name.clone()).collect()
    }

    fn cooling(&self, name: &str) -> bool {
        let cooldown = self.cooldown.lock().unwrap_or_else(|p| p.into_inner());
        cooldown
            .get(name)
            .map(|until| Instant::now() < *until)
            .unwrap_or(false)
    }

    fn chill(&self, name: &str) {
        let mut cooldown = self.cooldown.lock().unwrap_or_else(|p| p.into_inner());
        cooldown.insert(name.to_string(), Instant::now() + COOLDOWN);
    }
}

/// Route one handler call through the backend chain.
pub fn call(host: &Host, name: &str, input: &Value, ctx: &mut CallContext) -> Routed {
    for backend in &host.router.backends {
        match &backend.kind {
            BackendKind::Local => {
                return Routed {
                    backend: backend.name.clone(),
                    outcome: handlers::dispatch(host, name, input, ctx),
                };
            }
            BackendKind::Remote { url, timeout } => {
                if host.router.cooling(&backend.name) {
                    continue;
                }
                match call_remote(url, *timeout, name, input, ctx) {
                    Ok(outcome) => {
                        return Routed {
                            backend: backend.name.clone(),
                            outcome,
                        };
                    }
                    Err(probe_error) => {
                        warn!(
                            "backend {} failed for {name}: {probe_error}; trying next",
                            backend.name
                        );
                        host.router.chill(&backend.name);
                    }
                }
            }
        }
    }
    // Unreachable: the local terminator always answers.
    Routed {
        backend: LOCAL_BACKEND.into(),
        outcome: Err(crate::host_err!(
            ErrorKind::BackendError,
            "no backend accepted the call"
        )),
    }
}

/// One remote probe. `Err(String)` is a transport-level failure that
/// moves on to the next backend; `Ok(HostResult)` is a definitive
/// answer from this backend, success or handler-level error.
fn call_remote(
    url: &str,
    timeout: Duration,
    name: &str,
    input: &Value,
    ctx: &CallContext,
) -> Result<HostResult<Value>, String> {
    let timeout = ctx.bounded_timeout(timeout);
    let envelope = json!({
        "program": {"type": name, "input": input},
        "context": ctx.context,
    });
    let agent = build_agent(timeout);
    let response = agent
        .post(url)
        .content_type("application/json")
        .send(envelope.to_string())
        .map_err(|err| err.to_string())?;
    let text = response
        .into_body()
        .read_to_string()
        .map_err(|err| format!("unreadable body: {err}"))?;
    let reply: Value =
        serde_json::from_str(&text).map_err(|err| format!("malformed reply: {err}"))?;
    let ok = reply
        .get("ok")
        .and_then(Value::as_bool)
        .ok_or_else(|| "reply missing ok flag".to_string())?;
    if ok {
        Ok(Ok(reply.get("result").cloned().unwrap_or(Value::Null)))
    } else {
        let kind = reply
            .get("error")
            .and_then(Value::as_str)
            .map(ErrorKind::parse)
            .unwrap_or(ErrorKind::BackendError);
        let message = reply
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("backend reported failure")
            .to_string();
        Ok(Err(crate::host_err!(kind, "{message}")))
    }
}
