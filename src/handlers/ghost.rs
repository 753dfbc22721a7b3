// CLASSIFICATION: COMMUNITY
// Filename: ghost.rs v0.7
// Author: Lukas Bower
// Date Modified: 2026-07-22

//! GHOST protocol handlers: registry queries, lifecycle operations,
//! and the inter-tape route entry point.

use super::{str_field, CallContext};
use crate::error::{ErrorKind, HostResult};
use crate::host::Host;
use crate::proxy::{self, ProxyRequest};
use serde_json::{json, Value};

pub fn list(host: &Host, _input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let tapes: Vec<Value> = host.registry.list().iter().map(|view| view.to_json()).collect();
    Ok(json!({
        "total": tapes.len(),
        "tapes": tapes,
    }))
}

pub fn get(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let id = str_field(input, "id")?;
    match host.registry.get(id) {
        Some(view) => Ok(view.to_json()),
        None => Err(crate::host_err!(ErrorKind::TapeNotFound, "no tape {id}")),
    }
}

/// Mount a tape and hand back what a client needs to open it.
pub fn launch(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let id = str_field(input, "id")?;
    let view = host
        .registry
        .mount(id, &|name| host.handlers.contains(name))?;
    Ok(json!({
        "id": view.descriptor.id,
        "name": view.descriptor.name,
        "entry": view.descriptor.entry,
        "ui": format!("/tapes/{}/{}", view.descriptor.id, view.descriptor.entry),
        "status": view.state.as_str(),
        "generation": view.generation,
    }))
}

/// Forward a request to a tape's API through the proxy.
pub fn route(host: &Host, input: &Value, ctx: &mut CallContext) -> HostResult<Value> {
    let tape = str_field(input, "tape")?;
    let request = ProxyRequest::from_input(input);
    proxy::call(host, tape, &request, ctx)
}

/// Rescan the tape root.
pub fn discover(host: &Host, _input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let report = host.scan_tapes()?;
    let failures: Vec<Value> = report
        .failures
        .iter()
        .map(|failure| {
            json!({
                "directory": failure.directory,
                "error": failure.kind.as_str(),
                "message": failure.message,
            })
        })
        .collect();
    let (total, mounted) = host.registry.counts();
    Ok(json!({
        "discovered": report.discovered,
        "removed": report.removed,
        "failures": failures,
        "total": total,
        "mounted": mounted,
    }))
}

/// Swarm topology as the registry sees it.
pub fn swarm(host: &Host, _input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let mut agents: Vec<Value> = host
        .config
        .swarm
        .agents
        .iter()
        .map(|(id, agent)| {
            json!({
                "id": id,
                "url": agent.url,
                "skills": agent.skills,
                "priority": agent.priority,
                "status": agent.status,
            })
        })
        .collect();
    agents.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));
    Ok(json!({
        "agents": agents,
        "router": {
            "strategy": host.config.swarm.router.strategy,
            "fallback": host.config.swarm.router.fallback,
            "timeout_ms": host.config.swarm.router.timeout_ms,
            "retry": host.config.swarm.router.retry,
        },
    }))
}

pub fn status(host: &Host, _input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let (total, mounted) = host.registry.counts();
    Ok(json!({
        "host": host.config.bind_addr(),
        "uptime_secs": host.uptime_secs(),
        "tapes": {"total": total, "mounted": mounted},
        "handlers": host.handlers.len(),
        "backends": host.router.backend_names(),
        "external": host.config.services.keys().collect::<Vec<_>>(),
    }))
}
