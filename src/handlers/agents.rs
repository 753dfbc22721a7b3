// CLASSIFICATION: COMMUNITY
// Filename: agents.rs v0.6
// Author: Lukas Bower
// Date Modified: 2026-07-23

//! Agent handlers: swarm listings, single-agent calls, keyword
//! routing, and the tribunal entry point.

use super::{opt_str_field, str_field, u64_field, CallContext};
use crate::error::{ErrorKind, HostResult};
use crate::host::Host;
use crate::host_bail;
use crate::tribunal::TribunalTask;
use crate::util::build_agent;
use serde_json::{json, Value};
use std::time::Duration;

pub fn list(host: &Host, _input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
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
    Ok(json!({"total": agents.len(), "agents": agents}))
}

/// Dispatch one payload to one agent endpoint.
pub fn call(host: &Host, input: &Value, ctx: &mut CallContext) -> HostResult<Value> {
    let id = str_field(input, "agent")?;
    let agent_entry = host.config.swarm.agents.get(id).ok_or_else(|| {
        crate::host_err!(ErrorKind::BadRequest, "no agent {id} in the swarm")
    })?;
    if agent_entry.status == "offline" {
        host_bail!(ErrorKind::BackendError, "agent {id} is offline");
    }
    let Some(url) = agent_entry.url.as_deref() else {
        host_bail!(ErrorKind::BackendError, "agent {id} has no endpoint");
    };
    let payload = input.get("payload").cloned().unwrap_or_else(|| {
        json!({"task": opt_str_field(input, "task")})
    });
    let timeout =
        ctx.bounded_timeout(Duration::from_millis(host.config.swarm.router.timeout_ms));
    let agent = build_agent(timeout);
    let response = agent
        .post(url)
        .content_type("application/json")
        .send(payload.to_string())
        .map_err(|err| {
            crate::host_err!(ErrorKind::BackendError, "agent {id} failed: {err}")
        })?;
    let text = response.into_body().read_to_string().map_err(|err| {
        crate::host_err!(ErrorKind::BackendError, "agent {id} body unreadable: {err}")
    })?;
    let reply = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| json!({"raw": text}));
    Ok(json!({"agent": id, "reply": reply}))
}

/// Convene a tribunal over the configured judges.
pub fn tribunal(host: &Host, input: &Value, ctx: &mut CallContext) -> HostResult<Value> {
    let content = str_field(input, "content")?;
    let task = TribunalTask {
        task_type: opt_str_field(input, "task_type")
            .unwrap_or("code-review")
            .to_string(),
        content: content.to_string(),
        context: input.get("context").cloned(),
    };
    let ids: Option<Vec<String>> = input.get("judges").and_then(Value::as_array).map(|list| {
        list.iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    });
    let judges = host.judges(ids.as_deref());
    let policy_ms = u64_field(input, "timeout_ms")
        .unwrap_or(host.config.swarm.router.timeout_ms);
    let timeout = ctx.bounded_timeout(Duration::from_millis(policy_ms));
    let session = host.tribunal.evaluate(&task, &judges, timeout)?;
    serde_json::to_value(&session)
        .map_err(|e| crate::host_err!(ErrorKind::BackendError, "session not encodable: {e}"))
}

/// Keyword routing over the swarm, decision only.
pub fn swarm(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let task = str_field(input, "task")?;
    let (id, agent) = host.route_task(task)?;
    Ok(json!({
        "task": task,
        "agent": id,
        "url": agent.url,
        "skills": agent.skills,
        "status": agent.status,
        "strategy": host.config.swarm.router.strategy,
    }))
}
