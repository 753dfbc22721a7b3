// CLASSIFICATION: COMMUNITY
// Filename: kuhul.rs v0.7
// Author: Lukas Bower
// Date Modified: 2026-07-29

//! Kuhul handlers: device profile management, scheduling, and the
//! glyph VM entry point.

use super::{f64_field_or, opt_str_field, str_field, CallContext};
use crate::error::{ErrorKind, HostResult};
use crate::glyph::{execute_extended, Value as GlyphValue};
use crate::host::Host;
use crate::host_bail;
use crate::scheduler::{Decision, Job, JobHints};
use crate::util::{build_agent, correlation_id};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

fn job_from(input: &Value) -> HostResult<Job> {
    let shard = str_field(input, "shard")?;
    let hints: JobHints = input
        .get("hints")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| crate::host_err!(ErrorKind::BadRequest, "malformed hints: {e}"))?
        .unwrap_or_default();
    Ok(Job {
        fingerprint: opt_str_field(input, "fingerprint")
            .map(str::to_string)
            .unwrap_or_else(correlation_id),
        shard: shard.to_string(),
        priority: f64_field_or(input, "priority", 0.5).clamp(0.0, 1.0),
        hints,
    })
}

/// Inspect or update the device profile and observed load.
pub fn profile(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let action = opt_str_field(input, "action").unwrap_or("get");
    match action {
        "set" => {
            host.scheduler.set_observed(
                input.get("cpu_load").and_then(Value::as_f64),
                input.get("gpu_load").and_then(Value::as_f64),
            );
        }
        "get" => {}
        other => host_bail!(ErrorKind::BadRequest, "unknown profile action {other}"),
    }
    let (cpu, gpu) = host.scheduler.observed();
    Ok(json!({
        "profile": host.scheduler.profile(),
        "observed": {"cpu_load": cpu, "gpu_load": gpu},
    }))
}

/// One routing decision, no execution.
pub fn route(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let job = job_from(input)?;
    let decision = host
        .scheduler
        .route(&job, opt_str_field(input, "policy"))?;
    Ok(json!({
        "fingerprint": job.fingerprint,
        "decision": decision,
    }))
}

/// Full scheduling pass with execution, retries, and fallback.
pub fn schedule(host: &Host, input: &Value, ctx: &mut CallContext) -> HostResult<Value> {
    let job = job_from(input)?;
    let policy = opt_str_field(input, "policy").map(str::to_string);
    let payload = input.get("payload").cloned().unwrap_or(Value::Null);
    let deadline = ctx.deadline;
    let exec = move |job: &Job, decision: &Decision| -> HostResult<Value> {
        run_engine(host, job, decision, &payload)
    };
    host.scheduler.run(job, policy.as_deref(), deadline, &exec)
}

/// Execute a decision: remote engines over HTTP, local engines through
/// the in-process brain.
fn run_engine(host: &Host, job: &Job, decision: &Decision, payload: &Value) -> HostResult<Value> {
    match &decision.endpoint {
        Some(endpoint) => {
            let agent = build_agent(Duration::from_secs(30));
            let body = json!({
                "fingerprint": job.fingerprint,
                "engine": decision.engine,
                "args": decision.args,
                "hints": job.hints,
                "payload": payload,
            });
            let response = agent
                .post(endpoint)
                .content_type("application/json")
                .send(body.to_string())
                .map_err(|err| {
                    crate::host_err!(ErrorKind::EngineError, "engine endpoint failed: {err}")
                })?;
            let text = response.into_body().read_to_string().map_err(|err| {
                crate::host_err!(ErrorKind::EngineError, "engine body unreadable: {err}")
            })?;
            Ok(serde_json::from_str::<Value>(&text).unwrap_or_else(|_| json!({"raw": text})))
        }
        None => {
            let output = payload
                .get("prompt")
                .and_then(Value::as_str)
                .and_then(|prompt| {
                    host.brain
                        .complete(prompt, job.hints.max_tokens.map(|n| n as usize))
                });
            Ok(json!({
                "status": "completed",
                "output": output,
            }))
        }
    }
}

pub fn status(host: &Host, _input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let (cpu, gpu) = host.scheduler.observed();
    Ok(json!({
        "metrics": host.scheduler.metrics(),
        "shards": host.scheduler.shard_names(),
        "policies": host.scheduler.policy_names(),
        "profile": host.scheduler.profile(),
        "observed": {"cpu_load": cpu, "gpu_load": gpu},
    }))
}

/// Run glyph programs on the shared VM: a token stream, a structured
/// step list, or a recorded function by name. `reset` clears stack and
/// variables first (recorded functions survive).
pub fn glyph(host: &Host, input: &Value, ctx: &mut CallContext) -> HostResult<Value> {
    let mut vm = host.glyph.lock().unwrap_or_else(|p| p.into_inner());
    if input.get("reset").and_then(Value::as_bool).unwrap_or(false) {
        vm.reset();
    }
    let value = if let Some(program) = opt_str_field(input, "program") {
        vm.execute(program)?
    } else if let Some(steps) = input.get("steps") {
        let mut scope: HashMap<String, GlyphValue> = HashMap::new();
        if let Some(map) = ctx.context.as_object() {
            for (key, value) in map {
                if let Ok(scalar) = GlyphValue::from_json(value) {
                    scope.insert(key.clone(), scalar);
                }
            }
        }
        execute_extended(&mut vm, steps, &mut scope)?
    } else if let Some(function) = opt_str_field(input, "function") {
        vm.run_function(function)?
    } else if input.get("reset").and_then(Value::as_bool).unwrap_or(false) {
        None
    } else {
        host_bail!(
            ErrorKind::BadRequest,
            "kuhul_glyph requires program, steps, or function"
        );
    };
    Ok(json!({
        "value": value.map(|v| v.to_json()),
        "stack_depth": vm.stack_depth(),
        "functions": vm.function_names(),
    }))
}
