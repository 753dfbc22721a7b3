// CLASSIFICATION: COMMUNITY
// Filename: micronaut.rs v0.5
// Author: Lukas Bower
// Date Modified: 2026-07-21

//! Micronaut handlers over the in-process brain. A missing model is a
//! marker result, never a failure.

use super::{opt_str_field, str_field, u64_field, CallContext};
use crate::error::{ErrorKind, HostResult};
use crate::host::Host;
use crate::micronaut::Micronaut;
use serde_json::{json, Value};

pub fn infer(host: &Host, input: &Value, ctx: &mut CallContext) -> HostResult<Value> {
    match opt_str_field(input, "mode") {
        Some("intent") => intent(host, input, ctx),
        Some("chat") => chat(host, input, ctx),
        _ => complete(host, input, ctx),
    }
}

pub fn intent(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let text = opt_str_field(input, "text")
        .or_else(|| opt_str_field(input, "prompt"))
        .ok_or_else(|| {
            crate::host_err!(ErrorKind::BadRequest, "intent requires text or prompt")
        })?;
    let (intent, confidence) = host.brain.intent(text);
    Ok(json!({
        "intent": intent,
        "confidence": confidence,
    }))
}

pub fn complete(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let prompt = str_field(input, "prompt")?;
    let max_tokens = u64_field(input, "max_tokens").map(|n| n as usize);
    match host.brain.complete(prompt, max_tokens) {
        Some(completion) => Ok(json!({
            "model": "ngram",
            "prompt": prompt,
            "completion": completion,
        })),
        None => Ok(Micronaut::absent_marker(prompt)),
    }
}

/// Chat: the last user message is the completion prompt.
pub fn chat(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let prompt = match input.get("messages").and_then(Value::as_array) {
        Some(messages) => messages
            .iter()
            .rev()
            .find(|m| m.get("role").and_then(Value::as_str) != Some("assistant"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        None => str_field(input, "prompt")?.to_string(),
    };
    if prompt.is_empty() {
        return Ok(Micronaut::absent_marker(""));
    }
    let max_tokens = u64_field(input, "max_tokens").map(|n| n as usize);
    match host.brain.complete(&prompt, max_tokens) {
        Some(reply) => Ok(json!({
            "model": "ngram",
            "role": "assistant",
            "content": reply,
        })),
        None => Ok(Micronaut::absent_marker(&prompt)),
    }
}

/// Fold text into the brain. This is runtime state, not training
/// tooling; the table lives and dies with the process.
pub fn train(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let text = str_field(input, "text")?;
    let status = host.brain.train(text);
    serde_json::to_value(&status)
        .map_err(|e| crate::host_err!(ErrorKind::BadRequest, "status not encodable: {e}"))
}

pub fn status(host: &Host, _input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    serde_json::to_value(host.brain.status())
        .map_err(|e| crate::host_err!(ErrorKind::BadRequest, "status not encodable: {e}"))
}
