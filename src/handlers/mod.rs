// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.8
// Author: Lukas Bower
// Date Modified: 2026-07-18

//! The named handler set.
//!
//! Handlers are plain functions of `(host, input, context)` registered
//! explicitly at boot; nothing self-registers at import time. Every
//! handler returns the uniform result-or-error shape and never panics
//! across the envelope boundary.

pub mod agents;
pub mod core;
pub mod fsops;
pub mod ghost;
pub mod kuhul;
pub mod micronaut;
pub mod scxq2;
pub mod storeops;

use crate::error::{ErrorKind, HostResult};
use crate::host::Host;
use crate::host_bail;
use crate::util::correlation_id;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default hop budget for inter-tape proxy chains.
pub const DEFAULT_HOP_LIMIT: u32 = 8;

/// Request envelope: `{"program": {"type", "input"}, "context"?}`.
/// Field names are the interop contract.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub program: Program,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Program {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub input: Value,
}

/// Per-call context threaded through every handler.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub correlation_id: String,
    pub hops: u32,
    pub deadline: Option<Instant>,
    pub context: Value,
}

impl CallContext {
    /// Build a context from the optional envelope context map. A
    /// `deadline_ms` entry propagates as a hard deadline; a `hops`
    /// entry carries the remaining hop budget of an inter-tape chain.
    pub fn from_envelope(context: Option<Value>) -> Self {
        let context = context.unwrap_or(Value::Null);
        let deadline = context
            .get("deadline_ms")
            .and_then(Value::as_u64)
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let hops = context
            .get("hops")
            .and_then(Value::as_u64)
            .map(|h| h.min(u64::from(DEFAULT_HOP_LIMIT)) as u32)
            .unwrap_or(DEFAULT_HOP_LIMIT);
        Self {
            correlation_id: correlation_id(),
            hops,
            deadline,
            context,
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Shorten a policy timeout to the caller's deadline.
    pub fn bounded_timeout(&self, policy: Duration) -> Duration {
        match self.remaining() {
            Some(remaining) => policy.min(remaining),
            None => policy,
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::from_envelope(None)
    }
}

/// Handler shape: named operation over (input payload, caller context).
pub type HandlerFn = fn(&Host, &Value, &mut CallContext) -> HostResult<Value>;

/// Explicit registry of named handlers, built once at boot.
pub struct HandlerSet {
    order: Vec<&'static str>,
    map: HashMap<&'static str, HandlerFn>,
}

impl HandlerSet {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            map: HashMap::new(),
        }
    }

    fn register(&mut self, name: &'static str, handler: HandlerFn) {
        if self.map.insert(name, handler).is_none() {
            self.order.push(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<HandlerFn> {
        self.map.get(name).copied()
    }

    /// Handler names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Build the complete handler set from the known component list.
pub fn builtin_set() -> HandlerSet {
    let mut set = HandlerSet::new();
    set.register("ping", core::ping);
    set.register("info", core::info);
    set.register("echo", core::echo);
    set.register("eval_expr", core::eval_expr);
    set.register("store", storeops::store);
    set.register("fs_read", fsops::fs_read);
    set.register("fs_write", fsops::fs_write);
    set.register("fs_list", fsops::fs_list);
    set.register("fs_exists", fsops::fs_exists);
    set.register("fs_delete", fsops::fs_delete);
    set.register("fs_copy", fsops::fs_copy);
    set.register("fs_json_read", fsops::fs_json_read);
    set.register("fs_json_write", fsops::fs_json_write);
    set.register("scxq2_encode", scxq2::encode);
    set.register("scxq2_decode", scxq2::decode);
    set.register("scxq2_stats", scxq2::stats);
    set.register("ghost_list", ghost::list);
    set.register("ghost_get", ghost::get);
    set.register("ghost_launch", ghost::launch);
    set.register("ghost_route", ghost::route);
    set.register("ghost_discover", ghost::discover);
    set.register("ghost_swarm", ghost::swarm);
    set.register("ghost_status", ghost::status);
    set.register("agents_list", agents::list);
    set.register("agents_call", agents::call);
    set.register("agents_tribunal", agents::tribunal);
    set.register("agents_swarm", agents::swarm);
    set.register("kuhul_profile", kuhul::profile);
    set.register("kuhul_route", kuhul::route);
    set.register("kuhul_schedule", kuhul::schedule);
    set.register("kuhul_status", kuhul::status);
    set.register("kuhul_glyph", kuhul::glyph);
    set.register("micronaut_infer", micronaut::infer);
    set.register("micronaut_intent", micronaut::intent);
    set.register("micronaut_complete", micronaut::complete);
    set.register("micronaut_chat", micronaut::chat);
    set.register("micronaut_train", micronaut::train);
    set.register("micronaut_status", micronaut::status);
    set
}

/// Run a named handler from the in-process set.
pub fn dispatch(host: &Host, name: &str, input: &Value, ctx: &mut CallContext) -> HostResult<Value> {
    match host.handlers.get(name) {
        Some(handler) => handler(host, input, ctx),
        None => host_bail!(ErrorKind::HandlerUnknown, "no handler named {name}"),
    }
}

// Input helpers shared by the handler modules.

pub(crate) fn str_field<'a>(input: &'a Value, key: &str) -> HostResult<&'a str> {
    match input.get(key).and_then(Value::as_str) {
        Some(value) => Ok(value),
        None => host_bail!(ErrorKind::BadRequest, "input field {key} must be a string"),
    }
}

pub(crate) fn opt_str_field<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

pub(crate) fn f64_field_or(input: &Value, key: &str, default: f64) -> f64 {
    input.get(key).and_then(Value::as_f64).unwrap_or(default)
}

pub(crate) fn u64_field(input: &Value, key: &str) -> Option<u64> {
    input.get(key).and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_set_registers_every_contract_handler() {
        let set = builtin_set();
        for name in [
            "ping",
            "info",
            "echo",
            "eval_expr",
            "store",
            "fs_read",
            "fs_json_write",
            "scxq2_encode",
            "ghost_list",
            "ghost_status",
            "agents_tribunal",
            "kuhul_schedule",
            "kuhul_glyph",
            "micronaut_infer",
            "micronaut_status",
        ] {
            assert!(set.contains(name), "missing handler {name}");
        }
        assert_eq!(set.len(), 38);
    }

    #[test]
    fn context_parses_deadline_and_hops() {
        let ctx = CallContext::from_envelope(Some(serde_json::json!({
            "deadline_ms": 50_000,
            "hops": 3,
        })));
        assert_eq!(ctx.hops, 3);
        let bounded = ctx.bounded_timeout(Duration::from_secs(120));
        assert!(bounded <= Duration::from_secs(50));
        let ctx = CallContext::default();
        assert_eq!(ctx.hops, DEFAULT_HOP_LIMIT);
        assert_eq!(
            ctx.bounded_timeout(Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }
}
