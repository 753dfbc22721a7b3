// CLASSIFICATION: COMMUNITY
// Filename: core.rs v0.5
// Author: Lukas Bower
// Date Modified: 2026-07-11

//! Trivial runtime handlers: liveness, runtime description, echo, and
//! the restricted expression evaluator.

use super::{str_field, CallContext};
use crate::error::HostResult;
use crate::glyph::{expr, Value as GlyphValue};
use crate::host::Host;
use crate::util::timestamp;
use serde_json::{json, Value};

pub fn ping(_host: &Host, _input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    Ok(json!({
        "status": "ok",
        "timestamp": timestamp(),
    }))
}

pub fn info(host: &Host, _input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    Ok(json!({
        "runtime": "ghostd",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": host.uptime_secs(),
        "handlers": host.handlers.len(),
        "memory_kb": resident_memory_kb(),
    }))
}

pub fn echo(_host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    Ok(input.clone())
}

/// Evaluate a restricted expression. Identifiers resolve from the
/// optional `vars` map and the caller's task context; everything else
/// is rejected.
pub fn eval_expr(_host: &Host, input: &Value, ctx: &mut CallContext) -> HostResult<Value> {
    let source = str_field(input, "expr")?;
    let vars = input.get("vars").cloned().unwrap_or(Value::Null);
    let context = ctx.context.clone();
    let scope = move |name: &str| -> Option<GlyphValue> {
        vars.get(name)
            .or_else(|| context.get(name))
            .and_then(|v| GlyphValue::from_json(v).ok())
    };
    let value = expr::eval(source, &scope)?;
    Ok(json!({ "value": value.to_json() }))
}

/// Rough resident-set hint, linux only. Absent elsewhere.
fn resident_memory_kb() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages = statm.split_whitespace().nth(1)?.parse::<u64>().ok()?;
    Some(pages * 4)
}
