// CLASSIFICATION: COMMUNITY
// Filename: extended.rs v0.6
// Author: Lukas Bower
// Date Modified: 2026-07-03

//! Structured front end: consumes records rather than token text.
//! A program is a JSON array whose elements are either token strings
//! (run on the shared VM after `${name}` substitution) or control
//! records `{"@if": ...}`, `{"@while": ...}`, `{"@for": ...}`.
//! Conditions use the restricted expression grammar with the local
//! scope shadowing VM variables. Loops abort with `loop-limit` after
//! ten thousand iterations.

use super::expr;
use super::vm::GlyphVm;
use super::Value;
use crate::error::{ErrorKind, HostResult};
use crate::host_bail;
use serde_json::Value as Json;
use std::collections::HashMap;

/// Hard iteration cap for `@while` and `@for`.
pub const LOOP_LIMIT: usize = 10_000;

/// Execute a structured program and return the VM's top of stack.
pub fn execute_extended(
    vm: &mut GlyphVm,
    program: &Json,
    scope: &mut HashMap<String, Value>,
) -> HostResult<Option<Value>> {
    let steps = match program {
        Json::Array(steps) => steps.as_slice(),
        Json::String(_) => std::slice::from_ref(program),
        other => host_bail!(
            ErrorKind::UnknownOperation,
            "structured program must be an array, found {other}"
        ),
    };
    run_steps(vm, steps, scope)?;
    Ok(vm.top().cloned())
}

fn run_steps(
    vm: &mut GlyphVm,
    steps: &[Json],
    scope: &mut HashMap<String, Value>,
) -> HostResult<()> {
    for step in steps {
        run_step(vm, step, scope)?;
    }
    Ok(())
}

fn run_step(vm: &mut GlyphVm, step: &Json, scope: &mut HashMap<String, Value>) -> HostResult<()> {
    match step {
        Json::String(tokens) => {
            let substituted = substitute(tokens, vm, scope);
            vm.execute(&substituted)?;
            Ok(())
        }
        Json::Object(record) => {
            if let Some(body) = record.get("@if") {
                return run_if(vm, body, scope);
            }
            if let Some(body) = record.get("@while") {
                return run_while(vm, body, scope);
            }
            if let Some(body) = record.get("@for") {
                return run_for(vm, body, scope);
            }
            host_bail!(
                ErrorKind::UnknownOperation,
                "unrecognised control record: {step}"
            );
        }
        other => host_bail!(
            ErrorKind::UnknownOperation,
            "step must be a token string or control record, found {other}"
        ),
    }
}

fn run_if(vm: &mut GlyphVm, body: &Json, scope: &mut HashMap<String, Value>) -> HostResult<()> {
    let cond = cond_of(body)?;
    let branch = if eval_cond(&cond, vm, scope)?.truthy() {
        body.get("then")
    } else {
        body.get("else")
    };
    if let Some(steps) = branch {
        run_branch(vm, steps, scope)?;
    }
    Ok(())
}

fn run_while(vm: &mut GlyphVm, body: &Json, scope: &mut HashMap<String, Value>) -> HostResult<()> {
    let cond = cond_of(body)?;
    let steps = body.get("do").cloned().unwrap_or(Json::Array(Vec::new()));
    let mut iterations = 0usize;
    while eval_cond(&cond, vm, scope)?.truthy() {
        iterations += 1;
        if iterations > LOOP_LIMIT {
            host_bail!(
                ErrorKind::LoopLimit,
                "@while exceeded the {LOOP_LIMIT} iteration cap"
            );
        }
        run_branch(vm, &steps, scope)?;
    }
    Ok(())
}

fn run_for(vm: &mut GlyphVm, body: &Json, scope: &mut HashMap<String, Value>) -> HostResult<()> {
    let var = body
        .get("var")
        .and_then(Json::as_str)
        .ok_or_else(|| crate::host_err!(ErrorKind::UnknownOperation, "@for requires var"))?
        .to_string();
    let from = number_field(body, "from", 0.0)?;
    let to = number_field(body, "to", 0.0)?;
    let step = number_field(body, "step", 1.0)?;
    if step == 0.0 {
        host_bail!(ErrorKind::UnknownOperation, "@for step must be non-zero");
    }
    let steps = body.get("do").cloned().unwrap_or(Json::Array(Vec::new()));
    let shadowed = scope.get(&var).cloned();
    let mut cursor = from;
    let mut iterations = 0usize;
    while (step > 0.0 && cursor <= to) || (step < 0.0 && cursor >= to) {
        iterations += 1;
        if iterations > LOOP_LIMIT {
            host_bail!(
                ErrorKind::LoopLimit,
                "@for exceeded the {LOOP_LIMIT} iteration cap"
            );
        }
        scope.insert(var.clone(), Value::Num(cursor));
        run_branch(vm, &steps, scope)?;
        cursor += step;
    }
    match shadowed {
        Some(previous) => {
            scope.insert(var, previous);
        }
        None => {
            scope.remove(&var);
        }
    }
    Ok(())
}

fn run_branch(vm: &mut GlyphVm, steps: &Json, scope: &mut HashMap<String, Value>) -> HostResult<()> {
    match steps {
        Json::Array(list) => run_steps(vm, list, scope),
        single => run_step(vm, single, scope),
    }
}

fn cond_of(body: &Json) -> HostResult<String> {
    match body.get("cond") {
        Some(Json::String(cond)) => Ok(cond.clone()),
        Some(Json::Bool(flag)) => Ok(flag.to_string()),
        _ => Err(crate::host_err!(
            ErrorKind::UnknownOperation,
            "control record requires a cond string"
        )),
    }
}

fn number_field(body: &Json, key: &str, default: f64) -> HostResult<f64> {
    match body.get(key) {
        None => Ok(default),
        Some(Json::Number(n)) => Ok(n.as_f64().unwrap_or(default)),
        Some(Json::String(s)) => s.trim().parse::<f64>().map_err(|_| {
            crate::host_err!(ErrorKind::UnknownOperation, "@for {key} must be numeric")
        }),
        Some(other) => Err(crate::host_err!(
            ErrorKind::UnknownOperation,
            "@for {key} must be numeric, found {other}"
        )),
    }
}

fn eval_cond(
    cond: &str,
    vm: &GlyphVm,
    scope: &HashMap<String, Value>,
) -> HostResult<Value> {
    let substituted = substitute(cond, vm, scope);
    let lookup = |name: &str| -> Option<Value> {
        scope
            .get(name)
            .cloned()
            .or_else(|| vm.var(name).cloned())
    };
    expr::eval(&substituted, &lookup)
}

/// Replace `${name}` references inside a string operand. Local scope
/// shadows VM variables; unknown names substitute as empty.
pub fn substitute(input: &str, vm: &GlyphVm, scope: &HashMap<String, Value>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let name = &rest[start + 2..start + 2 + end];
                if let Some(value) = scope.get(name).cloned().or_else(|| vm.var(name).cloned()) {
                    out.push_str(&value.to_string());
                }
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
