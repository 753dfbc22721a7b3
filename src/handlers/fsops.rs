// CLASSIFICATION: COMMUNITY
// Filename: fsops.rs v0.6
// Author: Lukas Bower
// Date Modified: 2026-07-14

//! Sandboxed filesystem handlers. Every path funnels through the
//! sandbox guard; nothing here touches the filesystem outside the
//! host root.

use super::{str_field, CallContext};
use crate::error::{ErrorKind, HostResult};
use crate::host::Host;
use crate::host_bail;
use crate::sandbox::safe_join;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

fn resolve(host: &Host, input: &Value, key: &str) -> HostResult<PathBuf> {
    let raw = str_field(input, key)?;
    safe_join(&host.config.root, raw)
}

fn modified_secs(path: &Path) -> Option<u64> {
    path.metadata()
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
}

pub fn fs_read(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let path = resolve(host, input, "path")?;
    if !path.is_file() {
        host_bail!(ErrorKind::PathNotFound, "no file at {}", path.display());
    }
    let bytes = std::fs::read(&path).map_err(|e| {
        crate::host_err!(ErrorKind::PathNotFound, "unreadable {}: {e}", path.display())
    })?;
    Ok(json!({
        "path": str_field(input, "path")?,
        "content": String::from_utf8_lossy(&bytes),
        "size": bytes.len(),
        "modified": modified_secs(&path),
    }))
}

pub fn fs_write(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let path = resolve(host, input, "path")?;
    let content = str_field(input, "content")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            crate::host_err!(ErrorKind::PathNotFound, "cannot create {}: {e}", parent.display())
        })?;
    }
    std::fs::write(&path, content).map_err(|e| {
        crate::host_err!(ErrorKind::PathNotFound, "cannot write {}: {e}", path.display())
    })?;
    Ok(json!({
        "path": str_field(input, "path")?,
        "size": content.len(),
    }))
}

pub fn fs_list(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let raw = input.get("path").and_then(Value::as_str).unwrap_or("");
    let path = safe_join(&host.config.root, raw)?;
    if !path.is_dir() {
        host_bail!(ErrorKind::PathNotFound, "no directory at {}", path.display());
    }
    let reader = std::fs::read_dir(&path).map_err(|e| {
        crate::host_err!(ErrorKind::PathNotFound, "unreadable {}: {e}", path.display())
    })?;
    let mut entries: Vec<Value> = Vec::new();
    for entry in reader.flatten() {
        let entry_path = entry.path();
        let meta = entry.metadata().ok();
        entries.push(json!({
            "name": entry.file_name().to_string_lossy(),
            "dir": entry_path.is_dir(),
            "size": meta.as_ref().map(|m| m.len()),
            "modified": modified_secs(&entry_path),
        }));
    }
    entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    Ok(json!({"path": raw, "count": entries.len(), "entries": entries}))
}

pub fn fs_exists(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let path = resolve(host, input, "path")?;
    Ok(json!({
        "path": str_field(input, "path")?,
        "exists": path.exists(),
        "dir": path.is_dir(),
    }))
}

pub fn fs_delete(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let path = resolve(host, input, "path")?;
    if path.is_dir() {
        std::fs::remove_dir_all(&path).map_err(|e| {
            crate::host_err!(ErrorKind::PathNotFound, "cannot delete {}: {e}", path.display())
        })?;
    } else if path.is_file() {
        std::fs::remove_file(&path).map_err(|e| {
            crate::host_err!(ErrorKind::PathNotFound, "cannot delete {}: {e}", path.display())
        })?;
    } else {
        host_bail!(ErrorKind::PathNotFound, "nothing at {}", path.display());
    }
    Ok(json!({"path": str_field(input, "path")?, "deleted": true}))
}

pub fn fs_copy(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let from = resolve(host, input, "from")?;
    let to = resolve(host, input, "to")?;
    if !from.is_file() {
        host_bail!(ErrorKind::PathNotFound, "no file at {}", from.display());
    }
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            crate::host_err!(ErrorKind::PathNotFound, "cannot create {}: {e}", parent.display())
        })?;
    }
    let size = std::fs::copy(&from, &to).map_err(|e| {
        crate::host_err!(ErrorKind::PathNotFound, "copy failed: {e}")
    })?;
    Ok(json!({
        "from": str_field(input, "from")?,
        "to": str_field(input, "to")?,
        "size": size,
    }))
}

pub fn fs_json_read(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let path = resolve(host, input, "path")?;
    if !path.is_file() {
        host_bail!(ErrorKind::PathNotFound, "no file at {}", path.display());
    }
    let text = std::fs::read_to_string(&path).map_err(|e| {
        crate::host_err!(ErrorKind::PathNotFound, "unreadable {}: {e}", path.display())
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|e| {
        crate::host_err!(ErrorKind::BadRequest, "{} is not JSON: {e}", path.display())
    })?;
    Ok(json!({"path": str_field(input, "path")?, "value": value}))
}

pub fn fs_json_write(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let path = resolve(host, input, "path")?;
    let value = input.get("value").cloned().ok_or_else(|| {
        crate::host_err!(ErrorKind::BadRequest, "fs_json_write requires a value")
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            crate::host_err!(ErrorKind::PathNotFound, "cannot create {}: {e}", parent.display())
        })?;
    }
    let body = serde_json::to_vec_pretty(&value).map_err(|e| {
        crate::host_err!(ErrorKind::BadRequest, "value not encodable: {e}")
    })?;
    std::fs::write(&path, &body).map_err(|e| {
        crate::host_err!(ErrorKind::PathNotFound, "cannot write {}: {e}", path.display())
    })?;
    Ok(json!({"path": str_field(input, "path")?, "size": body.len()}))
}
