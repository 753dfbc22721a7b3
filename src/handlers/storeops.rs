// CLASSIFICATION: COMMUNITY
// Filename: storeops.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-06-22

//! The `store` handler: process-wide key-value operations.

use super::{str_field, CallContext};
use crate::error::{ErrorKind, HostResult};
use crate::host::Host;
use crate::host_bail;
use serde_json::{json, Value};

pub fn store(host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let action = str_field(input, "action")?;
    match action {
        "set" => {
            let key = str_field(input, "key")?;
            let value = input.get("value").cloned().ok_or_else(|| {
                crate::host_err!(ErrorKind::BadRequest, "set requires a value")
            })?;
            host.store.set(key, value);
            Ok(json!({"ok": true, "key": key}))
        }
        "get" => {
            let key = str_field(input, "key")?;
            match host.store.get(key) {
                Some((value, written)) => Ok(json!({
                    "ok": true,
                    "key": key,
                    "value": value,
                    "written": written,
                })),
                None => Ok(json!({"ok": false, "key": key})),
            }
        }
        "delete" => {
            let key = str_field(input, "key")?;
            let deleted = host.store.delete(key);
            Ok(json!({"ok": deleted, "key": key}))
        }
        "list" => {
            let keys = host.store.keys();
            Ok(json!({"ok": true, "count": keys.len(), "keys": keys}))
        }
        "clear" => {
            let cleared = host.store.clear();
            Ok(json!({"ok": true, "cleared": cleared}))
        }
        other => host_bail!(ErrorKind::BadRequest, "unknown store action {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Cli;
    use clap::Parser;

    fn test_host() -> Host {
        let dir = tempfile::tempdir().expect("tempdir");
        let cli = Cli::parse_from(["ghostd", "--root", dir.path().to_str().expect("path"), "--port", "0"]);
        let config = crate::config::resolve(&cli).expect("config");
        std::mem::forget(dir);
        Host::new(config).expect("host")
    }

    #[test]
    fn set_get_delete_laws() {
        let host = test_host();
        let mut ctx = CallContext::default();
        let set = store(
            &host,
            &json!({"action": "set", "key": "k", "value": {"v": 7}}),
            &mut ctx,
        )
        .expect("set");
        assert_eq!(set["ok"], true);

        let get = store(&host, &json!({"action": "get", "key": "k"}), &mut ctx).expect("get");
        assert_eq!(get["value"], json!({"v": 7}));

        store(&host, &json!({"action": "delete", "key": "k"}), &mut ctx).expect("delete");
        let get = store(&host, &json!({"action": "get", "key": "k"}), &mut ctx).expect("get");
        assert_eq!(get["ok"], false);
    }

    #[test]
    fn list_and_clear() {
        let host = test_host();
        let mut ctx = CallContext::default();
        for key in ["b", "a"] {
            store(
                &host,
                &json!({"action": "set", "key": key, "value": 1}),
                &mut ctx,
            )
            .expect("set");
        }
        let list = store(&host, &json!({"action": "list"}), &mut ctx).expect("list");
        assert_eq!(list["keys"], json!(["a", "b"]));
        let clear = store(&host, &json!({"action": "clear"}), &mut ctx).expect("clear");
        assert_eq!(clear["cleared"], 2);
    }

    #[test]
    fn unknown_action_is_bad_request() {
        let host = test_host();
        let mut ctx = CallContext::default();
        let err = store(&host, &json!({"action": "merge"}), &mut ctx).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadRequest);
    }
}
