// CLASSIFICATION: COMMUNITY
// Filename: router_failover.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-07-31

use clap::Parser;
use ghostd::config::{self, Cli};
use ghostd::handlers::CallContext;
use ghostd::host::Host;
use ghostd::router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use tiny_http::{Header, Response, Server};

/// Fixed-body mock backend in the mould of the consensus peer mocks.
struct MockBackend {
    server: Arc<Server>,
    join: Option<thread::JoinHandle<()>>,
    url: String,
}

impl MockBackend {
    fn start(body: &'static str) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("mock server"));
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .expect("mock port");
        let server_clone = server.clone();
        let join = thread::spawn(move || {
            for request in server_clone.incoming_requests() {
                let response = Response::from_string(body).with_header(
                    Header::from_bytes(b"Content-Type", b"application/json").expect("header"),
                );
                let _ = request.respond(response);
            }
        });
        Self {
            server,
            join: Some(join),
            url: format!("http://127.0.0.1:{port}/run"),
        }
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn host_with_backends(backends: Value) -> Host {
    let root = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        root.path().join("host.json"),
        serde_json::to_vec(&json!({ "backends": backends })).expect("encode"),
    )
    .expect("write host.json");
    let cli = Cli::parse_from(["ghostd", "--root", root.path().to_str().expect("path"), "--port", "0"]);
    let config = config::resolve(&cli).expect("config");
    std::mem::forget(root);
    Host::new(config).expect("host")
}

#[test]
fn highest_priority_reachable_backend_serves() {
    let mock = MockBackend::start(r#"{"ok":true,"result":{"status":"remote-ok"}}"#);
    let host = host_with_backends(json!([
        {"name": "remote-primary", "url": mock.url, "priority": 10, "timeout_ms": 1000}
    ]));
    let mut ctx = CallContext::default();
    let routed = router::call(&host, "ping", &json!({}), &mut ctx);
    assert_eq!(routed.backend, "remote-primary");
    let result = routed.outcome.expect("remote result");
    assert_eq!(result["status"], "remote-ok");
}

#[test]
fn dead_backend_falls_through_to_local() {
    // Port 9 is the discard service; nothing is listening there.
    let host = host_with_backends(json!([
        {"name": "remote-primary", "url": "http://127.0.0.1:9/run", "priority": 10, "timeout_ms": 200}
    ]));
    let mut ctx = CallContext::default();
    let routed = router::call(&host, "ping", &json!({}), &mut ctx);
    assert_eq!(routed.backend, "local");
    let result = routed.outcome.expect("local result");
    assert_eq!(result["status"], "ok");
}

#[test]
fn handler_level_error_from_backend_is_not_retried() {
    let mock = MockBackend::start(
        r#"{"ok":false,"error":"tape-not-found","message":"no tape beta"}"#,
    );
    let host = host_with_backends(json!([
        {"name": "remote-primary", "url": mock.url, "priority": 10, "timeout_ms": 1000}
    ]));
    let mut ctx = CallContext::default();
    let routed = router::call(&host, "ghost_get", &json!({"id": "beta"}), &mut ctx);
    assert_eq!(routed.backend, "remote-primary");
    let err = routed.outcome.unwrap_err();
    assert_eq!(err.kind, ghostd::ErrorKind::TapeNotFound);
    assert_eq!(err.message, "no tape beta");
}

#[test]
fn priority_order_prefers_primary_over_secondary() {
    let primary = MockBackend::start(r#"{"ok":true,"result":{"who":"primary"}}"#);
    let secondary = MockBackend::start(r#"{"ok":true,"result":{"who":"secondary"}}"#);
    let host = host_with_backends(json!([
        {"name": "remote-secondary", "url": secondary.url, "priority": 9, "timeout_ms": 1000},
        {"name": "remote-primary", "url": primary.url, "priority": 10, "timeout_ms": 1000}
    ]));
    let mut ctx = CallContext::default();
    let routed = router::call(&host, "ping", &json!({}), &mut ctx);
    assert_eq!(routed.backend, "remote-primary");
    assert_eq!(routed.outcome.expect("result")["who"], "primary");
}

#[test]
fn exactly_one_backend_tag_per_reply() {
    let host = host_with_backends(json!([]));
    let reply = host.run_envelope(r#"{"program":{"type":"ping","input":{}}}"#);
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["backend"], "local");
    let names = host.router.backend_names();
    assert!(names.contains(&reply["backend"].as_str().expect("tag").to_string()));
}
