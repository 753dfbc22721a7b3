// CLASSIFICATION: COMMUNITY
// Filename: swarm_services.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-07-31

use clap::Parser;
use ghostd::config::{self, Cli};
use ghostd::host::Host;
use ghostd::http;
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Response, Server};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

struct MockService {
    server: Arc<Server>,
    join: Option<thread::JoinHandle<()>>,
    url: String,
}

impl MockService {
    fn start(body: &'static str) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("service server"));
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .expect("port");
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
            url: format!("http://127.0.0.1:{port}/v1"),
        }
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

struct TestServer {
    rt: Runtime,
    addr: std::net::SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<tokio::task::JoinHandle<std::io::Result<()>>>,
}

impl TestServer {
    fn start(host: Arc<Host>) -> Self {
        let rt = Runtime::new().expect("runtime");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (listener, addr) = rt.block_on(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("listener");
            let addr = listener.local_addr().expect("addr");
            (listener, addr)
        });
        let server = rt.spawn(http::serve(
            host,
            listener,
            async move {
                let _ = shutdown_rx.await;
            },
            Duration::from_secs(2),
        ));
        Self {
            rt,
            addr,
            shutdown: Some(shutdown_tx),
            server: Some(server),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(server) = self.server.take() {
            let _ = self.rt.block_on(server);
        }
    }
}

fn client() -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(Duration::from_secs(5)))
        .build()
        .new_agent()
}

fn post_json(url: &str, body: Value) -> (u16, Value) {
    let response = client()
        .post(url)
        .content_type("application/json")
        .send(body.to_string())
        .expect("post");
    let status = response.status().as_u16();
    let body =
        serde_json::from_str(&response.into_body().read_to_string().expect("body")).expect("json");
    (status, body)
}

fn build_host(host_config: Option<Value>, swarm_config: Option<Value>) -> Arc<Host> {
    let root = tempfile::tempdir().expect("tempdir");
    if let Some(config) = host_config {
        std::fs::write(
            root.path().join("host.json"),
            serde_json::to_vec(&config).expect("encode"),
        )
        .expect("write host.json");
    }
    if let Some(config) = swarm_config {
        std::fs::write(
            root.path().join("swarm.json"),
            serde_json::to_vec(&config).expect("encode"),
        )
        .expect("write swarm.json");
    }
    let cli = Cli::parse_from(["ghostd", "--root", root.path().to_str().expect("path"), "--port", "0"]);
    let config = config::resolve(&cli).expect("config");
    std::mem::forget(root);
    Arc::new(Host::new(config).expect("host"))
}

fn swarm_of_three() -> Value {
    json!({
        "agents": {
            "agent-a": {"url": "http://127.0.0.1:9101", "skills": ["builder"], "priority": 2.0},
            "agent-b": {"url": "http://127.0.0.1:9102", "skills": ["judge"], "priority": 1.0},
            "agent-c": {"url": "http://127.0.0.1:9103", "skills": ["reasoner"], "priority": 1.0}
        },
        "router": {"strategy": "skill", "fallback": "agent-c", "timeout_ms": 2000, "retry": 1}
    })
}

#[test]
fn swarm_route_matches_keyword_groups() {
    let host = build_host(None, Some(swarm_of_three()));
    let server = TestServer::start(host);
    let route = server.url("/swarm/route");

    let (status, reply) = post_json(&route, json!({"task": "deploy the new build"}));
    assert_eq!(status, 200);
    assert_eq!(reply["agent"], "agent-a");

    let (_, reply) = post_json(&route, json!({"task": "judge this code change"}));
    assert_eq!(reply["agent"], "agent-b");

    let (_, reply) = post_json(&route, json!({"task": "analyze the longform report"}));
    assert_eq!(reply["agent"], "agent-c");

    // No keyword match lands on the configured fallback.
    let (_, reply) = post_json(&route, json!({"task": "water the plants"}));
    assert_eq!(reply["agent"], "agent-c");
}

#[test]
fn swarm_route_without_task_is_bad_request() {
    let host = build_host(None, Some(swarm_of_three()));
    let server = TestServer::start(host);
    let (status, reply) = post_json(&server.url("/swarm/route"), json!({}));
    assert_eq!(status, 400);
    assert_eq!(reply["error"], "bad-request");
}

#[test]
fn external_proxy_forwards_to_named_service() {
    let service = MockService::start(r#"{"model": "stub", "reply": "pong"}"#);
    let host = build_host(
        Some(json!({"services": {"inference-a": service.url}})),
        None,
    );
    let server = TestServer::start(host);

    let (status, reply) = post_json(
        &server.url("/proxy-external/inference-a"),
        json!({"prompt": "ping"}),
    );
    assert_eq!(status, 200);
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["result"]["reply"], "pong");

    let (status, reply) = post_json(&server.url("/proxy-external/unknown"), json!({}));
    assert_eq!(status, 400);
    assert_eq!(reply["error"], "bad-request");
}

#[test]
fn agents_call_reaches_the_agent_endpoint() {
    let agent = MockService::start(r#"{"status": "done"}"#);
    let host = build_host(
        None,
        Some(json!({
            "agents": {
                "worker": {"url": agent.url, "skills": ["builder"], "priority": 1.0}
            },
            "router": {"timeout_ms": 2000}
        })),
    );
    let reply = host.run_envelope(
        &json!({"program": {"type": "agents_call", "input": {
            "agent": "worker",
            "payload": {"task": "assemble"}
        }}})
        .to_string(),
    );
    assert_eq!(reply["ok"], true, "unexpected reply: {reply}");
    assert_eq!(reply["result"]["agent"], "worker");
    assert_eq!(reply["result"]["reply"]["status"], "done");
}

#[test]
fn agents_list_and_ghost_swarm_agree() {
    let host = build_host(None, Some(swarm_of_three()));
    let listed = host.run_envelope(
        &json!({"program": {"type": "agents_list", "input": {}}}).to_string(),
    );
    assert_eq!(listed["result"]["total"], 3);
    let swarm = host.run_envelope(
        &json!({"program": {"type": "ghost_swarm", "input": {}}}).to_string(),
    );
    assert_eq!(
        swarm["result"]["agents"].as_array().expect("agents").len(),
        3
    );
    assert_eq!(swarm["result"]["router"]["fallback"], "agent-c");
}

#[test]
fn eval_expr_and_micronaut_through_envelope() {
    let host = build_host(None, None);
    let reply = host.run_envelope(
        &json!({"program": {"type": "eval_expr", "input": {
            "expr": "(cores * 2) >= 8",
            "vars": {"cores": 4}
        }}})
        .to_string(),
    );
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["result"]["value"], true);

    let reply = host.run_envelope(
        &json!({"program": {"type": "eval_expr", "input": {"expr": "std::process::exit"}}})
            .to_string(),
    );
    assert_eq!(reply["ok"], false);
    assert_eq!(reply["error"], "expression-rejected");

    let absent = host.run_envelope(
        &json!({"program": {"type": "micronaut_complete", "input": {"prompt": "hello"}}})
            .to_string(),
    );
    assert_eq!(absent["ok"], true);
    assert_eq!(absent["result"]["model"], "absent");

    host.run_envelope(
        &json!({"program": {"type": "micronaut_train", "input": {
            "text": "the tape spins and the tape sings"
        }}})
        .to_string(),
    );
    let status = host.run_envelope(
        &json!({"program": {"type": "micronaut_status", "input": {}}}).to_string(),
    );
    assert_eq!(status["result"]["present"], true);
}
