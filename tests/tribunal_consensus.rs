// CLASSIFICATION: COMMUNITY
// Filename: tribunal_consensus.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-07-31

use clap::Parser;
use ghostd::config::{self, Cli};
use ghostd::host::Host;
use ghostd::tribunal::{JudgeDescriptor, Tribunal, TribunalTask};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Response, Server};

/// Mock judge answering every request with a fixed vote, optionally
/// after a delay.
struct MockJudge {
    server: Arc<Server>,
    join: Option<thread::JoinHandle<()>>,
    url: String,
}

impl MockJudge {
    fn start(verdict: &'static str, confidence: f64, delay: Duration) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("judge server"));
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .expect("judge port");
        let server_clone = server.clone();
        let join = thread::spawn(move || {
            for request in server_clone.incoming_requests() {
                thread::sleep(delay);
                let body = json!({
                    "verdict": verdict,
                    "confidence": confidence,
                    "reasoning": "fixed test judge",
                })
                .to_string();
                let response = Response::from_string(body).with_header(
                    Header::from_bytes(b"Content-Type", b"application/json").expect("header"),
                );
                let _ = request.respond(response);
            }
        });
        Self {
            server,
            join: Some(join),
            url: format!("http://127.0.0.1:{port}/evaluate"),
        }
    }

    fn descriptor(&self, id: &str) -> JudgeDescriptor {
        JudgeDescriptor {
            id: id.to_string(),
            url: Some(self.url.clone()),
            skills: vec!["judge".into()],
            priority: 1.0,
            status: "online".into(),
        }
    }
}

impl Drop for MockJudge {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn task(task_type: &str) -> TribunalTask {
    TribunalTask {
        task_type: task_type.into(),
        content: "fn main() { let _ = 1; }".into(),
        context: None,
    }
}

#[test]
fn unanimous_session_has_no_disagreement() {
    let j1 = MockJudge::start("approve", 0.8, Duration::ZERO);
    let j2 = MockJudge::start("approve", 0.9, Duration::ZERO);
    let j3 = MockJudge::start("approve", 0.85, Duration::ZERO);
    let tribunal = Tribunal::new();
    let session = tribunal
        .evaluate(
            &task("code-review"),
            &[
                j1.descriptor("j1"),
                j2.descriptor("j2"),
                j3.descriptor("j3"),
            ],
            Duration::from_secs(3),
        )
        .expect("session");

    assert_eq!(session.consensus.verdict, "approve");
    assert!((session.consensus.agreement_rate - 1.0).abs() < 1e-9);
    // avg confidence 0.85 * 0.6 + agreement 1.0 * 0.4
    assert!((session.consensus.confidence - 0.91).abs() < 1e-9);
    assert!(session.severity.is_none());
    assert!(tribunal.disagreements().is_empty());
    assert_eq!(tribunal.stats().unanimous, 1);
}

#[test]
fn split_vote_records_disagreement() {
    let j1 = MockJudge::start("approve", 0.9, Duration::ZERO);
    let j2 = MockJudge::start("approve", 0.8, Duration::ZERO);
    let j3 = MockJudge::start("reject", 0.7, Duration::ZERO);
    let tribunal = Tribunal::new();
    let session = tribunal
        .evaluate(
            &task("code-review"),
            &[
                j1.descriptor("j1"),
                j2.descriptor("j2"),
                j3.descriptor("j3"),
            ],
            Duration::from_secs(3),
        )
        .expect("session");

    assert_eq!(session.consensus.verdict, "approve");
    assert!((session.consensus.agreement_rate - 2.0 / 3.0).abs() < 1e-9);
    assert!(session.severity.is_some());
    let records = tribunal.disagreements();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].task_type, "code-review");
    assert_eq!(records[0].votes.len(), 3);
}

#[test]
fn slow_judge_is_excluded_from_consensus() {
    let fast1 = MockJudge::start("approve", 0.9, Duration::ZERO);
    let fast2 = MockJudge::start("approve", 0.8, Duration::ZERO);
    let slow = MockJudge::start("reject", 0.9, Duration::from_millis(1500));
    let tribunal = Tribunal::new();
    let session = tribunal
        .evaluate(
            &task("code-review"),
            &[
                fast1.descriptor("fast1"),
                fast2.descriptor("fast2"),
                slow.descriptor("slow"),
            ],
            Duration::from_millis(400),
        )
        .expect("session");

    assert_eq!(session.consensus.verdict, "approve");
    assert!((session.consensus.agreement_rate - 1.0).abs() < 1e-9);
    let slow_vote = session
        .votes
        .iter()
        .find(|v| v.judge == "slow")
        .expect("slow vote recorded");
    assert!(slow_vote.is_error());
}

#[test]
fn all_judges_timing_out_is_no_quorum() {
    let slow1 = MockJudge::start("approve", 0.9, Duration::from_millis(1500));
    let slow2 = MockJudge::start("approve", 0.9, Duration::from_millis(1500));
    let tribunal = Tribunal::new();
    let err = tribunal
        .evaluate(
            &task("code-review"),
            &[slow1.descriptor("slow1"), slow2.descriptor("slow2")],
            Duration::from_millis(200),
        )
        .unwrap_err();
    assert_eq!(err.kind, ghostd::ErrorKind::NoQuorum);
    let session = err.context.expect("session");
    assert_eq!(session["consensus"]["verdict"], "no-quorum");
    let non_error = session["votes"]
        .as_array()
        .expect("votes")
        .iter()
        .filter(|v| v.get("error").is_none() && v["verdict"] != "error")
        .count();
    assert_eq!(non_error, 0);
}

#[test]
fn tribunal_through_envelope_with_swarm_config() {
    let j1 = MockJudge::start("approve", 0.8, Duration::ZERO);
    let j2 = MockJudge::start("approve", 0.9, Duration::ZERO);
    let root = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        root.path().join("swarm.json"),
        serde_json::to_vec(&json!({
            "agents": {
                "judge-a": {"url": j1.url, "skills": ["judge"], "priority": 2.0},
                "judge-b": {"url": j2.url, "skills": ["judge"], "priority": 1.0}
            },
            "router": {"strategy": "skill", "timeout_ms": 3000, "retry": 1}
        }))
        .expect("encode"),
    )
    .expect("write swarm.json");
    let cli = Cli::parse_from(["ghostd", "--root", root.path().to_str().expect("path"), "--port", "0"]);
    let config = config::resolve(&cli).expect("config");
    let host = Host::new(config).expect("host");

    let reply = host.run_envelope(
        &json!({"program": {"type": "agents_tribunal", "input": {
            "task_type": "code-review",
            "content": "let x = 5;"
        }}})
        .to_string(),
    );
    assert_eq!(reply["ok"], true, "unexpected reply: {reply}");
    assert_eq!(reply["result"]["consensus"]["verdict"], "approve");
    assert_eq!(
        reply["result"]["votes"].as_array().expect("votes").len(),
        2
    );
}

#[test]
fn offline_judges_leave_no_slate() {
    let tribunal = Tribunal::new();
    let offline = JudgeDescriptor {
        id: "gone".into(),
        url: None,
        skills: vec!["judge".into()],
        priority: 1.0,
        status: "offline".into(),
    };
    let err = tribunal
        .evaluate(&task("bug-analysis"), &[offline], Duration::from_millis(100))
        .unwrap_err();
    assert_eq!(err.kind, ghostd::ErrorKind::NoJudgesOnline);
}

#[test]
fn security_audit_split_recommends_human_review() {
    let j1 = MockJudge::start("pass", 0.9, Duration::ZERO);
    let j2 = MockJudge::start("pass", 0.9, Duration::ZERO);
    let j3 = MockJudge::start("fail", 0.9, Duration::ZERO);
    let tribunal = Tribunal::new();
    let session = tribunal
        .evaluate(
            &task("security-audit"),
            &[
                j1.descriptor("j1"),
                j2.descriptor("j2"),
                j3.descriptor("j3"),
            ],
            Duration::from_secs(3),
        )
        .expect("session");
    // agreement 2/3 < 0.75 on a security audit
    assert_eq!(session.advice, "human-review-recommended");
}
