// CLASSIFICATION: COMMUNITY
// Filename: tribunal.rs v0.9
// Author: Lukas Bower
// Date Modified: 2026-07-28

//! Multi-judge consensus tribunal.
//!
//! Every judge in the slate receives the same prompt concurrently,
//! each dispatch with its own deadline under a global deadline. Judges
//! that error or time out are recorded with verdict `error` and are
//! excluded from consensus. Non-unanimous sessions append a
//! disagreement record to a bounded ring buffer.

use crate::error::{ErrorKind, HostResult};
use crate::host_bail;
use crate::util::{build_agent, timestamp};
use log::warn;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Capacity of the disagreement ring buffer.
pub const DISAGREEMENT_CAPACITY: usize = 100;

/// Weight of average confidence vs agreement in consensus confidence.
const CONFIDENCE_WEIGHT: f64 = 0.6;
const AGREEMENT_WEIGHT: f64 = 0.4;

/// Severity thresholds on the blended disagreement score.
const SEVERITY_HIGH: f64 = 0.7;
const SEVERITY_MEDIUM: f64 = 0.4;

/// A judge eligible for a tribunal slate.
#[derive(Debug, Clone)]
pub struct JudgeDescriptor {
    pub id: String,
    pub url: Option<String>,
    pub skills: Vec<String>,
    pub priority: f64,
    pub status: String,
}

impl JudgeDescriptor {
    pub fn online(&self) -> bool {
        self.status != "offline"
    }
}

/// The work unit judged by a tribunal.
#[derive(Debug, Clone)]
pub struct TribunalTask {
    pub task_type: String,
    pub content: String,
    pub context: Option<Value>,
}

/// One judge's vote.
#[derive(Debug, Clone, Serialize)]
pub struct Vote {
    pub judge: String,
    pub verdict: String,
    pub confidence: f64,
    pub reasoning: String,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Vote {
    fn errored(judge: &str, latency_ms: u64, message: impl Into<String>) -> Self {
        Self {
            judge: judge.to_string(),
            verdict: "error".into(),
            confidence: 0.0,
            reasoning: String::new(),
            latency_ms,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.verdict == "error"
    }
}

/// Aggregate outcome over the non-error votes.
#[derive(Debug, Clone, Serialize)]
pub struct Consensus {
    pub verdict: String,
    pub confidence: f64,
    pub agreement_rate: f64,
}

/// A completed tribunal session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub task_type: String,
    pub content_hash: String,
    pub votes: Vec<Vote>,
    pub consensus: Consensus,
    pub advice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    pub duration_ms: u64,
}

/// Record written when a session is not unanimous.
#[derive(Debug, Clone, Serialize)]
pub struct Disagreement {
    pub timestamp: u64,
    pub task_type: String,
    pub content_hash: String,
    pub votes: Vec<Value>,
    pub consensus: Consensus,
    pub severity: String,
}

/// Aggregate tribunal statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TribunalStats {
    pub sessions: u64,
    pub unanimous: u64,
    pub no_quorum: u64,
    pub verdicts: HashMap<String, u64>,
    pub avg_agreement_rate: f64,
}

/// The tribunal. One per host.
pub struct Tribunal {
    ring: Mutex<VecDeque<Disagreement>>,
    stats: Mutex<TribunalStats>,
}

impl Default for Tribunal {
    fn default() -> Self {
        Self::new()
    }
}

impl Tribunal {
    pub fn new() -> Self {
        Self {
            ring: Mutex::new(VecDeque::with_capacity(DISAGREEMENT_CAPACITY)),
            stats: Mutex::new(TribunalStats::default()),
        }
    }

    /// Evaluate a task against a judge slate with a global deadline.
    pub fn evaluate(
        &self,
        task: &TribunalTask,
        judges: &[JudgeDescriptor],
        timeout: Duration,
    ) -> HostResult<Session> {
        let slate: Vec<&JudgeDescriptor> = judges.iter().filter(|j| j.online()).collect();
        if slate.is_empty() {
            host_bail!(
                ErrorKind::NoJudgesOnline,
                "no online judges for {} task",
                task.task_type
            );
        }

        let started = Instant::now();
        let prompt = prompt_for(&task.task_type, &task.content);
        let payload = json!({
            "task_type": task.task_type,
            "prompt": prompt,
            "content": task.content,
            "context": task.context,
        });

        let (tx, rx) = mpsc::channel::<Vote>();
        for judge in &slate {
            let tx = tx.clone();
            let judge = (*judge).clone();
            let payload = payload.clone();
            thread::spawn(move || {
                let vote = dispatch_judge(&judge, &payload, timeout);
                // Late votes after the global deadline find the receiver
                // gone; dropping them is the cancellation contract.
                let _ = tx.send(vote);
            });
        }
        drop(tx);

        let mut votes: Vec<Vote> = Vec::with_capacity(slate.len());
        let deadline = started + timeout;
        while votes.len() < slate.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match rx.recv_timeout(remaining) {
                Ok(vote) => votes.push(vote),
                Err(_) => break,
            }
        }
        drop(rx);

        // Judges that never answered are recorded as deadline errors.
        for judge in &slate {
            if !votes.iter().any(|v| v.judge == judge.id) {
                votes.push(Vote::errored(
                    &judge.id,
                    timeout.as_millis() as u64,
                    "deadline-exceeded",
                ));
            }
        }
        votes.sort_by(|a, b| a.judge.cmp(&b.judge));

        let duration_ms = started.elapsed().as_millis() as u64;
        let content_hash = hex::encode(Sha256::digest(task.content.as_bytes()));
        let counted: Vec<&Vote> = votes.iter().filter(|v| !v.is_error()).collect();

        if counted.is_empty() {
            let session = Session {
                id: crate::util::correlation_id(),
                task_type: task.task_type.clone(),
                content_hash,
                votes: votes.clone(),
                consensus: Consensus {
                    verdict: "no-quorum".into(),
                    confidence: 0.0,
                    agreement_rate: 0.0,
                },
                advice: "human-review-required".into(),
                severity: None,
                duration_ms,
            };
            {
                let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
                stats.sessions += 1;
                stats.no_quorum += 1;
            }
            let session_json = serde_json::to_value(&session).unwrap_or(Value::Null);
            return Err(crate::host_err!(
                ErrorKind::NoQuorum,
                "all {} judges errored or timed out",
                votes.len()
            )
            .with_context(session_json));
        }

        let consensus = consensus_of(&counted);
        let unanimous = counted
            .iter()
            .all(|v| v.verdict == consensus.verdict);
        let severity_score = severity_score(&counted, consensus.agreement_rate);
        let severity_label = severity_label(severity_score);
        let advice = advice_for(task, &counted, &consensus, severity_label);

        let severity = if unanimous {
            None
        } else {
            let record = Disagreement {
                timestamp: timestamp(),
                task_type: task.task_type.clone(),
                content_hash: content_hash.clone(),
                votes: counted
                    .iter()
                    .map(|v| json!({"judge": v.judge, "verdict": v.verdict, "confidence": v.confidence}))
                    .collect(),
                consensus: consensus.clone(),
                severity: severity_label.to_string(),
            };
            let mut ring = self.ring.lock().unwrap_or_else(|p| p.into_inner());
            if ring.len() == DISAGREEMENT_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(record);
            Some(severity_label.to_string())
        };

        {
            let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
            stats.sessions += 1;
            if unanimous {
                stats.unanimous += 1;
            }
            *stats.verdicts.entry(consensus.verdict.clone()).or_insert(0) += 1;
            let n = (stats.sessions - stats.no_quorum) as f64;
            stats.avg_agreement_rate += (consensus.agreement_rate - stats.avg_agreement_rate) / n;
        }

        Ok(Session {
            id: crate::util::correlation_id(),
            task_type: task.task_type.clone(),
            content_hash,
            votes,
            consensus,
            advice,
            severity,
            duration_ms,
        })
    }

    /// Shallow copy of the disagreement ring, oldest first.
    pub fn disagreements(&self) -> Vec<Disagreement> {
        let ring = self.ring.lock().unwrap_or_else(|p| p.into_inner());
        ring.iter().cloned().collect()
    }

    pub fn stats(&self) -> TribunalStats {
        self.stats.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Aggregated view over the ring: counts by severity and task type.
    pub fn analysis(&self) -> Value {
        let records = self.disagreements();
        let mut by_severity: HashMap<&str, u64> = HashMap::new();
        let mut by_task: HashMap<String, u64> = HashMap::new();
        for record in &records {
            *by_severity.entry(record.severity.as_str()).or_insert(0) += 1;
            *by_task.entry(record.task_type.clone()).or_insert(0) += 1;
        }
        json!({
            "recorded": records.len(),
            "capacity": DISAGREEMENT_CAPACITY,
            "by_severity": by_severity,
            "by_task_type": by_task,
        })
    }
}

fn consensus_of(counted: &[&Vote]) -> Consensus {
    let mut tallies: HashMap<&str, usize> = HashMap::new();
    for vote in counted {
        *tallies.entry(vote.verdict.as_str()).or_insert(0) += 1;
    }
    // Mode, with a deterministic tiebreak on verdict name.
    let (verdict, majority) = tallies
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(v, n)| (v.to_string(), n))
        .unwrap_or_else(|| ("no-quorum".into(), 0));
    let total = counted.len();
    let agreement_rate = majority as f64 / total as f64;
    let avg_confidence =
        counted.iter().map(|v| v.confidence).sum::<f64>() / total as f64;
    Consensus {
        verdict,
        confidence: (avg_confidence * CONFIDENCE_WEIGHT + agreement_rate * AGREEMENT_WEIGHT)
            .clamp(0.0, 1.0),
        agreement_rate,
    }
}

fn severity_score(counted: &[&Vote], agreement_rate: f64) -> f64 {
    let n = counted.len() as f64;
    let mean = counted.iter().map(|v| v.confidence).sum::<f64>() / n;
    let variance = counted
        .iter()
        .map(|v| (v.confidence - mean).powi(2))
        .sum::<f64>()
        / n;
    (1.0 - agreement_rate) * 0.6 + variance.sqrt() * 0.4
}

fn severity_label(score: f64) -> &'static str {
    if score >= SEVERITY_HIGH {
        "high"
    } else if score >= SEVERITY_MEDIUM {
        "medium"
    } else {
        "low"
    }
}

fn advice_for(
    task: &TribunalTask,
    counted: &[&Vote],
    consensus: &Consensus,
    severity: &str,
) -> String {
    let distinct = {
        let mut verdicts: Vec<&str> = counted.iter().map(|v| v.verdict.as_str()).collect();
        verdicts.sort();
        verdicts.dedup();
        verdicts.len()
    };
    let split = distinct > 1 && consensus.agreement_rate <= 0.5;
    if severity == "high" && split {
        "human-review-required".into()
    } else if task.task_type == "security-audit" && consensus.agreement_rate < 0.75 {
        "human-review-recommended".into()
    } else {
        "log-and-proceed".into()
    }
}

/// Per-task prompt templates.
fn prompt_for(task_type: &str, content: &str) -> String {
    match task_type {
        "code-review" => format!(
            "Review the following change for correctness, clarity, and style. \
             Answer with a verdict and your confidence.\n\n{content}"
        ),
        "bug-analysis" => format!(
            "Analyse the following report. Identify the most likely root cause \
             and state a verdict with confidence.\n\n{content}"
        ),
        "optimization" => format!(
            "Assess whether the following change improves performance without \
             changing behaviour. Verdict plus confidence.\n\n{content}"
        ),
        "security-audit" => format!(
            "Audit the following for security weaknesses. Be conservative: \
             uncertain findings lower your confidence.\n\n{content}"
        ),
        _ => format!("Evaluate the following and answer with a verdict and confidence.\n\n{content}"),
    }
}

fn dispatch_judge(judge: &JudgeDescriptor, payload: &Value, timeout: Duration) -> Vote {
    let started = Instant::now();
    let Some(url) = judge.url.as_deref() else {
        return Vote::errored(&judge.id, 0, "judge has no endpoint");
    };
    let agent = build_agent(timeout);
    let body = payload.to_string();
    let response = agent
        .post(url)
        .content_type("application/json")
        .send(body);
    let latency_ms = started.elapsed().as_millis() as u64;
    let text = match response {
        Ok(response) => match response.into_body().read_to_string() {
            Ok(text) => text,
            Err(err) => {
                warn!("judge {} returned an unreadable body: {err}", judge.id);
                return Vote::errored(&judge.id, latency_ms, format!("unreadable body: {err}"));
            }
        },
        Err(err) => {
            warn!("judge {} dispatch failed: {err}", judge.id);
            return Vote::errored(&judge.id, latency_ms, err.to_string());
        }
    };
    let parsed: Value = match serde_json::from_str(&text) {
        Ok(parsed) => parsed,
        Err(err) => {
            return Vote::errored(&judge.id, latency_ms, format!("malformed vote: {err}"));
        }
    };
    let Some(verdict) = parsed.get("verdict").and_then(Value::as_str) else {
        return Vote::errored(&judge.id, latency_ms, "vote missing verdict");
    };
    Vote {
        judge: judge.id.clone(),
        verdict: verdict.to_string(),
        confidence: parsed
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0),
        reasoning: parsed
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        latency_ms,
        error: None,
    }
}
