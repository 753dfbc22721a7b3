// CLASSIFICATION: COMMUNITY
// Filename: micronaut.rs v0.6
// Author: Lukas Bower
// Date Modified: 2026-07-21

//! In-process micronaut brain: a word-bigram frequency table grown at
//! runtime. This is runtime state, not a training pipeline; when no
//! text has been folded in yet the handlers return a marker result
//! instead of failing, and remote model servers stay out of scope.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

/// Completion limits.
const DEFAULT_MAX_TOKENS: usize = 16;
const MAX_MAX_TOKENS: usize = 256;

#[derive(Default)]
struct Brain {
    follows: HashMap<String, HashMap<String, u32>>,
    tokens_seen: u64,
    documents: u64,
}

/// Lazily populated model cache. Absent until the first train call.
#[derive(Default)]
pub struct Micronaut {
    model: Mutex<Option<Brain>>,
}

/// Snapshot of the brain's shape for `micronaut_status`.
#[derive(Debug, Clone, Serialize)]
pub struct BrainStatus {
    pub present: bool,
    pub vocabulary: usize,
    pub tokens_seen: u64,
    pub documents: u64,
}

impl Micronaut {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold text into the bigram table, creating the brain on first use.
    pub fn train(&self, text: &str) -> BrainStatus {
        let mut guard = self.model.lock().unwrap_or_else(|p| p.into_inner());
        let brain = guard.get_or_insert_with(Brain::default);
        let words: Vec<String> = tokenize(text);
        for pair in words.windows(2) {
            let entry = brain
                .follows
                .entry(pair[0].clone())
                .or_default()
                .entry(pair[1].clone())
                .or_insert(0);
            *entry += 1;
        }
        brain.tokens_seen += words.len() as u64;
        brain.documents += 1;
        status_of(Some(brain))
    }

    /// Greedy most-frequent-successor completion. Returns `None` when
    /// no model is present.
    pub fn complete(&self, prompt: &str, max_tokens: Option<usize>) -> Option<String> {
        let guard = self.model.lock().unwrap_or_else(|p| p.into_inner());
        let brain = guard.as_ref()?;
        let budget = max_tokens
            .unwrap_or(DEFAULT_MAX_TOKENS)
            .min(MAX_MAX_TOKENS);
        let mut current = tokenize(prompt).into_iter().last()?;
        let mut out: Vec<String> = Vec::new();
        for _ in 0..budget {
            let Some(successors) = brain.follows.get(&current) else {
                break;
            };
            let Some(next) = most_frequent(successors) else {
                break;
            };
            out.push(next.clone());
            current = next;
        }
        if out.is_empty() {
            None
        } else {
            Some(out.join(" "))
        }
    }

    /// Keyword intent classification; independent of the bigram table.
    pub fn intent(&self, text: &str) -> (String, f64) {
        let lowered = text.to_lowercase();
        let table: &[(&str, &[&str])] = &[
            ("greeting", &["hello", "hi", "hey", "greetings"]),
            ("status", &["status", "health", "uptime", "alive"]),
            ("launch", &["launch", "start", "open", "mount", "run"]),
            ("stop", &["stop", "halt", "unmount", "shutdown", "kill"]),
            ("query", &["what", "which", "how", "list", "show", "find"]),
            ("train", &["train", "learn", "teach", "ingest"]),
        ];
        let mut best = ("unknown".to_string(), 0usize);
        for (intent, keywords) in table {
            let hits = keywords.iter().filter(|k| lowered.contains(**k)).count();
            if hits > best.1 {
                best = (intent.to_string(), hits);
            }
        }
        let confidence = match best.1 {
            0 => 0.0,
            1 => 0.6,
            2 => 0.8,
            _ => 0.95,
        };
        (best.0, confidence)
    }

    pub fn status(&self) -> BrainStatus {
        let guard = self.model.lock().unwrap_or_else(|p| p.into_inner());
        status_of(guard.as_ref())
    }

    /// Marker result used whenever the brain has nothing to say.
    pub fn absent_marker(prompt: &str) -> Value {
        json!({
            "model": "absent",
            "completion": Value::Null,
            "prompt": prompt,
        })
    }
}

fn status_of(brain: Option<&Brain>) -> BrainStatus {
    match brain {
        Some(b) => BrainStatus {
            present: true,
            vocabulary: b.follows.len(),
            tokens_seen: b.tokens_seen,
            documents: b.documents,
        },
        None => BrainStatus {
            present: false,
            vocabulary: 0,
            tokens_seen: 0,
            documents: 0,
        },
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn most_frequent(counts: &HashMap<String, u32>) -> Option<String> {
    counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(word, _)| word.clone())
}
