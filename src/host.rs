// CLASSIFICATION: COMMUNITY
// Filename: host.rs v0.8
// Author: Lukas Bower
// Date Modified: 2026-07-27

//! The one `Host` value.
//!
//! Every handler receives a borrowed `Host`; there is no module-level
//! mutable state anywhere in the runtime. Boot constructs exactly one
//! of these from the resolved configuration, and the HTTP surface
//! shares it behind an `Arc`.

use crate::config::{AgentEntry, BootConfig};
use crate::error::{ErrorKind, HostResult};
use crate::glyph::GlyphVm;
use crate::handlers::{self, CallContext, Envelope, HandlerSet};
use crate::host_bail;
use crate::micronaut::Micronaut;
use crate::router::{self, BackendRouter};
use crate::scheduler::DeviceScheduler;
use crate::store::KvStore;
use crate::tape::registry::{ScanReport, TapeRegistry, SNAPSHOT_FILE};
use crate::tribunal::{JudgeDescriptor, Tribunal};
use log::{info, warn};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Envelope counters for the metrics route.
#[derive(Default)]
pub struct HostMetrics {
    pub served: AtomicU64,
    pub failed: AtomicU64,
}

/// The runtime. Constructed once at boot.
pub struct Host {
    pub config: BootConfig,
    pub handlers: HandlerSet,
    pub registry: TapeRegistry,
    pub store: KvStore,
    pub scheduler: DeviceScheduler,
    pub tribunal: Tribunal,
    pub router: BackendRouter,
    pub glyph: Mutex<GlyphVm>,
    pub brain: Micronaut,
    pub metrics: HostMetrics,
    pub started: Instant,
}

impl Host {
    pub fn new(config: BootConfig) -> HostResult<Host> {
        let tapes_root = config.tapes_root();
        std::fs::create_dir_all(&tapes_root).map_err(|e| {
            crate::host_err!(
                ErrorKind::PathNotFound,
                "cannot create tape root {}: {e}",
                tapes_root.display()
            )
        })?;
        let registry = TapeRegistry::new(
            tapes_root,
            config.mount_on_discover,
            Some(config.root.join(SNAPSHOT_FILE)),
            config.bind_addr(),
            config.services.clone(),
        );
        Ok(Host {
            handlers: handlers::builtin_set(),
            registry,
            store: KvStore::new(),
            scheduler: DeviceScheduler::new(config.scheduler.clone()),
            tribunal: Tribunal::new(),
            router: BackendRouter::new(&config.backends),
            glyph: Mutex::new(GlyphVm::new()),
            brain: Micronaut::new(),
            metrics: HostMetrics::default(),
            started: Instant::now(),
            config,
        })
    }

    pub fn is_handler(&self, name: &str) -> bool {
        self.handlers.contains(name)
    }

    /// Discovery pass over the tape root.
    pub fn scan_tapes(&self) -> HostResult<ScanReport> {
        self.registry.scan(&|name| self.handlers.contains(name))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Resolve a judge slate from the swarm config: the named ids, or
    /// every agent with the `judge` skill, or the whole swarm. Ordered
    /// by priority, then id, for reproducible slates.
    pub fn judges(&self, ids: Option<&[String]>) -> Vec<JudgeDescriptor> {
        let agents = &self.config.swarm.agents;
        let mut picked: Vec<(&String, &AgentEntry)> = match ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| agents.get_key_value(id))
                .collect(),
            None => {
                let judges: Vec<(&String, &AgentEntry)> = agents
                    .iter()
                    .filter(|(_, agent)| agent.skills.iter().any(|s| s == "judge"))
                    .collect();
                if judges.is_empty() {
                    agents.iter().collect()
                } else {
                    judges
                }
            }
        };
        picked.sort_by(|a, b| {
            b.1.priority
                .partial_cmp(&a.1.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        picked
            .into_iter()
            .map(|(id, agent)| JudgeDescriptor {
                id: id.clone(),
                url: agent.url.clone(),
                skills: agent.skills.clone(),
                priority: agent.priority,
                status: agent.status.clone(),
            })
            .collect()
    }

    /// Keyword routing for swarm tasks. Known keyword groups map to a
    /// skill; the first online agent carrying it wins, the configured
    /// fallback agent catches the rest.
    pub fn route_task(&self, task: &str) -> HostResult<(String, AgentEntry)> {
        let lowered = task.to_lowercase();
        let groups: &[(&[&str], &str)] = &[
            (&["build", "deploy", "git"], "builder"),
            (&["eval", "judge", "code"], "judge"),
            (&["reason", "analyze", "longform"], "reasoner"),
        ];
        let wanted_skill = groups
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
            .map(|(_, skill)| *skill);

        if let Some(skill) = wanted_skill {
            let mut candidates: Vec<(&String, &AgentEntry)> = self
                .config
                .swarm
                .agents
                .iter()
                .filter(|(_, agent)| agent.status != "offline")
                .filter(|(_, agent)| agent.skills.iter().any(|s| s == skill))
                .collect();
            candidates.sort_by(|a, b| {
                b.1.priority
                    .partial_cmp(&a.1.priority)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(b.0))
            });
            if let Some((id, agent)) = candidates.first() {
                return Ok(((*id).clone(), (*agent).clone()));
            }
        }

        let fallback = self.config.swarm.router.fallback.as_ref().ok_or_else(|| {
            crate::host_err!(
                ErrorKind::BackendError,
                "no agent matches task and no fallback is configured"
            )
        })?;
        match self.config.swarm.agents.get(fallback) {
            Some(agent) => Ok((fallback.clone(), agent.clone())),
            None => host_bail!(
                ErrorKind::BackendError,
                "fallback agent {fallback} is not in the swarm"
            ),
        }
    }

    /// Process one raw envelope body and produce the reply envelope.
    /// This is the single place failures convert to the wire shape.
    pub fn run_envelope(&self, body: &str) -> Value {
        let started = Instant::now();
        let envelope: Envelope = match serde_json::from_str(body) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                warn!("envelope rejected: {err}");
                return json!({
                    "ok": false,
                    "error": ErrorKind::BadRequest.as_str(),
                    "message": format!("malformed envelope: {err}"),
                    "backend": router::LOCAL_BACKEND,
                    "elapsed_ms": 0,
                });
            }
        };
        self.run_envelope_parsed(envelope, started)
    }

    pub fn run_envelope_parsed(&self, envelope: Envelope, started: Instant) -> Value {
        let mut ctx = CallContext::from_envelope(envelope.context);
        let correlation = ctx.correlation_id.clone();
        let handler = envelope.program.kind.clone();
        let routed = router::call(self, &handler, &envelope.program.input, &mut ctx);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match routed.outcome {
            Ok(result) => {
                self.metrics.served.fetch_add(1, Ordering::Relaxed);
                info!(
                    "correlation={correlation} handler={handler} backend={} elapsed_ms={elapsed_ms} ok",
                    routed.backend
                );
                json!({
                    "ok": true,
                    "result": result,
                    "backend": routed.backend,
                    "elapsed_ms": elapsed_ms,
                })
            }
            Err(err) => {
                self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "correlation={correlation} handler={handler} backend={} elapsed_ms={elapsed_ms} error={}",
                    routed.backend,
                    err.kind.as_str()
                );
                let mut reply = json!({
                    "ok": false,
                    "error": err.kind.as_str(),
                    "message": err.message,
                    "backend": routed.backend,
                    "elapsed_ms": elapsed_ms,
                });
                if let Some(context) = err.context {
                    reply["context"] = context;
                }
                reply
            }
        }
    }
}
