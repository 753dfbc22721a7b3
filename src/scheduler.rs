// CLASSIFICATION: COMMUNITY
// Filename: scheduler.rs v0.9
// Author: Lukas Bower
// Date Modified: 2026-07-30

//! Device scheduler for inference jobs.
//!
//! Policy rules are evaluated in order against the declared device
//! profile and the observed load snapshot; the first match wins.
//! Queued jobs re-enter the scheduler after a jittered delay, bounded
//! by a retry counter. Engine failures fall back through the shard's
//! declared fallback once, at reduced priority.

use crate::error::{ErrorKind, HostResult};
use crate::host_bail;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default delay hint for queued jobs.
const DEFAULT_QUEUE_DELAY_MS: u64 = 500;
/// Default retry budget before `schedule-exhausted`.
const DEFAULT_MAX_RETRIES: u32 = 8;
/// Integrated GPUs stop accepting work above this load.
const INTEGRATED_GPU_LOAD_CEILING: f64 = 0.8;
/// Priority decay applied when restarting on a fallback shard.
const FALLBACK_PRIORITY_DECAY: f64 = 0.8;

/// Declared hardware shape of the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    #[serde(default = "default_cores")]
    pub cores: u32,
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,
    #[serde(default)]
    pub dedicated_gpu: bool,
    #[serde(default)]
    pub integrated_gpu: bool,
}

fn default_cores() -> u32 {
    4
}

fn default_memory_mb() -> u64 {
    8192
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            cores: default_cores(),
            memory_mb: default_memory_mb(),
            dedicated_gpu: false,
            integrated_gpu: false,
        }
    }
}

/// A configured execution target for inference jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    pub engine: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub fallback: Option<String>,
}

/// Routing thresholds, both in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub cpu_threshold_load: f64,
    pub prefer_gpu_for_priority: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            cpu_threshold_load: 0.75,
            prefer_gpu_for_priority: 0.7,
        }
    }
}

/// On-disk scheduler configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub device_profiles: HashMap<String, DeviceProfile>,
    #[serde(default)]
    pub shards: HashMap<String, ShardConfig>,
    #[serde(default)]
    pub policies: HashMap<String, PolicyConfig>,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub queue_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// Routed device tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Device {
    Cpu,
    DedicatedGpu,
    IntegratedGpu,
    Queued,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::DedicatedGpu => "dedicated-gpu",
            Device::IntegratedGpu => "integrated-gpu",
            Device::Queued => "queued",
        }
    }
}

/// Optional tuning hints carried by a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobHints {
    #[serde(default)]
    pub quant: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

/// An admitted inference job.
#[derive(Debug, Clone)]
pub struct Job {
    pub fingerprint: String,
    pub shard: String,
    pub priority: f64,
    pub hints: JobHints,
}

/// Routing outcome for one pass of the policy rules.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub device: Device,
    pub engine: String,
    pub endpoint: Option<String>,
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

/// Aggregate counters, updated under one mutex per completion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct LoadSnapshot {
    cpu: f64,
    gpu: f64,
}

/// The device scheduler. One per host.
pub struct DeviceScheduler {
    profile: DeviceProfile,
    shards: HashMap<String, ShardConfig>,
    policies: HashMap<String, PolicyConfig>,
    observed: Mutex<LoadSnapshot>,
    metrics: Mutex<SchedulerMetrics>,
    queue_delay_ms: u64,
    max_retries: u32,
}

impl DeviceScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let profile = config
            .active_profile
            .as_deref()
            .and_then(|name| config.device_profiles.get(name).cloned())
            .or_else(|| {
                let mut names: Vec<&String> = config.device_profiles.keys().collect();
                names.sort();
                names
                    .first()
                    .and_then(|name| config.device_profiles.get(*name).cloned())
            })
            .unwrap_or_default();
        Self {
            profile,
            shards: config.shards,
            policies: config.policies,
            observed: Mutex::new(LoadSnapshot::default()),
            metrics: Mutex::new(SchedulerMetrics::default()),
            queue_delay_ms: config.queue_delay_ms.unwrap_or(DEFAULT_QUEUE_DELAY_MS),
            max_retries: config.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        }
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Record an observed load snapshot (both values clamped to [0, 1]).
    pub fn set_observed(&self, cpu: Option<f64>, gpu: Option<f64>) {
        let mut observed = self.observed.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(cpu) = cpu {
            observed.cpu = cpu.clamp(0.0, 1.0);
        }
        if let Some(gpu) = gpu {
            observed.gpu = gpu.clamp(0.0, 1.0);
        }
    }

    pub fn observed(&self) -> (f64, f64) {
        let observed = self.observed.lock().unwrap_or_else(|p| p.into_inner());
        (observed.cpu, observed.gpu)
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        self.metrics.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn shard_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shards.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn policy_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.policies.keys().cloned().collect();
        names.sort();
        names
    }

    /// One pass of the policy rules; no execution, no retries.
    pub fn route(&self, job: &Job, policy_name: Option<&str>) -> HostResult<Decision> {
        let shard = self.shards.get(&job.shard).ok_or_else(|| {
            crate::host_err!(ErrorKind::ShardNotFound, "no shard {}", job.shard)
        })?;
        let policy = policy_name
            .and_then(|name| self.policies.get(name))
            .cloned()
            .or_else(|| self.policies.get("default").cloned())
            .unwrap_or_default();
        let (cpu_load, gpu_load) = self.observed();

        let cpu_compatible = shard.engine.starts_with("cpu");
        let device = if cpu_compatible && cpu_load < policy.cpu_threshold_load {
            Device::Cpu
        } else if self.profile.dedicated_gpu && job.priority > policy.prefer_gpu_for_priority {
            Device::DedicatedGpu
        } else if self.profile.integrated_gpu && gpu_load < INTEGRATED_GPU_LOAD_CEILING {
            Device::IntegratedGpu
        } else {
            Device::Queued
        };

        Ok(Decision {
            device,
            engine: shard.engine.clone(),
            endpoint: shard.endpoint.clone(),
            args: shard.args.clone(),
            delay_ms: (device == Device::Queued).then_some(self.queue_delay_ms),
        })
    }

    /// Full scheduling pass: route, queue with retries, execute through
    /// `exec`, and fall back through the shard's declared fallback on
    /// engine failure. Metrics update once per completion.
    pub fn run(
        &self,
        mut job: Job,
        policy_name: Option<&str>,
        deadline: Option<Instant>,
        exec: &dyn Fn(&Job, &Decision) -> HostResult<Value>,
    ) -> HostResult<Value> {
        {
            let mut metrics = self.metrics.lock().unwrap_or_else(|p| p.into_inner());
            metrics.total += 1;
        }
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(job.shard.clone());
        let mut retries = 0u32;

        loop {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    self.record_failure();
                    host_bail!(
                        ErrorKind::DeadlineExceeded,
                        "job {} ran out of time while scheduling",
                        job.fingerprint
                    );
                }
            }
            let decision = match self.route(&job, policy_name) {
                Ok(decision) => decision,
                Err(err) => {
                    self.record_failure();
                    return Err(err);
                }
            };

            if decision.device == Device::Queued {
                retries += 1;
                if retries > self.max_retries {
                    self.record_failure();
                    host_bail!(
                        ErrorKind::ScheduleExhausted,
                        "job {} queued {} times without relief",
                        job.fingerprint,
                        self.max_retries
                    );
                }
                let delay = decision.delay_ms.unwrap_or(self.queue_delay_ms);
                std::thread::sleep(jittered(delay, deadline));
                continue;
            }

            let started = Instant::now();
            match exec(&job, &decision) {
                Ok(result) => {
                    let latency_ms = started.elapsed().as_millis() as f64;
                    self.record_success(latency_ms);
                    log::info!(
                        "job {} completed on {} via {} in {:.1}ms",
                        job.fingerprint,
                        decision.device.as_str(),
                        decision.engine,
                        latency_ms
                    );
                    return Ok(json!({
                        "fingerprint": job.fingerprint,
                        "device": decision.device,
                        "engine": decision.engine,
                        "latency_ms": latency_ms,
                        "result": result,
                    }));
                }
                Err(err) => {
                    let fallback = self
                        .shards
                        .get(&job.shard)
                        .and_then(|s| s.fallback.clone());
                    match fallback {
                        Some(next) if !seen.contains(&next) => {
                            log::warn!(
                                "job {} failed on shard {} ({err}); falling back to {next}",
                                job.fingerprint,
                                job.shard
                            );
                            seen.insert(next.clone());
                            job.shard = next;
                            job.priority *= FALLBACK_PRIORITY_DECAY;
                        }
                        _ => {
                            self.record_failure();
                            return Err(crate::host_err!(
                                ErrorKind::EngineError,
                                "engine {} failed for job {}: {}",
                                decision.engine,
                                job.fingerprint,
                                err.message
                            ));
                        }
                    }
                }
            }
        }
    }

    fn record_success(&self, latency_ms: f64) {
        let mut metrics = self.metrics.lock().unwrap_or_else(|p| p.into_inner());
        metrics.successful += 1;
        let n = metrics.successful as f64;
        metrics.avg_latency_ms += (latency_ms - metrics.avg_latency_ms) / n;
    }

    fn record_failure(&self) {
        let mut metrics = self.metrics.lock().unwrap_or_else(|p| p.into_inner());
        metrics.failed += 1;
    }
}

/// Queue delay with ±10% jitter, truncated to the remaining deadline.
fn jittered(delay_ms: u64, deadline: Option<Instant>) -> Duration {
    let factor = rand::thread_rng().gen_range(0.9..1.1);
    let mut delay = Duration::from_millis((delay_ms as f64 * factor) as u64);
    if let Some(deadline) = deadline {
        let remaining = deadline.saturating_duration_since(Instant::now());
        delay = delay.min(remaining);
    }
    delay
}
