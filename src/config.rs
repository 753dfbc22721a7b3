// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.7
// Author: Lukas Bower
// Date Modified: 2026-07-09

//! Boot configuration.
//!
//! Assembled from CLI flags, the `HOST`/`PORT` environment, and JSON
//! config files under the host root (`host.json`, `swarm.json`,
//! `scheduler.json`). A missing file falls back to defaults; a present
//! but invalid file is a fatal boot error.

use crate::error::{ErrorKind, HostResult};
use crate::scheduler::SchedulerConfig;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Conventional config file names under the host root.
pub const HOST_CONFIG_FILE: &str = "host.json";
pub const SWARM_CONFIG_FILE: &str = "swarm.json";
pub const SCHEDULER_CONFIG_FILE: &str = "scheduler.json";

/// Subdirectory of the host root holding tapes.
pub const TAPES_DIR: &str = "tapes";

/// Command-line interface for the ghostd binary.
#[derive(Debug, Parser)]
#[command(name = "ghostd", about = "Tape host and orchestration runtime")]
pub struct Cli {
    /// Host root directory containing tapes/ and config files.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
    /// Bind host; overrides the HOST environment variable.
    #[arg(long)]
    pub host: Option<String>,
    /// Bind port; overrides the PORT environment variable.
    #[arg(long)]
    pub port: Option<u16>,
    /// Host config file; defaults to <root>/host.json when present.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Swarm config file; defaults to <root>/swarm.json when present.
    #[arg(long)]
    pub swarm_config: Option<PathBuf>,
    /// Scheduler config file; defaults to <root>/scheduler.json.
    #[arg(long)]
    pub scheduler_config: Option<PathBuf>,
    /// Seconds to wait for inflight requests at shutdown.
    #[arg(long, default_value_t = 10)]
    pub drain_deadline_secs: u64,
}

/// One remote backend for the envelope router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendDecl {
    pub name: String,
    pub url: String,
    pub priority: i64,
    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_backend_timeout_ms() -> u64 {
    5_000
}

/// On-disk host config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostFileConfig {
    /// Named external services reachable through /proxy-external.
    #[serde(default)]
    pub services: HashMap<String, String>,
    /// Remote envelope backends, highest priority first.
    #[serde(default)]
    pub backends: Vec<BackendDecl>,
    /// Whether discovered tapes start mounted.
    #[serde(default = "default_true")]
    pub mount_on_discover: bool,
}

fn default_true() -> bool {
    true
}

/// One agent in the swarm config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: f64,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_priority() -> f64 {
    1.0
}

fn default_status() -> String {
    "online".into()
}

/// Swarm router policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmRouter {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(default = "default_swarm_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry")]
    pub retry: u32,
}

fn default_strategy() -> String {
    "skill".into()
}

fn default_swarm_timeout_ms() -> u64 {
    10_000
}

fn default_retry() -> u32 {
    1
}

impl Default for SwarmRouter {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            fallback: None,
            timeout_ms: default_swarm_timeout_ms(),
            retry: default_retry(),
        }
    }
}

/// On-disk swarm config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default)]
    pub agents: HashMap<String, AgentEntry>,
    #[serde(default)]
    pub router: SwarmRouter,
}

/// Fully resolved boot configuration.
#[derive(Debug, Clone)]
pub struct BootConfig {
    pub root: PathBuf,
    pub host: String,
    pub port: u16,
    pub drain_deadline: Duration,
    pub services: HashMap<String, String>,
    pub backends: Vec<BackendDecl>,
    pub mount_on_discover: bool,
    pub swarm: SwarmConfig,
    pub scheduler: SchedulerConfig,
}

impl BootConfig {
    pub fn tapes_root(&self) -> PathBuf {
        self.root.join(TAPES_DIR)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Resolve the boot configuration. CLI beats environment beats
/// defaults; config files are read when named or conventionally
/// present.
pub fn resolve(cli: &Cli) -> HostResult<BootConfig> {
    let host = cli
        .host
        .clone()
        .or_else(|| std::env::var("HOST").ok())
        .unwrap_or_else(|| "localhost".into());
    let port = match cli.port {
        Some(port) => port,
        None => match std::env::var("PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|_| {
                crate::host_err!(ErrorKind::BadRequest, "PORT {raw:?} is not a port number")
            })?,
            Err(_) => 3000,
        },
    };

    let host_file: HostFileConfig =
        load_config(cli.config.as_deref(), &cli.root.join(HOST_CONFIG_FILE))?;
    let swarm: SwarmConfig = load_config(
        cli.swarm_config.as_deref(),
        &cli.root.join(SWARM_CONFIG_FILE),
    )?;
    let scheduler: SchedulerConfig = load_config(
        cli.scheduler_config.as_deref(),
        &cli.root.join(SCHEDULER_CONFIG_FILE),
    )?;

    Ok(BootConfig {
        root: cli.root.clone(),
        host,
        port,
        drain_deadline: Duration::from_secs(cli.drain_deadline_secs),
        services: host_file.services,
        backends: host_file.backends,
        mount_on_discover: host_file.mount_on_discover,
        swarm,
        scheduler,
    })
}

/// Read a config file. An explicit path must exist; the conventional
/// path is optional. Both must parse when present.
fn load_config<T: Default + for<'a> Deserialize<'a>>(
    explicit: Option<&Path>,
    conventional: &Path,
) -> HostResult<T> {
    let path = match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(crate::host_err!(
                    ErrorKind::BadRequest,
                    "config file {} does not exist",
                    path.display()
                ));
            }
            path.to_path_buf()
        }
        None => {
            if !conventional.is_file() {
                return Ok(T::default());
            }
            conventional.to_path_buf()
        }
    };
    let text = std::fs::read_to_string(&path).map_err(|e| {
        crate::host_err!(
            ErrorKind::BadRequest,
            "config file {} unreadable: {e}",
            path.display()
        )
    })?;
    serde_json::from_str(&text).map_err(|e| {
        crate::host_err!(
            ErrorKind::BadRequest,
            "config file {} malformed: {e}",
            path.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn bare_cli(root: &Path) -> Cli {
        Cli {
            root: root.to_path_buf(),
            host: None,
            port: Some(0),
            config: None,
            swarm_config: None,
            scheduler_config: None,
            drain_deadline_secs: 1,
        }
    }

    #[test]
    fn defaults_apply_without_config_files() {
        let dir = tempdir().expect("tempdir");
        let config = resolve(&bare_cli(dir.path())).expect("resolve");
        assert!(config.services.is_empty());
        assert!(config.backends.is_empty());
        assert!(config.mount_on_discover);
        assert_eq!(config.tapes_root(), dir.path().join("tapes"));
    }

    #[test]
    fn conventional_files_are_picked_up() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(HOST_CONFIG_FILE),
            serde_json::to_vec(&json!({
                "services": {"inference-a": "http://127.0.0.1:11434"},
                "backends": [
                    {"name": "remote-primary", "url": "http://127.0.0.1:9001/run", "priority": 10}
                ]
            }))
            .expect("encode"),
        )
        .expect("write");
        let config = resolve(&bare_cli(dir.path())).expect("resolve");
        assert_eq!(
            config.services.get("inference-a").map(String::as_str),
            Some("http://127.0.0.1:11434")
        );
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].timeout_ms, 5_000);
    }

    #[test]
    fn malformed_config_is_fatal() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join(SWARM_CONFIG_FILE), "{ nope").expect("write");
        let err = resolve(&bare_cli(dir.path())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadRequest);
    }

    #[test]
    fn explicit_missing_config_is_fatal() {
        let dir = tempdir().expect("tempdir");
        let mut cli = bare_cli(dir.path());
        cli.config = Some(dir.path().join("nope.json"));
        let err = resolve(&cli).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadRequest);
    }
}
