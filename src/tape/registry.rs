// CLASSIFICATION: COMMUNITY
// Filename: registry.rs v0.9
// Author: Lukas Bower
// Date Modified: 2026-07-26

//! The authoritative set of known tapes and their mount state.
//!
//! Mutations flip state under a brief exclusive lock; readers share.
//! Inflight proxied requests are counted per entry with an atomic, and
//! unmount drains to zero (with a deadline, then force). After every
//! scan or state change the registry mirrors itself to an advisory
//! `ghost.json` snapshot, best-effort.

use super::manifest::{self, TapeDescriptor};
use crate::error::{ErrorKind, HostResult};
use crate::host_bail;
use crate::util::timestamp;
use log::{info, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Snapshot file name at the host root. Advisory, rebuildable.
pub const SNAPSHOT_FILE: &str = "ghost.json";

/// How long unmount and reload wait for inflight requests to drain
/// before forcing the transition.
const DRAIN_DEADLINE: Duration = Duration::from_secs(5);
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Per-entry mount lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    Mounting,
    Mounted,
    Unmounting,
    Failed,
}

impl MountState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountState::Unmounted => "unmounted",
            MountState::Mounting => "mounting",
            MountState::Mounted => "mounted",
            MountState::Unmounting => "unmounting",
            MountState::Failed => "failed",
        }
    }
}

struct TapeEntry {
    descriptor: TapeDescriptor,
    state: MountState,
    generation: u64,
    inflight: Arc<AtomicU64>,
    last_access: Arc<AtomicU64>,
}

#[derive(Default)]
struct RegistryInner {
    order: Vec<String>,
    entries: HashMap<String, TapeEntry>,
}

/// Read-only view of one registry entry.
#[derive(Debug, Clone)]
pub struct TapeView {
    pub descriptor: TapeDescriptor,
    pub state: MountState,
    pub generation: u64,
    pub inflight: u64,
    pub last_access: u64,
}

impl TapeView {
    pub fn to_json(&self) -> Value {
        let mut body = self.descriptor.to_json();
        if let Some(map) = body.as_object_mut() {
            map.insert("status".into(), json!(self.state.as_str()));
            map.insert("generation".into(), json!(self.generation));
            map.insert("inflight".into(), json!(self.inflight));
            map.insert("last_access".into(), json!(self.last_access));
        }
        body
    }
}

/// One scan failure, recorded without aborting the scan.
#[derive(Debug, Clone)]
pub struct ScanFailure {
    pub directory: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of a discovery pass.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub discovered: Vec<String>,
    pub removed: Vec<String>,
    pub failures: Vec<ScanFailure>,
}

/// Guard counting one inflight proxied request against a tape.
#[derive(Debug)]
pub struct InflightGuard {
    counter: Arc<AtomicU64>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The tape registry. One per host.
pub struct TapeRegistry {
    inner: RwLock<RegistryInner>,
    tapes_root: PathBuf,
    mount_on_discover: bool,
    snapshot_path: Option<PathBuf>,
    host_label: String,
    external: HashMap<String, String>,
}

impl TapeRegistry {
    pub fn new(
        tapes_root: PathBuf,
        mount_on_discover: bool,
        snapshot_path: Option<PathBuf>,
        host_label: String,
        external: HashMap<String, String>,
    ) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            tapes_root,
            mount_on_discover,
            snapshot_path,
            host_label,
            external,
        }
    }

    pub fn tapes_root(&self) -> &Path {
        &self.tapes_root
    }

    /// Scan the tape root: load every immediate subdirectory's manifest,
    /// register the valid ones in name order, drop entries whose
    /// directory vanished. Failures are recorded, never fatal.
    pub fn scan(&self, is_handler: &dyn Fn(&str) -> bool) -> HostResult<ScanReport> {
        let mut report = ScanReport::default();
        let dir = std::fs::read_dir(&self.tapes_root).map_err(|e| {
            crate::host_err!(
                ErrorKind::PathNotFound,
                "tape root {} unreadable: {e}",
                self.tapes_root.display()
            )
        })?;
        let mut subdirs: Vec<PathBuf> = dir
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        subdirs.sort();

        let mut seen: Vec<String> = Vec::new();
        for subdir in subdirs {
            let dir_name = subdir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match manifest::load(&subdir, is_handler) {
                Ok(descriptor) => {
                    seen.push(descriptor.id.clone());
                    match self.register(descriptor, is_handler) {
                        Ok(Some(id)) => report.discovered.push(id),
                        Ok(None) => {}
                        Err(err) => report.failures.push(ScanFailure {
                            directory: dir_name,
                            kind: err.kind,
                            message: err.message,
                        }),
                    }
                }
                Err(err) => report.failures.push(ScanFailure {
                    directory: dir_name,
                    kind: err.kind,
                    message: err.message,
                }),
            }
        }

        // Terminal path for removed tapes: unmounted, then deleted.
        {
            let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
            let gone: Vec<String> = inner
                .order
                .iter()
                .filter(|id| {
                    !seen.contains(id)
                        && !inner
                            .entries
                            .get(*id)
                            .map(|e| e.descriptor.root.is_dir())
                            .unwrap_or(false)
                })
                .cloned()
                .collect();
            for id in gone {
                inner.entries.remove(&id);
                inner.order.retain(|known| known != &id);
                report.removed.push(id);
            }
        }

        info!(
            "tape scan: {} discovered, {} removed, {} failures",
            report.discovered.len(),
            report.removed.len(),
            report.failures.len()
        );
        self.write_snapshot();
        Ok(report)
    }

    /// Insert a freshly loaded descriptor. Returns the id when the tape
    /// is new, `None` when it was already registered from the same root
    /// (the descriptor is refreshed in place).
    fn register(
        &self,
        descriptor: TapeDescriptor,
        is_handler: &dyn Fn(&str) -> bool,
    ) -> HostResult<Option<String>> {
        let id = descriptor.id.clone();
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = inner.entries.get_mut(&id) {
            if existing.descriptor.root != descriptor.root {
                host_bail!(
                    ErrorKind::TapeAlreadyRegistered,
                    "tape id {id} already registered from {}",
                    existing.descriptor.root.display()
                );
            }
            existing.descriptor = descriptor;
            return Ok(None);
        }
        let state = if self.mount_on_discover {
            match mount_hooks(&descriptor, is_handler) {
                Ok(()) => MountState::Mounted,
                Err(err) => {
                    warn!("tape {id} failed mount hooks at discovery: {err}");
                    MountState::Failed
                }
            }
        } else {
            MountState::Unmounted
        };
        let generation = u64::from(state == MountState::Mounted);
        inner.order.push(id.clone());
        inner.entries.insert(
            id.clone(),
            TapeEntry {
                descriptor,
                state,
                generation,
                inflight: Arc::new(AtomicU64::new(0)),
                last_access: Arc::new(AtomicU64::new(timestamp())),
            },
        );
        Ok(Some(id))
    }

    pub fn get(&self, id: &str) -> Option<TapeView> {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        inner.entries.get(id).map(view_of)
    }

    /// Entries in insertion order.
    pub fn list(&self) -> Vec<TapeView> {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .map(view_of)
            .collect()
    }

    pub fn counts(&self) -> (usize, usize) {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        let mounted = inner
            .entries
            .values()
            .filter(|e| e.state == MountState::Mounted)
            .count();
        (inner.order.len(), mounted)
    }

    /// Mount a tape. Idempotent once mounted.
    pub fn mount(&self, id: &str, is_handler: &dyn Fn(&str) -> bool) -> HostResult<TapeView> {
        let root = {
            let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
            let entry = inner
                .entries
                .get_mut(id)
                .ok_or_else(|| crate::host_err!(ErrorKind::TapeNotFound, "no tape {id}"))?;
            match entry.state {
                MountState::Mounted => return Ok(view_of(entry)),
                MountState::Mounting | MountState::Unmounting => {
                    host_bail!(ErrorKind::TapeBusy, "tape {id} is {}", entry.state.as_str())
                }
                MountState::Unmounted | MountState::Failed => {}
            }
            entry.state = MountState::Mounting;
            entry.generation += 1;
            entry.descriptor.root.clone()
        };

        let hook_result = manifest::load(&root, is_handler)
            .and_then(|descriptor| mount_hooks(&descriptor, is_handler).map(|()| descriptor));

        let outcome = {
            let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
            let entry = inner
                .entries
                .get_mut(id)
                .ok_or_else(|| crate::host_err!(ErrorKind::TapeNotFound, "no tape {id}"))?;
            match hook_result {
                Ok(descriptor) => {
                    entry.descriptor = descriptor;
                    entry.state = MountState::Mounted;
                    info!("tape {id} mounted (generation {})", entry.generation);
                    Ok(view_of(entry))
                }
                Err(err) => {
                    entry.state = MountState::Failed;
                    warn!("tape {id} mount failed: {err}");
                    Err(err)
                }
            }
        };
        self.write_snapshot();
        outcome
    }

    /// Unmount a tape, draining inflight requests first. After the
    /// drain deadline the transition is forced.
    pub fn unmount(&self, id: &str) -> HostResult<TapeView> {
        let inflight = {
            let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
            let entry = inner
                .entries
                .get_mut(id)
                .ok_or_else(|| crate::host_err!(ErrorKind::TapeNotFound, "no tape {id}"))?;
            match entry.state {
                MountState::Unmounted | MountState::Failed => return Ok(view_of(entry)),
                MountState::Mounting | MountState::Unmounting => {
                    host_bail!(ErrorKind::TapeBusy, "tape {id} is {}", entry.state.as_str())
                }
                MountState::Mounted => {}
            }
            entry.state = MountState::Unmounting;
            entry.inflight.clone()
        };

        if !drain(&inflight, DRAIN_DEADLINE) {
            warn!("tape {id} unmount forced with requests still inflight");
        }

        let view = {
            let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
            let entry = inner
                .entries
                .get_mut(id)
                .ok_or_else(|| crate::host_err!(ErrorKind::TapeNotFound, "no tape {id}"))?;
            entry.state = MountState::Unmounted;
            info!("tape {id} unmounted");
            view_of(entry)
        };
        self.write_snapshot();
        Ok(view)
    }

    /// Reload: drain, re-read the manifest, remount. New requests are
    /// refused while the reload is in progress.
    pub fn reload(&self, id: &str, is_handler: &dyn Fn(&str) -> bool) -> HostResult<TapeView> {
        let (root, inflight) = {
            let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
            let entry = inner
                .entries
                .get_mut(id)
                .ok_or_else(|| crate::host_err!(ErrorKind::TapeNotFound, "no tape {id}"))?;
            match entry.state {
                MountState::Mounted => {}
                MountState::Mounting | MountState::Unmounting => {
                    host_bail!(ErrorKind::TapeBusy, "tape {id} is {}", entry.state.as_str())
                }
                MountState::Unmounted | MountState::Failed => {
                    host_bail!(ErrorKind::TapeBusy, "tape {id} is not mounted")
                }
            }
            entry.state = MountState::Mounting;
            entry.generation += 1;
            (entry.descriptor.root.clone(), entry.inflight.clone())
        };

        if !drain(&inflight, DRAIN_DEADLINE) {
            warn!("tape {id} reload proceeding with requests still inflight");
        }

        let hook_result = manifest::load(&root, is_handler)
            .and_then(|descriptor| mount_hooks(&descriptor, is_handler).map(|()| descriptor));

        let outcome = {
            let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
            let entry = inner
                .entries
                .get_mut(id)
                .ok_or_else(|| crate::host_err!(ErrorKind::TapeNotFound, "no tape {id}"))?;
            match hook_result {
                Ok(descriptor) => {
                    entry.descriptor = descriptor;
                    entry.state = MountState::Mounted;
                    info!("tape {id} reloaded (generation {})", entry.generation);
                    Ok(view_of(entry))
                }
                Err(err) => {
                    entry.state = MountState::Failed;
                    warn!("tape {id} reload failed: {err}");
                    Err(err)
                }
            }
        };
        self.write_snapshot();
        outcome
    }

    /// Count one proxied request against a mounted tape. The guard
    /// decrements on drop.
    pub fn begin_request(&self, id: &str) -> HostResult<InflightGuard> {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        let entry = inner
            .entries
            .get(id)
            .ok_or_else(|| crate::host_err!(ErrorKind::TapeNotFound, "no tape {id}"))?;
        if entry.state != MountState::Mounted {
            host_bail!(
                ErrorKind::TapeBusy,
                "tape {id} is {} and not accepting requests",
                entry.state.as_str()
            );
        }
        entry.inflight.fetch_add(1, Ordering::SeqCst);
        entry.last_access.store(timestamp(), Ordering::SeqCst);
        Ok(InflightGuard {
            counter: entry.inflight.clone(),
        })
    }

    /// Mirror the registry to the advisory snapshot file. Best-effort.
    pub fn write_snapshot(&self) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        let tapes: serde_json::Map<String, Value> = {
            let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
            inner
                .order
                .iter()
                .filter_map(|id| inner.entries.get(id).map(|e| (id, e)))
                .map(|(id, entry)| {
                    (
                        id.clone(),
                        json!({
                            "path": entry.descriptor.root.display().to_string(),
                            "entry": entry.descriptor.entry,
                            "api": entry
                                .descriptor
                                .api
                                .as_ref()
                                .map(|a| a.as_str().to_string()),
                            "status": entry.state.as_str(),
                        }),
                    )
                })
                .collect()
        };
        let snapshot = json!({
            "version": env!("CARGO_PKG_VERSION"),
            "generated": timestamp(),
            "tapes": tapes,
            "host": self.host_label,
            "external": self.external,
        });
        match serde_json::to_vec_pretty(&snapshot) {
            Ok(body) => {
                if let Err(err) = std::fs::write(path, body) {
                    warn!("failed to write {}: {err}", path.display());
                }
            }
            Err(err) => warn!("failed to encode registry snapshot: {err}"),
        }
    }
}

fn view_of(entry: &TapeEntry) -> TapeView {
    TapeView {
        descriptor: entry.descriptor.clone(),
        state: entry.state,
        generation: entry.generation,
        inflight: entry.inflight.load(Ordering::SeqCst),
        last_access: entry.last_access.load(Ordering::SeqCst),
    }
}

/// Mount hooks: the manifest must still validate and the UI entry must
/// exist on disk.
fn mount_hooks(descriptor: &TapeDescriptor, _is_handler: &dyn Fn(&str) -> bool) -> HostResult<()> {
    let entry_path = descriptor.root.join(&descriptor.entry);
    if !entry_path.is_file() {
        host_bail!(
            ErrorKind::PathNotFound,
            "ui entry {} missing for tape {}",
            descriptor.entry,
            descriptor.id
        );
    }
    Ok(())
}

fn drain(counter: &AtomicU64, deadline: Duration) -> bool {
    let start = Instant::now();
    while counter.load(Ordering::SeqCst) > 0 {
        if start.elapsed() >= deadline {
            return false;
        }
        std::thread::sleep(DRAIN_POLL);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn any_handler(_: &str) -> bool {
        true
    }

    fn seed_tape(root: &Path, id: &str) {
        let dir = root.join(id);
        std::fs::create_dir_all(dir.join("public")).expect("mkdir");
        std::fs::write(
            dir.join(manifest::MANIFEST_FILE),
            serde_json::to_vec(&json!({
                "id": id,
                "name": id.to_uppercase(),
                "version": "1.0.0",
                "entry": "public/index.html",
            }))
            .expect("encode"),
        )
        .expect("write manifest");
        std::fs::write(dir.join("public/index.html"), "<html></html>").expect("write entry");
    }

    fn registry_for(root: &TempDir) -> TapeRegistry {
        TapeRegistry::new(
            root.path().to_path_buf(),
            true,
            None,
            "test-host".into(),
            HashMap::new(),
        )
    }

    #[test]
    fn scan_discovers_in_name_order() {
        let root = TempDir::new().expect("tempdir");
        seed_tape(root.path(), "zeta");
        seed_tape(root.path(), "alpha");
        let registry = registry_for(&root);
        let report = registry.scan(&any_handler).expect("scan");
        assert_eq!(report.discovered, vec!["alpha", "zeta"]);
        assert!(report.failures.is_empty());
        let listed: Vec<String> = registry.list().iter().map(|v| v.descriptor.id.clone()).collect();
        assert_eq!(listed, vec!["alpha", "zeta"]);
        assert_eq!(registry.get("alpha").expect("alpha").state, MountState::Mounted);
    }

    #[test]
    fn scan_records_failures_without_aborting() {
        let root = TempDir::new().expect("tempdir");
        seed_tape(root.path(), "good");
        std::fs::create_dir_all(root.path().join("broken")).expect("mkdir");
        std::fs::write(root.path().join("broken/tape.json"), "not json").expect("write");
        let registry = registry_for(&root);
        let report = registry.scan(&any_handler).expect("scan");
        assert_eq!(report.discovered, vec!["good"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, ErrorKind::ManifestParse);
    }

    #[test]
    fn mount_is_idempotent_and_bumps_generation_once() {
        let root = TempDir::new().expect("tempdir");
        seed_tape(root.path(), "alpha");
        let registry = registry_for(&root);
        registry.scan(&any_handler).expect("scan");
        let before = registry.get("alpha").expect("view").generation;
        let view = registry.mount("alpha", &any_handler).expect("mount");
        assert_eq!(view.generation, before);
        registry.unmount("alpha").expect("unmount");
        let view = registry.mount("alpha", &any_handler).expect("remount");
        assert_eq!(view.generation, before + 1);
    }

    #[test]
    fn unmount_waits_for_inflight_then_completes() {
        let root = TempDir::new().expect("tempdir");
        seed_tape(root.path(), "alpha");
        let registry = Arc::new(registry_for(&root));
        registry.scan(&any_handler).expect("scan");

        let guard = registry.begin_request("alpha").expect("guard");
        let worker = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                drop(guard);
                let _ = registry;
            })
        };
        registry.unmount("alpha").expect("unmount");
        worker.join().expect("join");
        let view = registry.get("alpha").expect("view");
        assert_eq!(view.state, MountState::Unmounted);
        assert_eq!(view.inflight, 0);
    }

    #[test]
    fn begin_request_refuses_unmounted_tapes() {
        let root = TempDir::new().expect("tempdir");
        seed_tape(root.path(), "alpha");
        let registry = registry_for(&root);
        registry.scan(&any_handler).expect("scan");
        registry.unmount("alpha").expect("unmount");
        let err = registry.begin_request("alpha").unwrap_err();
        assert_eq!(err.kind, ErrorKind::TapeBusy);
        assert_eq!(
            registry.begin_request("missing").unwrap_err().kind,
            ErrorKind::TapeNotFound
        );
    }

    #[test]
    fn rescan_drops_removed_tapes() {
        let root = TempDir::new().expect("tempdir");
        seed_tape(root.path(), "alpha");
        seed_tape(root.path(), "beta");
        let registry = registry_for(&root);
        registry.scan(&any_handler).expect("scan");
        std::fs::remove_dir_all(root.path().join("beta")).expect("rm");
        let report = registry.scan(&any_handler).expect("rescan");
        assert_eq!(report.removed, vec!["beta"]);
        assert!(registry.get("beta").is_none());
        assert!(registry.get("alpha").is_some());
    }

    #[test]
    fn snapshot_mirrors_registry() {
        let root = TempDir::new().expect("tempdir");
        seed_tape(root.path(), "alpha");
        let snapshot = root.path().join(SNAPSHOT_FILE);
        let registry = TapeRegistry::new(
            root.path().to_path_buf(),
            true,
            Some(snapshot.clone()),
            "test-host".into(),
            HashMap::new(),
        );
        registry.scan(&any_handler).expect("scan");
        let body: Value =
            serde_json::from_slice(&std::fs::read(&snapshot).expect("read")).expect("json");
        assert_eq!(body["tapes"]["alpha"]["status"], "mounted");
        assert_eq!(body["host"], "test-host");
    }
}
