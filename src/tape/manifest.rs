// CLASSIFICATION: COMMUNITY
// Filename: manifest.rs v0.8
// Author: Lukas Bower
// Date Modified: 2026-06-09

//! Tape manifest loader. A tape directory carries a `tape.json` at its
//! root; this module reads it, validates every field, and produces the
//! immutable descriptor the registry owns. Errors name the first
//! failure. Unknown manifest fields are ignored for forward
//! compatibility.

use crate::error::{ErrorKind, HostResult};
use crate::host_bail;
use crate::sandbox;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Manifest file name at the tape root. Interop contract.
pub const MANIFEST_FILE: &str = "tape.json";

/// Semantic version, MAJOR.MINOR.PATCH with non-negative integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let mut take = || -> Result<u32, ()> {
            parts.next().ok_or(())?.parse::<u32>().map_err(|_| ())
        };
        let version = Version {
            major: take()?,
            minor: take()?,
            patch: take()?,
        };
        if parts.next().is_some() {
            return Err(());
        }
        Ok(version)
    }
}

/// Where a tape's API lives: a registered handler, or a remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiEndpoint {
    LocalHandler(String),
    RemoteHttp(String),
}

impl ApiEndpoint {
    pub fn as_str(&self) -> &str {
        match self {
            ApiEndpoint::LocalHandler(name) => name,
            ApiEndpoint::RemoteHttp(url) => url,
        }
    }
}

/// Declared capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Ui,
    Api,
    Agents,
    Dataset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilesystemPermission {
    None,
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPermission {
    None,
    Loopback,
    Any,
}

/// Declared tape permissions. Absent manifest sections get the
/// conservative defaults below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default = "default_filesystem")]
    pub filesystem: FilesystemPermission,
    #[serde(default = "default_network")]
    pub network: NetworkPermission,
    #[serde(default)]
    pub shell: bool,
}

fn default_filesystem() -> FilesystemPermission {
    FilesystemPermission::ReadOnly
}

fn default_network() -> NetworkPermission {
    NetworkPermission::Loopback
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            filesystem: default_filesystem(),
            network: default_network(),
            shell: false,
        }
    }
}

/// Declared agent entry in a manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDecl {
    pub id: String,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TapeMeta {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Raw on-disk manifest shape. Field names are the interop contract.
#[derive(Debug, Deserialize)]
struct RawManifest {
    id: String,
    name: String,
    version: String,
    entry: String,
    #[serde(default)]
    api: Option<String>,
    #[serde(default)]
    agents: Vec<AgentDecl>,
    #[serde(default)]
    capabilities: Vec<Value>,
    #[serde(default)]
    permissions: Option<Permissions>,
    #[serde(default)]
    meta: Option<TapeMeta>,
}

/// Parsed, validated, immutable record of a tape's manifest.
#[derive(Debug, Clone)]
pub struct TapeDescriptor {
    pub id: String,
    pub name: String,
    pub version: Version,
    pub root: PathBuf,
    pub entry: String,
    pub api: Option<ApiEndpoint>,
    pub agents: Vec<AgentDecl>,
    pub capabilities: Vec<Capability>,
    pub permissions: Permissions,
    pub meta: TapeMeta,
}

impl TapeDescriptor {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "version": self.version.to_string(),
            "entry": self.entry,
            "api": self.api.as_ref().map(|a| a.as_str().to_string()),
            "agents": self.agents,
            "capabilities": self.capabilities,
            "permissions": self.permissions,
            "meta": self.meta,
        })
    }
}

/// Load and validate the manifest found in `dir`.
///
/// `is_handler` decides whether a bare `api` value names a registered
/// local handler; anything else must parse as an absolute URL.
pub fn load(dir: &Path, is_handler: &dyn Fn(&str) -> bool) -> HostResult<TapeDescriptor> {
    let path = dir.join(MANIFEST_FILE);
    if !path.is_file() {
        host_bail!(
            ErrorKind::ManifestMissing,
            "no {MANIFEST_FILE} in {}",
            dir.display()
        );
    }
    let text = std::fs::read_to_string(&path)
        .map_err(|e| crate::host_err!(ErrorKind::ManifestParse, "unreadable manifest: {e}"))?;
    let raw: RawManifest = serde_json::from_str(&text)
        .map_err(|e| crate::host_err!(ErrorKind::ManifestParse, "malformed manifest: {e}"))?;

    if !valid_id(&raw.id) {
        host_bail!(
            ErrorKind::ManifestInvalidField,
            "id {:?} must be lowercase alphanumeric with dashes",
            raw.id
        );
    }
    if raw.name.trim().is_empty() {
        host_bail!(ErrorKind::ManifestInvalidField, "name must be non-empty");
    }
    let version = Version::from_str(&raw.version).map_err(|_| {
        crate::host_err!(
            ErrorKind::ManifestInvalidField,
            "version {:?} must be MAJOR.MINOR.PATCH",
            raw.version
        )
    })?;
    if raw.entry.trim().is_empty() {
        host_bail!(ErrorKind::ManifestInvalidField, "entry must be non-empty");
    }
    match sandbox::safe_join(dir, &raw.entry) {
        Ok(_) => {}
        Err(_) => host_bail!(
            ErrorKind::ManifestEscape,
            "entry {:?} resolves outside the tape root",
            raw.entry
        ),
    }

    let api = match raw.api.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(value) => Some(classify_api(value, is_handler)?),
    };

    let mut capabilities = Vec::with_capacity(raw.capabilities.len());
    for cap in &raw.capabilities {
        match serde_json::from_value::<Capability>(cap.clone()) {
            Ok(parsed) => capabilities.push(parsed),
            Err(_) => host_bail!(
                ErrorKind::ManifestInvalidField,
                "unknown capability {cap}"
            ),
        }
    }

    for agent in &raw.agents {
        if agent.id.trim().is_empty() {
            host_bail!(ErrorKind::ManifestInvalidField, "agent id must be non-empty");
        }
    }

    Ok(TapeDescriptor {
        id: raw.id,
        name: raw.name,
        version,
        root: dir.to_path_buf(),
        entry: raw.entry,
        api,
        agents: raw.agents,
        capabilities,
        permissions: raw.permissions.unwrap_or_default(),
        meta: raw.meta.unwrap_or_default(),
    })
}

fn classify_api(value: &str, is_handler: &dyn Fn(&str) -> bool) -> HostResult<ApiEndpoint> {
    if value.starts_with("http://") || value.starts_with("https://") {
        let after_scheme = value.splitn(2, "://").nth(1).unwrap_or("");
        let host = after_scheme.split('/').next().unwrap_or("");
        if host.is_empty() {
            host_bail!(
                ErrorKind::ManifestInvalidField,
                "api URL {value:?} has no host"
            );
        }
        return Ok(ApiEndpoint::RemoteHttp(value.to_string()));
    }
    let handler_shaped = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if handler_shaped && is_handler(value) {
        return Ok(ApiEndpoint::LocalHandler(value.to_string()));
    }
    host_bail!(
        ErrorKind::ManifestInvalidField,
        "api {value:?} is neither a registered handler nor an absolute URL"
    );
}

fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('-')
        && !id.ends_with('-')
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn write_manifest(dir: &Path, manifest: &Value) {
        std::fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(manifest).expect("encode"),
        )
        .expect("write manifest");
    }

    fn any_handler(_: &str) -> bool {
        true
    }

    #[test]
    fn minimal_manifest_loads() {
        let dir = tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            &json!({
                "id": "alpha",
                "name": "Alpha",
                "version": "1.0.0",
                "entry": "public/index.html",
                "unknown_future_field": 42
            }),
        );
        let descriptor = load(dir.path(), &any_handler).expect("load");
        assert_eq!(descriptor.id, "alpha");
        assert_eq!(descriptor.version.to_string(), "1.0.0");
        assert!(descriptor.api.is_none());
        assert_eq!(
            descriptor.permissions.network,
            NetworkPermission::Loopback
        );
    }

    #[test]
    fn missing_manifest_is_typed() {
        let dir = tempdir().expect("tempdir");
        let err = load(dir.path(), &any_handler).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ManifestMissing);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join(MANIFEST_FILE), "{ nope").expect("write");
        let err = load(dir.path(), &any_handler).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ManifestParse);
    }

    #[test]
    fn bad_id_and_version_are_invalid_fields() {
        let dir = tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            &json!({"id": "Alpha!", "name": "A", "version": "1.0.0", "entry": "ui.html"}),
        );
        assert_eq!(
            load(dir.path(), &any_handler).unwrap_err().kind,
            ErrorKind::ManifestInvalidField
        );
        write_manifest(
            dir.path(),
            &json!({"id": "alpha", "name": "A", "version": "1.0", "entry": "ui.html"}),
        );
        assert_eq!(
            load(dir.path(), &any_handler).unwrap_err().kind,
            ErrorKind::ManifestInvalidField
        );
    }

    #[test]
    fn escaping_entry_is_rejected() {
        let dir = tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            &json!({
                "id": "alpha",
                "name": "Alpha",
                "version": "1.0.0",
                "entry": "../outside/index.html"
            }),
        );
        let err = load(dir.path(), &any_handler).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ManifestEscape);
    }

    #[test]
    fn api_classification() {
        let dir = tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            &json!({
                "id": "alpha", "name": "Alpha", "version": "1.0.0",
                "entry": "index.html", "api": "http://127.0.0.1:9000/run"
            }),
        );
        let descriptor = load(dir.path(), &any_handler).expect("load");
        assert!(matches!(descriptor.api, Some(ApiEndpoint::RemoteHttp(_))));

        write_manifest(
            dir.path(),
            &json!({
                "id": "alpha", "name": "Alpha", "version": "1.0.0",
                "entry": "index.html", "api": "ping"
            }),
        );
        let registered = |name: &str| name == "ping";
        let descriptor = load(dir.path(), &registered).expect("load");
        assert_eq!(
            descriptor.api,
            Some(ApiEndpoint::LocalHandler("ping".into()))
        );

        // Neither a registered handler nor a URL: ambiguous.
        let none_registered = |_: &str| false;
        let err = load(dir.path(), &none_registered).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ManifestInvalidField);
    }

    #[test]
    fn unknown_capability_is_rejected() {
        let dir = tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            &json!({
                "id": "alpha", "name": "Alpha", "version": "1.0.0",
                "entry": "index.html", "capabilities": ["ui", "telepathy"]
            }),
        );
        let err = load(dir.path(), &any_handler).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ManifestInvalidField);
    }
}
