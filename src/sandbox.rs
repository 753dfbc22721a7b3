// CLASSIFICATION: COMMUNITY
// Filename: sandbox.rs v0.7
// Author: Lukas Bower
// Date Modified: 2026-06-02

//! Path confinement for every filesystem handler. All `fs_*` operations
//! funnel through [`safe_join`]; a path that leaves the configured root
//! after normalisation is rejected with `path-escape`, symlink targets
//! included.

use crate::error::{ErrorKind, HostResult};
use crate::host_bail;
use std::path::{Component, Path, PathBuf};

/// Resolve `input` against `root` and confine the result to `root`.
///
/// Normalisation is lexical first (`.` dropped, `..` popped, doubled
/// separators collapsed by the component walk); absolute inputs are
/// accepted only when they already sit under the root. When the resolved
/// path or one of its ancestors exists on disk, symlinks are chased and
/// the canonical form is checked against the canonical root as well.
pub fn safe_join(root: &Path, input: &str) -> HostResult<PathBuf> {
    let candidate = Path::new(input);
    let mut resolved = root.to_path_buf();
    let mut depth: usize = 0;
    for component in candidate.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                // Absolute input: restart from the filesystem root and
                // rely on the prefix check below.
                resolved = PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
                depth = 0;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    host_bail!(
                        ErrorKind::PathEscape,
                        "path {input} escapes the sandbox root"
                    );
                }
                resolved.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
        }
    }

    if !resolved.starts_with(root) {
        host_bail!(
            ErrorKind::PathEscape,
            "path {input} escapes the sandbox root"
        );
    }

    // Symlink traversal: canonicalise the deepest existing ancestor and
    // verify it still sits under the canonical root.
    let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let mut probe = resolved.clone();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    loop {
        if probe.exists() {
            match probe.canonicalize() {
                Ok(mut canonical) => {
                    for part in tail.iter().rev() {
                        canonical.push(part);
                    }
                    if !canonical.starts_with(&canonical_root) {
                        host_bail!(
                            ErrorKind::PathEscape,
                            "path {input} escapes the sandbox root"
                        );
                    }
                }
                Err(_) => {}
            }
            break;
        }
        match (probe.file_name().map(|n| n.to_os_string()), probe.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name);
                probe = parent.to_path_buf();
            }
            _ => break,
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn plain_relative_paths_resolve_inside_root() {
        let dir = tempdir().expect("tempdir");
        let joined = safe_join(dir.path(), "notes/today.txt").expect("join");
        assert!(joined.starts_with(dir.path()));
        assert!(joined.ends_with("notes/today.txt"));
    }

    #[test]
    fn parent_traversal_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let err = safe_join(dir.path(), "../../etc/passwd").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathEscape);
    }

    #[test]
    fn interior_dotdot_stays_confined() {
        let dir = tempdir().expect("tempdir");
        let joined = safe_join(dir.path(), "a/b/../c.txt").expect("join");
        assert!(joined.ends_with("a/c.txt"));
    }

    #[test]
    fn absolute_path_outside_root_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let err = safe_join(dir.path(), "/etc/passwd").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathEscape);
    }

    #[test]
    fn doubled_separators_collapse() {
        let dir = tempdir().expect("tempdir");
        let joined = safe_join(dir.path(), "a//b.txt").expect("join");
        assert!(joined.ends_with("a/b.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_root_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let outside = tempdir().expect("outside");
        std::os::unix::fs::symlink(outside.path(), dir.path().join("leak")).expect("symlink");
        let err = safe_join(dir.path(), "leak/secret.txt").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathEscape);
    }
}
