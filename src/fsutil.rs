// src/fsutil.rs

//! Filesystem primitives for the transactional engine
//!
//! Path sanitization for archive entries, the stored-path convention of the
//! state database, shadow renames, bounded-retry deletion, and empty parent
//! pruning.

use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Reserved prefix marking a stored path as absolute (outside the root)
pub const FULL_PATH_PREFIX: char = '*';

/// Suffix stem used for shadow names generated beside an original file
const SHADOW_STEM: &str = ".cabsave-";

/// Bound on the shadow-name counter
const MAX_SHADOW_ATTEMPTS: u32 = 10_000;

/// Deletion retry attempts for transiently locked files
const DELETE_ATTEMPTS: u32 = 3;

/// Delay between deletion attempts
const DELETE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Sanitize a relative path taken from an untrusted cabinet entry.
///
/// Rejects `..` components, drops `.` and root markers, strips leading
/// slashes, and rejects the empty result. Malicious archives must not be
/// able to write outside the install root.
pub fn sanitize_rel_path(path: &str) -> Result<PathBuf> {
    let relative = path.trim_start_matches('/');
    let mut normalized = PathBuf::new();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::Malformed(format!(
                    "path traversal in archive entry: {path}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::Malformed(format!("empty archive entry path: {path}")));
    }

    Ok(normalized)
}

/// True when a stored path carries the absolute-path marker
pub fn is_external_path(stored: &str) -> bool {
    stored.starts_with(FULL_PATH_PREFIX)
}

/// Map a path as stored in the state database to a filesystem path.
///
/// Relative entries join the install root; entries with the reserved
/// prefix are absolute paths outside the root.
pub fn stored_to_absolute(root: &Path, stored: &str) -> PathBuf {
    match stored.strip_prefix(FULL_PATH_PREFIX) {
        Some(absolute) => PathBuf::from(absolute),
        None => root.join(stored),
    }
}

/// Rename a file to a fresh shadow name in its own directory.
///
/// Returns the shadow path, or `None` when the original does not exist
/// (an acceptable outcome for backup). The counter is bumped until an
/// unused name is found, so shadow names never collide.
pub fn rename_to_shadow(original: &Path) -> Result<Option<PathBuf>> {
    let file_name = original
        .file_name()
        .ok_or_else(|| Error::IoError(format!("no file name in {}", original.display())))?
        .to_string_lossy()
        .into_owned();

    for n in 1..=MAX_SHADOW_ATTEMPTS {
        let shadow = original.with_file_name(format!("{file_name}{SHADOW_STEM}{n}"));
        if shadow.exists() {
            continue;
        }
        return match fs::rename(original, &shadow) {
            Ok(()) => {
                debug!("shadowed {} as {}", original.display(), shadow.display());
                Ok(Some(shadow))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::IoError(format!(
                "failed to rename {} to {}: {e}",
                original.display(),
                shadow.display()
            ))),
        };
    }

    Err(Error::IoError(format!(
        "no free shadow name beside {}",
        original.display()
    )))
}

/// Delete a file, retrying a few times to tolerate transient sharing locks.
///
/// A missing file counts as deleted.
pub fn delete_with_retry(path: &Path) -> Result<()> {
    let mut last_err = None;
    for attempt in 0..DELETE_ATTEMPTS {
        match fs::remove_file(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                last_err = Some(e);
                if attempt < DELETE_ATTEMPTS - 1 {
                    std::thread::sleep(DELETE_RETRY_DELAY);
                }
            }
        }
    }
    match last_err {
        Some(e) => Err(Error::IoError(format!(
            "failed to delete {}: {e}",
            path.display()
        ))),
        None => Ok(()),
    }
}

/// Remove now-empty parent directories of a deleted file.
///
/// Walks upward from the file's parent, stopping at the install root or at
/// the first directory that is not empty.
pub fn prune_empty_parents(deleted: &Path, stop: &Path) {
    let mut dir = deleted.parent();
    while let Some(d) = dir {
        if d == stop || !d.starts_with(stop) {
            break;
        }
        match fs::remove_dir(d) {
            Ok(()) => debug!("pruned empty directory {}", d.display()),
            Err(_) => break,
        }
        dir = d.parent();
    }
}

/// Whether the OS has queued this path for deletion at next boot.
///
/// This host has no boot-time delete queue, so nothing is ever pending;
/// the orchestrator still consults the check before every extracted file.
pub fn scheduled_for_delete(_path: &Path) -> bool {
    false
}

/// Best-effort removal of a shadow file after commit
pub fn discard_shadow(shadow: &Path) {
    if let Err(e) = delete_with_retry(shadow) {
        warn!("leaving shadow file behind: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_rejects_traversal() {
        assert!(sanitize_rel_path("../etc/passwd").is_err());
        assert!(sanitize_rel_path("usr/../../etc/passwd").is_err());
        assert!(sanitize_rel_path("").is_err());
    }

    #[test]
    fn test_sanitize_normalizes() {
        assert_eq!(
            sanitize_rel_path("/bin/./ex").unwrap(),
            PathBuf::from("bin/ex")
        );
        assert_eq!(
            sanitize_rel_path("share/ex.dat").unwrap(),
            PathBuf::from("share/ex.dat")
        );
    }

    #[test]
    fn test_stored_path_mapping() {
        let root = Path::new("/opt/apps");
        assert_eq!(
            stored_to_absolute(root, "bin/ex"),
            PathBuf::from("/opt/apps/bin/ex")
        );
        assert_eq!(
            stored_to_absolute(root, "*/etc/shared.conf"),
            PathBuf::from("/etc/shared.conf")
        );
        assert!(is_external_path("*/etc/shared.conf"));
        assert!(!is_external_path("bin/ex"));
    }

    #[test]
    fn test_shadow_rename_and_uniqueness() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("ex.bin");

        std::fs::write(&original, b"one").unwrap();
        let first = rename_to_shadow(&original).unwrap().unwrap();
        assert!(first.exists());
        assert!(!original.exists());

        std::fs::write(&original, b"two").unwrap();
        let second = rename_to_shadow(&original).unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
    }

    #[test]
    fn test_shadow_rename_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent");
        assert_eq!(rename_to_shadow(&absent).unwrap(), None);
    }

    #[test]
    fn test_delete_with_retry_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(delete_with_retry(&dir.path().join("absent")).is_ok());
    }

    #[test]
    fn test_prune_stops_at_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let nested = root.join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join("a/keep.txt"), b"x").unwrap();

        let deleted = nested.join("file");
        std::fs::write(&deleted, b"x").unwrap();
        std::fs::remove_file(&deleted).unwrap();
        prune_empty_parents(&deleted, root);

        assert!(!root.join("a/b").exists());
        assert!(root.join("a").exists());
    }

    #[test]
    fn test_prune_stops_at_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let file = root.join("only");
        std::fs::write(&file, b"x").unwrap();
        std::fs::remove_file(&file).unwrap();
        prune_empty_parents(&file, root);
        assert!(root.exists());
    }
}
