//! Shared storage detection
//!
//! Tharnax clusters may come with an NFS export prepared by the node
//! installer. When one is present, generated volumes ask for
//! `ReadWriteMany` so several pods can mount them; otherwise they fall back
//! to `ReadWriteOnce`.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::storage::StorageConfig;

/// Volume access mode requested by generated Helm values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageMode {
    Shared,
    SingleWriter,
}

impl StorageMode {
    pub fn access_mode(self) -> &'static str {
        match self {
            StorageMode::Shared => "ReadWriteMany",
            StorageMode::SingleWriter => "ReadWriteOnce",
        }
    }
}

/// Filesystem locations that indicate shared storage
#[derive(Debug, Clone)]
pub struct StorageProbe {
    exports_file: PathBuf,
    candidate_dirs: Vec<PathBuf>,
}

impl StorageProbe {
    pub fn new(exports_file: impl Into<PathBuf>, candidate_dirs: Vec<PathBuf>) -> Self {
        Self {
            exports_file: exports_file.into(),
            candidate_dirs,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.exports_file.clone(), config.candidate_dirs.clone())
    }

    pub fn detect(&self) -> StorageMode {
        if has_exports(&self.exports_file) {
            tracing::debug!(file = %self.exports_file.display(), "Shared storage found via exports file");
            return StorageMode::Shared;
        }

        match self.candidate_dirs.iter().find(|dir| is_usable_share(dir)) {
            Some(dir) => {
                tracing::debug!(dir = %dir.display(), "Shared storage found via mount directory");
                StorageMode::Shared
            }
            None => StorageMode::SingleWriter,
        }
    }
}

/// Exports file with at least one active export line
fn has_exports(path: &Path) -> bool {
    std::fs::read_to_string(path)
        .map(|content| {
            content
                .lines()
                .map(str::trim)
                .any(|line| !line.is_empty() && !line.starts_with('#'))
        })
        .unwrap_or(false)
}

fn is_usable_share(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }

    let non_empty = std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false);

    non_empty || is_mount_point(dir)
}

#[cfg(unix)]
fn is_mount_point(dir: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Some(parent) = dir.parent() else {
        return false;
    };

    match (std::fs::metadata(dir), std::fs::metadata(parent)) {
        (Ok(d), Ok(p)) => d.dev() != p.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_mount_point(_dir: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_storage_is_single_writer() {
        let tmp = tempfile::tempdir().unwrap();
        let probe = StorageProbe::new(
            tmp.path().join("exports"),
            vec![tmp.path().join("missing")],
        );
        assert_eq!(probe.detect(), StorageMode::SingleWriter);
    }

    #[test]
    fn test_exports_file_with_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let exports = tmp.path().join("exports");
        std::fs::write(&exports, "# comment\n/srv/nfs *(rw,sync,no_subtree_check)\n").unwrap();

        let probe = StorageProbe::new(exports, Vec::new());
        assert_eq!(probe.detect(), StorageMode::Shared);
    }

    #[test]
    fn test_exports_file_only_comments() {
        let tmp = tempfile::tempdir().unwrap();
        let exports = tmp.path().join("exports");
        std::fs::write(&exports, "# /srv/nfs *(rw)\n\n").unwrap();

        let probe = StorageProbe::new(exports, Vec::new());
        assert_eq!(probe.detect(), StorageMode::SingleWriter);
    }

    #[test]
    fn test_non_empty_candidate_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let share = tmp.path().join("nfs");
        std::fs::create_dir(&share).unwrap();
        std::fs::write(share.join("media.txt"), "x").unwrap();

        let probe = StorageProbe::new(
            tmp.path().join("exports"),
            vec![tmp.path().join("missing"), share],
        );
        assert_eq!(probe.detect(), StorageMode::Shared);
    }

    #[test]
    fn test_empty_candidate_dir_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let share = tmp.path().join("nfs");
        std::fs::create_dir(&share).unwrap();

        let probe = StorageProbe::new(tmp.path().join("exports"), vec![share]);
        assert_eq!(probe.detect(), StorageMode::SingleWriter);
    }

    #[test]
    fn test_access_modes() {
        assert_eq!(StorageMode::Shared.access_mode(), "ReadWriteMany");
        assert_eq!(StorageMode::SingleWriter.access_mode(), "ReadWriteOnce");
    }
}
