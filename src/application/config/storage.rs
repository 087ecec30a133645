use std::env;
use std::path::PathBuf;

/// Where to look for shared (NFS) storage on the host
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// NFS export list (env: `THARNAX_NFS_EXPORTS_FILE`)
    pub exports_file: PathBuf,
    /// Candidate mount directories, checked in order (env: `THARNAX_NFS_CANDIDATE_DIRS`)
    pub candidate_dirs: Vec<PathBuf>,
}

const DEFAULT_CANDIDATE_DIRS: &str = "/mnt/nfs,/srv/nfs,/export,/nfs";

impl StorageConfig {
    pub fn from_env() -> Self {
        let candidate_dirs = env::var("THARNAX_NFS_CANDIDATE_DIRS")
            .unwrap_or_else(|_| DEFAULT_CANDIDATE_DIRS.to_string())
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();

        Self {
            exports_file: PathBuf::from(
                env::var("THARNAX_NFS_EXPORTS_FILE").unwrap_or_else(|_| "/etc/exports".to_string()),
            ),
            candidate_dirs,
        }
    }
}
