//! Default values for metabuild configuration.
//!
//! This module provides centralized default values used by the manifest
//! loader and the commands, ensuring consistency and avoiding duplication.

use std::path::{Path, PathBuf};
use std::thread;

/// Default name of the manifest looked up in the current directory.
pub const MANIFEST_FILE: &str = "metabuild.yaml";

/// Returns the default log directory for a build rooted at `base`.
pub fn default_log_dir(base: &Path) -> PathBuf {
    base.join("log")
}

/// Returns the default directory where archives are downloaded.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/metabuild/archives` (XDG Base Directory)
/// - macOS: `~/Library/Caches/metabuild/archives`
/// - Windows: `{FOLDERID_LocalAppData}\metabuild\archives`
///
/// Falls back to `.metabuild-cache` in the current directory if the
/// platform cache directory cannot be determined.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("metabuild"))
        .unwrap_or_else(|| PathBuf::from(".metabuild-cache"))
        .join("archives")
}

/// Number of parallel build jobs, one per available CPU.
pub fn default_jobs() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
