//! Run-directory discovery: a one-shot snapshot taken before any stage runs.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

/// Naming convention for sequencing-run directories.
pub const RUN_DIR_PREFIX: &str = "run_";

/// One discovered run. The directory set is read-only for the remainder of
/// the pipeline: files inside may be listed, but the set itself is never
/// re-scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectory {
    pub name: String,
    pub path: PathBuf,
}

/// List immediate subdirectories of `root` matching the run-name convention,
/// sorted by name. Directories created after this snapshot are not picked up
/// by the current invocation.
pub fn discover_runs(root: &Path) -> std::io::Result<Vec<RunDirectory>> {
    let mut runs = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(RUN_DIR_PREFIX) {
            runs.push(RunDirectory {
                name,
                path: entry.path(),
            });
        }
    }
    runs.sort_by(|a, b| a.name.cmp(&b.name));
    info!(root = %root.display(), count = runs.len(), "Discovered run directories");
    Ok(runs)
}
