//! Upload stage: push one run's files to object storage and finalize the
//! result into a canonical manifest.

use std::fs;
use std::path::{Path, PathBuf};

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::contract::RunUploader;
use crate::discover::RunDirectory;
use crate::error::StageError;

/// Deduplicated, lexicographically sorted object locations for one run.
/// Canonical order is sorted, never upload-completion or insertion order,
/// so re-runs and retries converge on an identical manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadManifest {
    pub run_name: String,
    locations: Vec<String>,
}

impl UploadManifest {
    /// Finalize raw uploader output: sort, then drop duplicates. Duplicate
    /// locations from retried uploads are absorbed here.
    pub fn finalize(run_name: &str, mut raw: Vec<String>) -> Self {
        raw.sort();
        raw.dedup();
        UploadManifest {
            run_name: run_name.to_string(),
            locations: raw,
        }
    }

    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    pub fn first(&self) -> Option<&str> {
        self.locations.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Write the manifest to `<dir>/<run>.manifest`, one location per line.
    pub fn persist(&self, dir: &Path) -> std::io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.manifest", self.run_name));
        let mut body = self.locations.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        fs::write(&path, body)?;
        debug!(run = %self.run_name, path = %path.display(), "Persisted upload manifest");
        Ok(path)
    }
}

/// Upload every file directly under the run directory and finalize the
/// manifest. Enumeration is flat and unordered; the per-file uploads have no
/// inter-file dependency and run concurrently. Any single failure aborts
/// this run's upload stage and only this run's.
pub async fn upload_run<U: RunUploader>(
    uploader: &U,
    run: &RunDirectory,
) -> Result<UploadManifest, StageError> {
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(&run.path)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    if files.is_empty() {
        warn!(run = %run.name, "Run directory contains no files");
    }
    info!(run = %run.name, files = files.len(), "Starting uploads for run");

    let uploads = files.iter().map(|file| async move {
        let location = uploader
            .upload_file(file)
            .await
            .map_err(|e| StageError::UploadFailure {
                file: file.clone(),
                detail: e.to_string(),
            })?;
        debug!(run = %run.name, file = %file.display(), location = %location, "Uploaded object");
        Ok::<String, StageError>(location)
    });
    let raw = try_join_all(uploads).await?;

    let manifest = UploadManifest::finalize(&run.name, raw);
    info!(run = %run.name, objects = manifest.len(), "Finalized upload manifest");
    Ok(manifest)
}
