//! High-level pipeline: orchestrates provisioning, run discovery and the
//! per-run upload → package → metadata progression.
//!
//! # Responsibilities
//! - Sequences the one-time bucket-provisioning precondition ahead of all
//!   per-run work.
//! - Snapshots the run-directory set once, then drives every run through
//!   its stage sequence independently and concurrently.
//! - Isolates failures: a failed run is recorded and never blocks or fails
//!   sibling runs. Whether any failed run fails the whole process is the
//!   caller's policy, applied to the returned report.
//!
//! # Error Handling
//! Only process-fatal setup failures (provisioning, discovery I/O) come back
//! as `Err`; everything per-run lands in the [`PipelineReport`].
//!
//! # Navigation
//! - Main entrypoints: [`execute`] (provision + discover + drive) and
//!   [`run_pipeline`] (drive an already-discovered run set).

use std::fmt;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::contract::{MetadataAttacher, MetadataSource, PackageBuilder, RunUploader, ToolRunner};
use crate::discover::{discover_runs, RunDirectory};
use crate::error::PipelineError;
use crate::metadata::{attach_metadata, MetadataOutcome};
use crate::package::{package_run, Package};
use crate::provision::Provisioner;
use crate::resolve::BucketSpec;
use crate::upload::upload_run;

/// Stage a run failed in. `Failed` is reachable from these two stages only;
/// metadata problems degrade to a skipped attachment instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum StageKind {
    Upload,
    Package,
}

/// Per-run progression.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum RunState {
    Discovered,
    Uploading,
    Uploaded,
    Packaging,
    Packaged,
    MetadataPending,
    MetadataAttached,
    MetadataSkipped,
    Done,
    Failed(StageKind),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Discovered => "discovered",
            RunState::Uploading => "uploading",
            RunState::Uploaded => "uploaded",
            RunState::Packaging => "packaging",
            RunState::Packaged => "packaged",
            RunState::MetadataPending => "metadata-pending",
            RunState::MetadataAttached => "metadata-attached",
            RunState::MetadataSkipped => "metadata-skipped",
            RunState::Done => "done",
            RunState::Failed(StageKind::Upload) => "failed(upload)",
            RunState::Failed(StageKind::Package) => "failed(package)",
        };
        f.write_str(s)
    }
}

/// Metadata attachment settings; present only when attachment is enabled
/// globally.
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    pub source: MetadataSource,
    pub entity: String,
}

/// The top-level pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub namespace: String,
    pub registry: String,
    /// Package message; a default mentioning the entry count is used when
    /// unset.
    pub message: Option<String>,
    pub metadata: Option<MetadataConfig>,
    /// Where to persist per-run manifests; skipped when unset.
    pub manifest_dir: Option<PathBuf>,
    /// Whether any failed run should fail the whole process.
    pub fail_on_run_error: bool,
}

/// Terminal record for one run.
#[derive(Debug, serde::Serialize)]
pub struct RunReport {
    pub run_name: String,
    pub state: RunState,
    pub objects: usize,
    pub package: Option<Package>,
    pub metadata: Option<MetadataOutcome>,
    pub error: Option<String>,
}

/// Output report across all runs, for downstream audit and the caller's
/// exit-status policy.
#[derive(Debug, serde::Serialize)]
pub struct PipelineReport {
    pub runs: Vec<RunReport>,
}

impl PipelineReport {
    pub fn failed(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| matches!(r.state, RunState::Failed(_)))
            .count()
    }

    pub fn any_failed(&self) -> bool {
        self.failed() > 0
    }
}

/// Full pipeline: ensure the buckets exist, snapshot the run directories,
/// then drive every run. The provisioning precondition completes before any
/// run's upload begins.
pub async fn execute<R, U, P, M>(
    cfg: &PipelineConfig,
    provisioner: &Provisioner<'_, R>,
    spec: &BucketSpec,
    data_root: &Path,
    uploader: &U,
    builder: &P,
    attacher: &M,
) -> Result<PipelineReport, PipelineError>
where
    R: ToolRunner,
    U: RunUploader,
    P: PackageBuilder,
    M: MetadataAttacher,
{
    let invocation = Uuid::new_v4();
    info!(%invocation, bucket = %spec.bucket, "[PIPELINE] Starting pipeline");

    provisioner.ensure_buckets(spec).await?;
    info!("[PIPELINE] Bucket provisioning complete");

    let runs = discover_runs(data_root)?;
    if runs.is_empty() {
        warn!(root = %data_root.display(), "[PIPELINE] No run directories found; nothing to do");
    }

    let report = run_pipeline(cfg, uploader, builder, attacher, runs).await;
    info!(
        %invocation,
        runs = report.runs.len(),
        failed = report.failed(),
        "[PIPELINE] Pipeline finished"
    );
    Ok(report)
}

/// Drive an already-discovered run set. Runs execute independently and
/// concurrently; within one run the stages are strictly sequential.
pub async fn run_pipeline<U, P, M>(
    cfg: &PipelineConfig,
    uploader: &U,
    builder: &P,
    attacher: &M,
    runs: Vec<RunDirectory>,
) -> PipelineReport
where
    U: RunUploader,
    P: PackageBuilder,
    M: MetadataAttacher,
{
    let reports = join_all(
        runs.into_iter()
            .map(|run| drive_run(cfg, uploader, builder, attacher, run)),
    )
    .await;
    PipelineReport { runs: reports }
}

async fn drive_run<U, P, M>(
    cfg: &PipelineConfig,
    uploader: &U,
    builder: &P,
    attacher: &M,
    run: RunDirectory,
) -> RunReport
where
    U: RunUploader,
    P: PackageBuilder,
    M: MetadataAttacher,
{
    let mut state = RunState::Discovered;
    info!(run = %run.name, state = %state, "[RUN] Run entering pipeline");

    state = RunState::Uploading;
    info!(run = %run.name, state = %state, "[RUN] Upload stage starting");
    let manifest = match upload_run(uploader, &run).await {
        Ok(manifest) => manifest,
        Err(e) => {
            error!(run = %run.name, error = %e, "[RUN][ERROR] Upload stage failed");
            return RunReport {
                run_name: run.name,
                state: RunState::Failed(StageKind::Upload),
                objects: 0,
                package: None,
                metadata: None,
                error: Some(e.to_string()),
            };
        }
    };
    state = RunState::Uploaded;
    info!(run = %run.name, state = %state, objects = manifest.len(), "[RUN] Upload stage complete");

    if let Some(dir) = &cfg.manifest_dir {
        if let Err(e) = manifest.persist(dir) {
            warn!(run = %run.name, error = %e, "[RUN] Could not persist manifest; continuing");
        }
    }

    state = RunState::Packaging;
    info!(run = %run.name, state = %state, "[RUN] Package stage starting");
    let package = match package_run(
        builder,
        &manifest,
        &cfg.namespace,
        &cfg.registry,
        cfg.message.as_deref(),
    )
    .await
    {
        Ok(package) => package,
        Err(e) => {
            error!(run = %run.name, error = %e, "[RUN][ERROR] Package stage failed");
            return RunReport {
                run_name: run.name,
                state: RunState::Failed(StageKind::Package),
                objects: manifest.len(),
                package: None,
                metadata: None,
                error: Some(e.to_string()),
            };
        }
    };
    state = RunState::Packaged;
    info!(run = %run.name, state = %state, package = %package.identifier, "[RUN] Package stage complete");

    let metadata = match &cfg.metadata {
        Some(meta) => {
            info!(run = %run.name, state = %RunState::MetadataPending, "[RUN] Metadata stage starting");
            let outcome = match attach_metadata(attacher, &meta.source, &meta.entity, &package).await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(run = %run.name, error = %e, "[RUN] Metadata attachment failed; run continues");
                    MetadataOutcome::Skipped
                }
            };
            let settled = match outcome {
                MetadataOutcome::Attached => RunState::MetadataAttached,
                MetadataOutcome::Skipped => RunState::MetadataSkipped,
            };
            info!(run = %run.name, state = %settled, "[RUN] Metadata stage settled");
            Some(outcome)
        }
        None => None,
    };

    state = RunState::Done;
    let report = RunReport {
        run_name: run.name,
        state,
        objects: manifest.len(),
        package: Some(package),
        metadata,
        error: None,
    };
    info!(run = %report.run_name, state = %report.state, "[RUN] Run complete");
    match serde_json::to_string(&report) {
        Ok(json) => debug!(run = %report.run_name, report = %json, "[RUN] Run report"),
        Err(e) => debug!(run = %report.run_name, error = %e, "[RUN] Could not serialize run report"),
    }
    report
}
