//! Error taxonomy for the pipeline and the provisioning subsystem.
//!
//! Two tiers: [`PipelineError`] is process-fatal (configuration, tooling,
//! credentials); [`StageError`] marks a single run `Failed` and never
//! touches sibling runs. Ambiguous cloud bucket-create responses are not an
//! error at all: they are downgraded to warnings at the provisioning site.

use std::path::PathBuf;

use thiserror::Error;

/// Process-level failures. Anything here aborts the whole invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no strategy could resolve bucket config: file={file:?}, section={section}, key={key}")]
    ConfigNotFound {
        file: PathBuf,
        section: String,
        key: String,
    },

    #[error("required tooling is not available: {tool} ({detail})")]
    PreconditionMissing { tool: String, detail: String },

    #[error("cloud credential probe failed: {detail}")]
    AuthInvalid { detail: String },

    #[error("no registry configured: set RUNPACK_REGISTRY or a quilt-style block in the descriptor")]
    RegistryUnset,

    #[error("pipeline I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("{failed} of {total} runs failed")]
    RunsFailed { failed: usize, total: usize },
}

impl PipelineError {
    /// Process exit code: 2 for configuration problems, 3 for missing
    /// tooling, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::ConfigNotFound { .. } | PipelineError::RegistryUnset => 2,
            PipelineError::PreconditionMissing { .. } => 3,
            _ => 1,
        }
    }
}

/// Per-run stage failures. A run carrying one of these is terminal
/// `Failed`; the orchestrator keeps driving its siblings.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("upload failed for {file:?}: {detail}")]
    UploadFailure { file: PathBuf, detail: String },

    #[error("run has no uploaded objects to package")]
    EmptyManifest,

    #[error("manifest entry {location:?} is not a scheme://bucket/key location")]
    MalformedLocation { location: String },

    #[error("package builder output did not contain the 'Created package:' marker")]
    PackageMarkerMissing,

    #[error("package builder failed: {0}")]
    BuilderFailed(String),

    #[error("metadata attacher failed: {0}")]
    AttacherFailed(String),

    #[error("failed to enumerate run files: {0}")]
    Io(#[from] std::io::Error),
}
