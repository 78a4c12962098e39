//! # contract: interfaces for the pipeline's external collaborators
//!
//! This module defines the traits the pipeline drives (the per-file
//! uploader, the package builder, the metadata attacher and the tool runner
//! used by provisioning) together with their request types.
//!
//! ## Interface & Extensibility
//! - Implement a trait to plug in a new backing command, API client or test
//!   double; all error handling is uniform via boxed error trait objects.
//! - The async traits are annotated for `mockall` so consumers can generate
//!   deterministic mocks for unit/integration tests.
//!
//! ## Contracts
//! - An uploader invocation covers exactly one file and yields exactly one
//!   object location (`scheme://bucket/key`).
//! - A package-builder invocation yields its full textual output; the
//!   pipeline extracts the package identifier from the `Created package:`
//!   marker line.
//! - A tool-runner invocation is a single external process; a non-zero exit
//!   is reported in [`ToolOutput::success`], not as an `Err`.

use std::path::Path;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Uniform error type for collaborator implementations.
pub type CollabError = Box<dyn std::error::Error + Send + Sync>;

/// Uploads a single local file to object storage.
///
/// The implementor carries the config coordinates (descriptor path, section,
/// bucket key); callers only hand over file paths. Implementations are
/// expected to be externally idempotent: re-uploading the same file yields
/// the same object location.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RunUploader: Send + Sync {
    /// Upload one file, returning its object location.
    async fn upload_file(&self, file: &Path) -> Result<String, CollabError>;
}

/// Inputs for one package-builder invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    pub bucket: String,
    pub prefix: String,
    pub namespace: String,
    pub package_base: String,
    pub registry: String,
    pub message: String,
}

/// Builds a versioned package referencing already-uploaded objects.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PackageBuilder: Send + Sync {
    /// Invoke the builder and return its full textual output. The caller
    /// parses the package identifier out of the marker line.
    async fn build(&self, req: &PackageRequest) -> Result<String, CollabError>;
}

/// Metadata-source selector. Unsupported values are carried through
/// syntactically; the metadata stage rejects them functionally with a
/// non-fatal notice.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum MetadataSource {
    Benchling,
    Smartsheet,
    Unsupported(String),
}

impl From<&str> for MetadataSource {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "benchling" => MetadataSource::Benchling,
            "smartsheet" => MetadataSource::Smartsheet,
            _ => MetadataSource::Unsupported(s.to_string()),
        }
    }
}

impl std::fmt::Display for MetadataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataSource::Benchling => f.write_str("benchling"),
            MetadataSource::Smartsheet => f.write_str("smartsheet"),
            MetadataSource::Unsupported(name) => f.write_str(name),
        }
    }
}

/// Inputs for one metadata-attacher invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRequest {
    pub source: MetadataSource,
    /// Source-specific identifier: a Benchling entity id, or a
    /// `sheet:row` reference for Smartsheet.
    pub entity: String,
    pub package_identifier: String,
    pub registry: String,
}

/// Attaches external metadata to an existing package.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MetadataAttacher: Send + Sync {
    async fn attach(&self, req: &MetadataRequest) -> Result<(), CollabError>;
}

/// Captured result of one external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs external tools (container runtime, cloud CLI) on behalf of the
/// provisioner. `Err` means the tool could not be launched at all; a tool
/// that ran and failed comes back as `Ok` with `success == false`.
pub trait ToolRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> std::io::Result<ToolOutput>;
}
