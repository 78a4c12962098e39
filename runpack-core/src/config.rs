//! Environment-level configuration, read once at process start.
//!
//! Components receive [`EnvConfig`] by reference and never read process-wide
//! environment state themselves mid-execution.

use tracing::{debug, info};

pub const DEFAULT_EMULATOR_ENDPOINT: &str = "http://localhost:4566";
pub const DEFAULT_EMULATOR_CONTAINER: &str = "runpack-localstack";

const DEFAULT_UPLOADER_BIN: &str = "s3-uploader";
const DEFAULT_PACKAGER_BIN: &str = "make-quilt";
const DEFAULT_ATTACHER_BIN: &str = "metadata-integrator";

/// Ambient settings for one invocation.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Object-store emulator endpoint used in local mode.
    pub emulator_endpoint: String,
    /// Name of the emulator's control container.
    pub emulator_container: String,
    /// Registry location (scheme + bucket path) packages are pushed to.
    pub registry: Option<String>,
    /// Source locations the minimal dataset is fetched from.
    pub minimal_dataset_sources: Vec<String>,
    /// Whether any failed run fails the whole process.
    pub fail_on_run_error: bool,
    /// External collaborator commands.
    pub uploader_bin: String,
    pub packager_bin: String,
    pub attacher_bin: String,
}

impl EnvConfig {
    /// Build the configuration from the environment. Called exactly once at
    /// startup; every component reads the returned value, not the
    /// environment.
    pub fn from_env() -> Self {
        let bool_var = |name: &str, default: bool| {
            std::env::var(name)
                .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
                .unwrap_or(default)
        };
        EnvConfig {
            emulator_endpoint: std::env::var("RUNPACK_EMULATOR_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_EMULATOR_ENDPOINT.to_string()),
            emulator_container: std::env::var("RUNPACK_EMULATOR_CONTAINER")
                .unwrap_or_else(|_| DEFAULT_EMULATOR_CONTAINER.to_string()),
            registry: std::env::var("RUNPACK_REGISTRY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            minimal_dataset_sources: std::env::var("RUNPACK_MINIMAL_DATASET_SOURCES")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            fail_on_run_error: bool_var("RUNPACK_FAIL_ON_RUN_ERROR", true),
            uploader_bin: std::env::var("RUNPACK_UPLOADER_BIN")
                .unwrap_or_else(|_| DEFAULT_UPLOADER_BIN.to_string()),
            packager_bin: std::env::var("RUNPACK_PACKAGER_BIN")
                .unwrap_or_else(|_| DEFAULT_PACKAGER_BIN.to_string()),
            attacher_bin: std::env::var("RUNPACK_ATTACHER_BIN")
                .unwrap_or_else(|_| DEFAULT_ATTACHER_BIN.to_string()),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            emulator_endpoint = %self.emulator_endpoint,
            emulator_container = %self.emulator_container,
            registry = ?self.registry,
            minimal_sources = self.minimal_dataset_sources.len(),
            fail_on_run_error = self.fail_on_run_error,
            "Loaded environment configuration"
        );
        debug!(?self, "Environment configuration (full debug)");
    }
}
