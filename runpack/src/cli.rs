/// This module implements the full CLI interface for runpack: command
/// parsing, argument validation, the main entrypoint and exit-code policy.
///
/// All core business logic (stages, provisioning, orchestration) lives in
/// the `runpack-core` crate. This module is strictly CLI glue, ergonomic
/// argument exposure and wiring of the command-backed collaborators.
///
/// ## How To Use
/// - For command-line users: run the installed `runpack` binary with
///   `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed
///   [`Cli`].
///
/// ## Exit codes
/// 0 success, 1 runtime failure, 2 configuration error, 3 unmet
/// precondition (missing required tooling). The mapping lives on
/// `PipelineError::exit_code` and is applied in `main`.
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use runpack_core::config::EnvConfig;
use runpack_core::contract::{MetadataSource, ToolRunner};
use runpack_core::error::PipelineError;
use runpack_core::orchestrate::{self, MetadataConfig, PipelineConfig};
use runpack_core::provision::{ProvisionMode, Provisioner, SystemToolRunner};
use runpack_core::resolve;

use crate::external::{CommandAttacher, CommandPackageBuilder, CommandUploader};
use crate::sampledata;

/// CLI for runpack: ingest sequencing runs into versioned packages.
#[derive(Parser)]
#[clap(
    name = "runpack",
    version,
    about = "Provision object-storage buckets and drive sequencing runs through upload, packaging and metadata attachment"
)]
pub struct Cli {
    /// Pipeline mode: local emulator (`test`) or real cloud account (`prod`)
    #[clap(value_enum)]
    pub mode: Mode,

    /// Path to the YAML bucket/registry descriptor
    #[clap(long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Top-level descriptor section to read
    #[clap(long, default_value = "genexomics")]
    pub section: String,

    /// Named bucket key within the section's `buckets` block
    #[clap(long, default_value = "raw_uploads")]
    pub bucket_key: String,

    /// Root directory holding run_* directories
    #[clap(long, default_value = "data")]
    pub data_root: PathBuf,

    /// Generate synthetic sample run directories before the pipeline
    #[clap(long)]
    pub generate_samples: bool,

    /// Fetch the configured minimal dataset into the data root
    #[clap(long)]
    pub minimal_dataset: bool,

    /// Build the pipeline tool images via the container runtime
    #[clap(long)]
    pub build_images: bool,

    /// Run the upload → package → metadata pipeline over discovered runs
    #[clap(long)]
    pub run_pipeline: bool,

    /// Metadata source to attach after packaging (benchling, smartsheet, …)
    #[clap(long)]
    pub metadata_source: Option<String>,

    /// Source-specific metadata entity (entity id, or sheet:row for
    /// smartsheet)
    #[clap(long)]
    pub metadata_entity: Option<String>,

    /// Directory to persist per-run upload manifests into
    #[clap(long)]
    pub manifest_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Provision and run against the local object-store emulator
    Test,
    /// Provision and run against the real cloud account
    Prod,
}

/// Extracted async CLI logic entrypoint for integration tests and main().
pub async fn run(cli: Cli) -> Result<()> {
    let mut env = EnvConfig::from_env();

    // The descriptor's registry block fills in whatever the environment
    // left unset.
    let registry_block = resolve::resolve_registry(&cli.config, &cli.section);
    if env.registry.is_none() {
        env.registry = registry_block.as_ref().map(|r| r.registry.clone());
    }
    env.trace_loaded();

    // Resolution precedes provisioning: a broken descriptor must abort
    // before any infrastructure is touched.
    let spec = resolve::resolve_bucket(&cli.config, &cli.section, &cli.bucket_key)?;
    info!(bucket = %spec.bucket, prefix = %spec.prefix, "Resolved bucket descriptor");

    let runner = SystemToolRunner;
    let mode = match cli.mode {
        Mode::Test => ProvisionMode::LocalEmulator,
        Mode::Prod => ProvisionMode::Cloud,
    };
    let provisioner = Provisioner::new(mode, &env, &runner);

    if cli.build_images {
        build_images(&runner)?;
    }
    if cli.generate_samples {
        sampledata::generate_sample_runs(&cli.data_root)?;
    }
    if cli.minimal_dataset {
        sampledata::fetch_minimal_dataset(&cli.data_root, &env.minimal_dataset_sources).await?;
    }

    if !cli.run_pipeline {
        // Provision-only invocation still converges the buckets.
        provisioner.ensure_buckets(&spec).await?;
        info!("Provisioning complete; pipeline not requested");
        return Ok(());
    }

    let registry = env.registry.clone().ok_or(PipelineError::RegistryUnset)?;
    let namespace = registry_block
        .map(|r| r.namespace)
        .unwrap_or_else(|| cli.section.clone());
    let metadata = cli.metadata_source.as_deref().map(|source| MetadataConfig {
        source: MetadataSource::from(source),
        entity: cli.metadata_entity.clone().unwrap_or_default(),
    });

    let cfg = PipelineConfig {
        namespace,
        registry,
        message: None,
        metadata,
        manifest_dir: cli.manifest_dir.clone(),
        fail_on_run_error: env.fail_on_run_error,
    };
    let uploader = CommandUploader::new(
        env.uploader_bin.clone(),
        cli.config.clone(),
        cli.section.clone(),
        cli.bucket_key.clone(),
    );
    let builder = CommandPackageBuilder::new(env.packager_bin.clone());
    let attacher = CommandAttacher::new(env.attacher_bin.clone());

    let report = orchestrate::execute(
        &cfg,
        &provisioner,
        &spec,
        &cli.data_root,
        &uploader,
        &builder,
        &attacher,
    )
    .await?;

    if report.any_failed() {
        if cfg.fail_on_run_error {
            return Err(PipelineError::RunsFailed {
                failed: report.failed(),
                total: report.runs.len(),
            }
            .into());
        }
        warn!(
            failed = report.failed(),
            total = report.runs.len(),
            "Some runs failed; process succeeds per policy"
        );
    }
    Ok(())
}

/// Build the pipeline tool images. Image internals are the build's concern;
/// this only shells out and reports.
fn build_images<R: ToolRunner>(runner: &R) -> Result<()> {
    info!("Building pipeline tool images");
    let out = runner
        .run("docker", &["compose", "build"])
        .map_err(|e| PipelineError::PreconditionMissing {
            tool: "docker".to_string(),
            detail: e.to_string(),
        })?;
    if !out.success {
        anyhow::bail!("image build failed: {}", out.stderr.trim());
    }
    info!("Image build complete");
    Ok(())
}
