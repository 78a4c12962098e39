//! Idempotent bucket provisioning across two backends: the local
//! object-store emulator and the real cloud account.
//!
//! All external tools run through the injected [`ToolRunner`], so tests
//! exercise both backends without a container runtime or cloud credentials.
//! The contract in both modes: provisioning the same target twice never
//! surfaces an error, and the bucket exists afterwards. Readiness polling is
//! bounded and advisory: exhaustion degrades to a warning, never a hang.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::EnvConfig;
use crate::contract::{ToolOutput, ToolRunner};
use crate::error::PipelineError;
use crate::resolve::BucketSpec;

/// Region for which the cloud create-bucket call must omit its location
/// constraint.
pub const BASELINE_REGION: &str = "us-east-1";

/// Provisioning backend, selected by pipeline mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionMode {
    LocalEmulator,
    Cloud,
}

/// Bounded readiness polling: a fixed attempt count at a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            attempts: 20,
            interval: Duration::from_secs(3),
        }
    }
}

/// Poll the emulator health endpoint until it answers success, bounded by
/// `policy`. Returns readiness as a value so the caller decides whether an
/// exhausted poll is fatal (for provisioning it never is).
pub async fn poll_health(endpoint: &str, policy: PollPolicy) -> bool {
    let url = format!("{}/_localstack/health", endpoint.trim_end_matches('/'));
    let client = reqwest::Client::new();
    for attempt in 1..=policy.attempts {
        match client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                debug!(attempt, url = %url, "Emulator reported healthy");
                return true;
            }
            Ok(resp) => {
                debug!(attempt, status = %resp.status(), "Emulator not ready yet");
            }
            Err(e) => {
                debug!(attempt, error = %e, "Emulator health endpoint unreachable");
            }
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    false
}

/// Runs tools as real child processes, capturing their output.
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn run(&self, program: &str, args: &[&str]) -> std::io::Result<ToolOutput> {
        debug!(program, ?args, "Invoking external tool");
        let output = std::process::Command::new(program).args(args).output()?;
        Ok(ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub struct Provisioner<'a, R: ToolRunner> {
    mode: ProvisionMode,
    env: &'a EnvConfig,
    runner: &'a R,
    poll: PollPolicy,
}

impl<'a, R: ToolRunner> Provisioner<'a, R> {
    pub fn new(mode: ProvisionMode, env: &'a EnvConfig, runner: &'a R) -> Self {
        Provisioner {
            mode,
            env,
            runner,
            poll: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Ensure the spec's bucket (and the registry bucket, when configured
    /// and distinct) exists in the selected backend. Safe to call
    /// repeatedly and concurrently.
    pub async fn ensure_buckets(&self, spec: &BucketSpec) -> Result<(), PipelineError> {
        match self.mode {
            ProvisionMode::LocalEmulator => self.ensure_local(spec).await,
            ProvisionMode::Cloud => self.ensure_cloud(spec).await,
        }
    }

    /// The bucket named by the registry URI, when one is configured.
    fn registry_bucket(&self) -> Option<String> {
        let registry = self.env.registry.as_deref()?;
        let rest = registry
            .split_once("://")
            .map(|(_, r)| r)
            .unwrap_or(registry);
        let bucket = rest.split('/').next().unwrap_or("").trim();
        if bucket.is_empty() {
            None
        } else {
            Some(bucket.to_string())
        }
    }

    async fn ensure_local(&self, spec: &BucketSpec) -> Result<(), PipelineError> {
        self.require_tool("docker", &["version"])?;

        if !poll_health(&self.env.emulator_endpoint, self.poll).await {
            warn!(
                endpoint = %self.env.emulator_endpoint,
                "Emulator health never reported ready; continuing anyway"
            );
        }
        self.ensure_emulator_container().await?;

        self.create_bucket_local(&spec.bucket)?;
        match self.registry_bucket() {
            Some(registry_bucket) if registry_bucket != spec.bucket => {
                self.create_bucket_local(&registry_bucket)?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn ensure_cloud(&self, spec: &BucketSpec) -> Result<(), PipelineError> {
        let probe = self
            .runner
            .run("aws", &["sts", "get-caller-identity"])
            .map_err(|e| PipelineError::PreconditionMissing {
                tool: "aws".to_string(),
                detail: e.to_string(),
            })?;
        if !probe.success {
            return Err(PipelineError::AuthInvalid {
                detail: probe.stderr.trim().to_string(),
            });
        }
        debug!("Cloud credential probe succeeded");

        let region = self.active_region();
        info!(region = %region, "Resolved active cloud region");

        self.create_bucket_cloud(&spec.bucket, &region)?;
        match self.registry_bucket() {
            Some(registry_bucket) if registry_bucket != spec.bucket => {
                self.create_bucket_cloud(&registry_bucket, &region)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn require_tool(&self, tool: &str, args: &[&str]) -> Result<(), PipelineError> {
        let missing = |detail: String| PipelineError::PreconditionMissing {
            tool: tool.to_string(),
            detail,
        };
        match self.runner.run(tool, args) {
            Ok(out) if out.success => Ok(()),
            Ok(out) => Err(missing(out.stderr.trim().to_string())),
            Err(e) => Err(missing(e.to_string())),
        }
    }

    /// Start the emulator's control container unless it is already running.
    /// Start failures are advisory: the endpoint may be served by another
    /// process entirely.
    async fn ensure_emulator_container(&self) -> Result<(), PipelineError> {
        let name = &self.env.emulator_container;
        let ps = self.runner.run("docker", &["ps", "--format", "{{.Names}}"])?;
        if ps.success && ps.stdout.lines().any(|l| l.trim() == name.as_str()) {
            debug!(container = %name, "Emulator container already running");
            return Ok(());
        }
        info!(container = %name, "Starting emulator container");
        let start = self.runner.run("docker", &["start", name.as_str()])?;
        if !start.success {
            warn!(
                container = %name,
                stderr = %start.stderr.trim(),
                "Could not start emulator container; relying on the configured endpoint"
            );
            return Ok(());
        }
        tokio::time::sleep(self.poll.interval).await;
        Ok(())
    }

    /// Create a bucket in the emulator. Preferred path is the emulator's own
    /// control CLI inside the container; the fallback shells a generic
    /// object-storage client from a worker container against the endpoint.
    fn create_bucket_local(&self, bucket: &str) -> Result<(), PipelineError> {
        let container = &self.env.emulator_container;
        let probe = self
            .runner
            .run("docker", &["exec", container.as_str(), "which", "awslocal"]);
        let native_available = matches!(&probe, Ok(out) if out.success);
        if native_available {
            if self.create_with_native_cli(bucket)? {
                return Ok(());
            }
            debug!(bucket, "Native control CLI could not create bucket, using worker client");
        } else {
            debug!(bucket, "Native control CLI unavailable, using worker client");
        }
        self.create_with_worker_client(bucket)
    }

    /// Idempotent create via `awslocal` inside the control container.
    /// Returns whether the bucket is known to exist afterwards.
    fn create_with_native_cli(&self, bucket: &str) -> Result<bool, PipelineError> {
        let container = &self.env.emulator_container;
        let head = self.runner.run(
            "docker",
            &[
                "exec",
                container.as_str(),
                "awslocal",
                "s3api",
                "head-bucket",
                "--bucket",
                bucket,
            ],
        )?;
        if head.success {
            info!(bucket, "Bucket already exists in emulator");
            return Ok(true);
        }
        let target = format!("s3://{bucket}");
        let mb = self.runner.run(
            "docker",
            &[
                "exec",
                container.as_str(),
                "awslocal",
                "s3",
                "mb",
                target.as_str(),
            ],
        )?;
        if mb.success || already_exists(&mb.stderr) {
            info!(bucket, "Created bucket in emulator");
            Ok(true)
        } else {
            debug!(bucket, stderr = %mb.stderr.trim(), "Native bucket create failed");
            Ok(false)
        }
    }

    /// Fallback create via a generic client in a worker container, talking
    /// to the emulator endpoint. "Already exists" counts as success; other
    /// create failures are warnings, surfaced later by the upload stage if
    /// they matter.
    fn create_with_worker_client(&self, bucket: &str) -> Result<(), PipelineError> {
        let endpoint = &self.env.emulator_endpoint;
        let head = self.runner.run(
            "docker",
            &[
                "run",
                "--rm",
                "--network",
                "host",
                "amazon/aws-cli",
                "s3api",
                "head-bucket",
                "--bucket",
                bucket,
                "--endpoint-url",
                endpoint.as_str(),
            ],
        )?;
        if head.success {
            info!(bucket, "Bucket already exists in emulator");
            return Ok(());
        }
        let create = self.runner.run(
            "docker",
            &[
                "run",
                "--rm",
                "--network",
                "host",
                "amazon/aws-cli",
                "s3api",
                "create-bucket",
                "--bucket",
                bucket,
                "--endpoint-url",
                endpoint.as_str(),
            ],
        )?;
        if create.success || already_exists(&create.stderr) {
            info!(bucket, "Created bucket in emulator");
        } else {
            warn!(
                bucket,
                stderr = %create.stderr.trim(),
                "Could not create emulator bucket; uploads will surface the failure if it persists"
            );
        }
        Ok(())
    }

    /// Cloud create. The baseline region must omit the location constraint;
    /// every other region must carry one. A failed create is a warning: the
    /// response cannot distinguish "already exists" from "insufficient
    /// permission" without an extra privileged call, so neither cause is
    /// guessed at.
    fn create_bucket_cloud(&self, bucket: &str, region: &str) -> Result<(), PipelineError> {
        let constraint = format!("LocationConstraint={region}");
        let mut args = vec!["s3api", "create-bucket", "--bucket", bucket];
        if region != BASELINE_REGION {
            args.push("--create-bucket-configuration");
            args.push(constraint.as_str());
        }
        let create = self.runner.run("aws", &args)?;
        if create.success {
            info!(bucket, region, "Created cloud bucket");
        } else {
            warn!(
                bucket,
                stderr = %create.stderr.trim(),
                "Bucket create was refused; it may already exist or credentials may lack s3:CreateBucket; verify ownership manually"
            );
        }
        Ok(())
    }

    fn active_region(&self) -> String {
        match self.runner.run("aws", &["configure", "get", "region"]) {
            Ok(out) if out.success && !out.stdout.trim().is_empty() => {
                out.stdout.trim().to_string()
            }
            _ => BASELINE_REGION.to_string(),
        }
    }
}

fn already_exists(stderr: &str) -> bool {
    let lowered = stderr.to_ascii_lowercase();
    lowered.contains("bucketalreadyownedbyyou")
        || lowered.contains("bucketalreadyexists")
        || lowered.contains("already exists")
}
