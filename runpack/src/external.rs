#![doc = "Command-backed collaborators: bridges the core trait abstractions to the external uploader, package-builder and metadata-attacher commands."]
//
//! # External Command Integration (CLI <-> Core)
//!
//! This module wires the collaborator traits from `runpack-core::contract`
//! to their real external commands. Each implementation owns its command's
//! argv contract; the core never sees process details.
//!
//! - Uploader: one file per invocation, exactly one object-location line on
//!   stdout, non-zero exit means that file's upload failed.
//! - Package builder: full textual output is returned to the core, which
//!   extracts the identifier from the `Created package:` marker line.
//! - Metadata attacher: subcommand per source with source-specific flags;
//!   credentials travel via the command's own environment.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use tracing::{debug, info};

use runpack_core::contract::{
    CollabError, MetadataAttacher, MetadataRequest, MetadataSource, PackageBuilder,
    PackageRequest, RunUploader,
};

fn command_failure(what: &str, output: &std::process::Output) -> CollabError {
    format!(
        "{what} exited with {:?}: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr).trim()
    )
    .into()
}

/// Uploads one file per invocation of the external uploader command. The
/// config coordinates are fixed at construction; callers only hand over
/// file paths.
pub struct CommandUploader {
    program: String,
    descriptor: PathBuf,
    section: String,
    bucket_key: String,
}

impl CommandUploader {
    pub fn new(program: String, descriptor: PathBuf, section: String, bucket_key: String) -> Self {
        CommandUploader {
            program,
            descriptor,
            section,
            bucket_key,
        }
    }
}

#[async_trait]
impl RunUploader for CommandUploader {
    async fn upload_file(&self, file: &Path) -> Result<String, CollabError> {
        debug!(program = %self.program, file = %file.display(), "Invoking uploader");
        let output = Command::new(&self.program)
            .arg("-i")
            .arg(file)
            .arg("-c")
            .arg(&self.descriptor)
            .arg("-s")
            .arg(&self.section)
            .arg("-b")
            .arg(&self.bucket_key)
            .output()?;
        if !output.status.success() {
            return Err(command_failure("uploader", &output));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut locations = stdout
            .lines()
            .map(str::trim)
            .filter(|line| line.contains("://"));
        let location = locations
            .next()
            .ok_or("uploader printed no object-location line")?;
        if locations.next().is_some() {
            return Err("uploader printed more than one object-location line".into());
        }
        Ok(location.to_string())
    }
}

/// Invokes the external package builder and hands its output back verbatim.
pub struct CommandPackageBuilder {
    program: String,
}

impl CommandPackageBuilder {
    pub fn new(program: String) -> Self {
        CommandPackageBuilder { program }
    }
}

#[async_trait]
impl PackageBuilder for CommandPackageBuilder {
    async fn build(&self, req: &PackageRequest) -> Result<String, CollabError> {
        info!(
            program = %self.program,
            bucket = %req.bucket,
            prefix = %req.prefix,
            package_base = %req.package_base,
            "Invoking package builder"
        );
        let output = Command::new(&self.program)
            .arg("--bucket")
            .arg(&req.bucket)
            .arg("--prefix")
            .arg(&req.prefix)
            .arg("--namespace")
            .arg(&req.namespace)
            .arg("--package-base")
            .arg(&req.package_base)
            .arg("--registry")
            .arg(&req.registry)
            .arg("--message")
            .arg(&req.message)
            .output()?;
        if !output.status.success() {
            return Err(command_failure("package builder", &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Invokes the external metadata attacher with a subcommand per source.
pub struct CommandAttacher {
    program: String,
}

impl CommandAttacher {
    pub fn new(program: String) -> Self {
        CommandAttacher { program }
    }
}

#[async_trait]
impl MetadataAttacher for CommandAttacher {
    async fn attach(&self, req: &MetadataRequest) -> Result<(), CollabError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--package")
            .arg(&req.package_identifier)
            .arg("--registry")
            .arg(&req.registry);
        match &req.source {
            MetadataSource::Benchling => {
                cmd.arg("benchling").arg("--entity-id").arg(&req.entity);
            }
            MetadataSource::Smartsheet => {
                let (sheet, row) = req
                    .entity
                    .split_once(':')
                    .unwrap_or((req.entity.as_str(), ""));
                cmd.arg("smartsheet").arg("--sheet-id").arg(sheet);
                if !row.is_empty() {
                    cmd.arg("--row-id").arg(row);
                }
            }
            MetadataSource::Unsupported(name) => {
                return Err(format!("metadata source {name} has no attacher command").into());
            }
        }
        info!(program = %self.program, package = %req.package_identifier, source = %req.source, "Invoking metadata attacher");
        let output = cmd.output()?;
        if !output.status.success() {
            return Err(command_failure("metadata attacher", &output));
        }
        Ok(())
    }
}
