//! Package stage: derive bucket/prefix from a run's manifest, drive the
//! external package builder and extract the package identifier from its
//! output.

use tracing::{info, warn};

use crate::contract::{PackageBuilder, PackageRequest};
use crate::error::StageError;
use crate::upload::UploadManifest;

/// Marker line the external builder prints. The package identifier is the
/// final whitespace-delimited token after the marker.
pub const PACKAGE_MARKER: &str = "Created package:";

/// An immutable, versioned package as reported by the external builder.
/// Packages are never mutated in place; a re-run produces a new one.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Package {
    pub namespace: String,
    pub base_name: String,
    pub registry: String,
    pub identifier: String,
}

/// Package one run from its finalized manifest. Recomputes bucket/prefix
/// from the first manifest entry deterministically, so a re-invocation
/// yields an equivalent builder input.
pub async fn package_run<P: PackageBuilder>(
    builder: &P,
    manifest: &UploadManifest,
    namespace: &str,
    registry: &str,
    message: Option<&str>,
) -> Result<Package, StageError> {
    let first = manifest.first().ok_or(StageError::EmptyManifest)?;
    let (bucket, prefix) = split_location(first).ok_or_else(|| StageError::MalformedLocation {
        location: first.to_string(),
    })?;
    let message = match message {
        Some(m) => m.to_string(),
        None => format!(
            "Created from existing uploaded objects ({} entries)",
            manifest.len()
        ),
    };
    let req = PackageRequest {
        bucket,
        prefix,
        namespace: namespace.to_string(),
        package_base: manifest.run_name.clone(),
        registry: registry.to_string(),
        message,
    };
    info!(
        run = %manifest.run_name,
        bucket = %req.bucket,
        prefix = %req.prefix,
        "Invoking package builder"
    );
    let output = builder
        .build(&req)
        .await
        .map_err(|e| StageError::BuilderFailed(e.to_string()))?;

    match extract_identifier(&output) {
        Some(identifier) => {
            info!(run = %manifest.run_name, package = %identifier, "Package created");
            Ok(Package {
                namespace: req.namespace,
                base_name: req.package_base,
                registry: req.registry,
                identifier,
            })
        }
        None => {
            warn!(run = %manifest.run_name, "Builder output lacked the package marker line");
            Err(StageError::PackageMarkerMissing)
        }
    }
}

/// Split `scheme://bucket/key` into the bucket and the key's directory
/// portion (the upload prefix). A flat key has an empty prefix.
fn split_location(location: &str) -> Option<(String, String)> {
    let rest = location.split_once("://")?.1;
    let (bucket, key) = rest.split_once('/')?;
    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    let prefix = match key.rsplit_once('/') {
        Some((dir, _file)) => dir.to_string(),
        None => String::new(),
    };
    Some((bucket.to_string(), prefix))
}

fn extract_identifier(output: &str) -> Option<String> {
    let line = output.lines().find(|l| l.contains(PACKAGE_MARKER))?;
    let after = &line[line.find(PACKAGE_MARKER)? + PACKAGE_MARKER.len()..];
    after.split_whitespace().last().map(str::to_string)
}
