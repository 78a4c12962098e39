//! Metadata stage: optionally attach records from an external metadata
//! source to an existing package.

use tracing::{info, warn};

use crate::contract::{MetadataAttacher, MetadataRequest, MetadataSource};
use crate::error::StageError;
use crate::package::Package;

/// Outcome of the metadata stage for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum MetadataOutcome {
    Attached,
    Skipped,
}

/// Attach metadata for `package` from `source`. Unsupported sources emit an
/// explicit not-implemented notice and complete successfully. This is a
/// deliberate non-fatal degrade, so an unimplemented source never fails a run.
pub async fn attach_metadata<M: MetadataAttacher>(
    attacher: &M,
    source: &MetadataSource,
    entity: &str,
    package: &Package,
) -> Result<MetadataOutcome, StageError> {
    match source {
        MetadataSource::Benchling | MetadataSource::Smartsheet => {
            info!(package = %package.identifier, source = %source, "Attaching metadata");
            let req = MetadataRequest {
                source: source.clone(),
                entity: entity.to_string(),
                package_identifier: package.identifier.clone(),
                registry: package.registry.clone(),
            };
            attacher
                .attach(&req)
                .await
                .map_err(|e| StageError::AttacherFailed(e.to_string()))?;
            info!(package = %package.identifier, "Metadata attached");
            Ok(MetadataOutcome::Attached)
        }
        MetadataSource::Unsupported(name) => {
            warn!(
                source = %name,
                package = %package.identifier,
                "Metadata source not implemented; skipping attachment"
            );
            Ok(MetadataOutcome::Skipped)
        }
    }
}
