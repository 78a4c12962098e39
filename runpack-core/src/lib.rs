#![doc = "runpack-core: core pipeline logic for runpack."]

//! This crate contains the run-ingestion pipeline: run discovery, the
//! per-run upload → package → metadata progression, and the bucket
//! provisioning the stages depend on. External collaborators (the uploader,
//! package builder and metadata attacher commands) are consumed through the
//! traits in [`contract`], so tests substitute mocks for real infrastructure.
//!
//! # Usage
//! Add this as a dependency for all shared pipeline, provisioning, config
//! and orchestration code. CLI glue lives in the `runpack` binary crate.

pub mod config;
pub mod contract;
pub mod discover;
pub mod error;
pub mod metadata;
pub mod orchestrate;
pub mod package;
pub mod provision;
pub mod resolve;
pub mod upload;
