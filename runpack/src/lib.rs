#![doc = "runpack CLI crate: argument surface, collaborator wiring and exit codes."]

//! All pipeline logic (data models, stages, provisioning and orchestration)
//! lives in the `runpack-core` crate. This crate is strictly CLI glue:
//! argument exposure, environment assembly, the command-backed collaborator
//! implementations and exit-code mapping.

pub mod cli;
pub mod external;
pub mod sampledata;
