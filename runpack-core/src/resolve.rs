//! Bucket descriptor resolution: an ordered chain of extraction strategies.
//!
//! The descriptor is a YAML mapping keyed by section, each section carrying a
//! `buckets` block of named `{Bucket, Prefix}` entries. Extraction runs
//! through a fixed strategy chain (a strict typed parse, a lenient value
//! traversal, then a line-oriented scan) and the first strategy producing a
//! non-empty, non-null bucket wins; later strategies are never consulted.
//! The chain lets resolution degrade gracefully across descriptor
//! malformations instead of hard-depending on one parse succeeding.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::PipelineError;

/// A resolved `(bucket, prefix)` pair for one `(section, key)` target.
/// Immutable once resolved; `bucket` is guaranteed non-empty and not a YAML
/// null spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSpec {
    pub section: String,
    pub key: String,
    pub bucket: String,
    pub prefix: String,
}

/// Optional registry block carried next to the buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySpec {
    pub namespace: String,
    pub registry: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Typed,
    ValueTree,
    LineScan,
}

const STRATEGY_CHAIN: [Strategy; 3] = [Strategy::Typed, Strategy::ValueTree, Strategy::LineScan];

/// Resolve `(bucket, prefix)` for `(section, key)` from the descriptor file.
pub fn resolve_bucket(
    descriptor: &Path,
    section: &str,
    key: &str,
) -> Result<BucketSpec, PipelineError> {
    let not_found = || PipelineError::ConfigNotFound {
        file: descriptor.to_path_buf(),
        section: section.to_string(),
        key: key.to_string(),
    };
    let text = fs::read_to_string(descriptor).map_err(|e| {
        warn!(file = %descriptor.display(), error = %e, "Could not read bucket descriptor");
        not_found()
    })?;

    for strategy in STRATEGY_CHAIN {
        match attempt(strategy, &text, section, key) {
            Some((bucket, prefix)) if !is_null_like(&bucket) => {
                info!(
                    ?strategy,
                    section,
                    key,
                    bucket = %bucket,
                    prefix = %prefix,
                    "Resolved bucket config"
                );
                return Ok(BucketSpec {
                    section: section.to_string(),
                    key: key.to_string(),
                    bucket: bucket.trim().to_string(),
                    prefix: normalize_prefix(&prefix),
                });
            }
            Some(_) => debug!(?strategy, "Strategy yielded a null-like bucket, trying next"),
            None => debug!(?strategy, "Strategy could not extract bucket, trying next"),
        }
    }
    Err(not_found())
}

/// Read the optional `quilt-style` registry block of a section. Absence is
/// not an error; callers fall back to the environment configuration.
pub fn resolve_registry(descriptor: &Path, section: &str) -> Option<RegistrySpec> {
    let text = fs::read_to_string(descriptor).ok()?;
    let doc: serde_yaml::Value = serde_yaml::from_str(&text).ok()?;
    let block = doc.get(section)?.get("quilt-style")?;
    let namespace = block.get("namespace").and_then(scalar_string)?;
    let registry = block.get("registry").and_then(scalar_string)?;
    debug!(section, namespace = %namespace, registry = %registry, "Resolved registry block");
    Some(RegistrySpec {
        namespace,
        registry,
    })
}

fn attempt(strategy: Strategy, text: &str, section: &str, key: &str) -> Option<(String, String)> {
    match strategy {
        Strategy::Typed => attempt_typed(text, section, key),
        Strategy::ValueTree => attempt_value(text, section, key),
        Strategy::LineScan => attempt_line_scan(text, section, key),
    }
}

#[derive(Debug, Deserialize)]
struct TypedBucket {
    #[serde(rename = "Bucket")]
    bucket: String,
    #[serde(rename = "Prefix", default)]
    prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TypedSection {
    #[serde(default)]
    buckets: BTreeMap<String, TypedBucket>,
}

/// Strict parse of the whole descriptor into typed structs. Any section that
/// deviates from the schema fails the entire parse, which is exactly when
/// the lenient strategies earn their place in the chain.
fn attempt_typed(text: &str, section: &str, key: &str) -> Option<(String, String)> {
    let doc: BTreeMap<String, TypedSection> = serde_yaml::from_str(text).ok()?;
    let entry = doc.get(section)?.buckets.get(key)?;
    Some((
        entry.bucket.clone(),
        entry.prefix.clone().unwrap_or_default(),
    ))
}

/// Lenient traversal of the parsed YAML value tree: only the path
/// section → buckets → key needs to be well-formed.
fn attempt_value(text: &str, section: &str, key: &str) -> Option<(String, String)> {
    let doc: serde_yaml::Value = serde_yaml::from_str(text).ok()?;
    let entry = doc.get(section)?.get("buckets")?.get(key)?;
    let bucket = scalar_string(entry.get("Bucket")?)?;
    let prefix = entry
        .get("Prefix")
        .and_then(scalar_string)
        .unwrap_or_default();
    Some((bucket, prefix))
}

/// Last-resort line-oriented scan: locate the section, then a `buckets:`
/// block, then the named key, then `Bucket:`/`Prefix:` lines, all matched
/// indentation-agnostically. Survives YAML neither parser accepts.
fn attempt_line_scan(text: &str, section: &str, key: &str) -> Option<(String, String)> {
    let section_re = Regex::new(&format!(r"^\s*{}\s*:", regex::escape(section))).ok()?;
    let buckets_re = Regex::new(r"^\s*buckets\s*:").ok()?;
    let key_re = Regex::new(&format!(r"^\s*{}\s*:", regex::escape(key))).ok()?;
    let bucket_re = Regex::new(r"^\s*Bucket\s*:\s*(.+?)\s*$").ok()?;
    let prefix_re = Regex::new(r"^\s*Prefix\s*:\s*(.+?)\s*$").ok()?;

    let mut in_section = false;
    let mut in_buckets = false;
    let mut in_key = false;
    let mut bucket: Option<String> = None;
    let mut prefix: Option<String> = None;

    for line in text.lines() {
        if !in_section {
            in_section = section_re.is_match(line);
            continue;
        }
        if !in_buckets {
            in_buckets = buckets_re.is_match(line);
            continue;
        }
        if !in_key {
            in_key = key_re.is_match(line);
            continue;
        }
        if bucket.is_none() {
            if let Some(c) = bucket_re.captures(line) {
                bucket = Some(strip_quotes(&c[1]));
                continue;
            }
        }
        if prefix.is_none() {
            if let Some(c) = prefix_re.captures(line) {
                prefix = Some(strip_quotes(&c[1]));
                continue;
            }
        }
        if bucket.is_some() && prefix.is_some() {
            break;
        }
        // Any other mapping key ends the target block.
        if line.trim_end().ends_with(':') {
            break;
        }
    }
    bucket.map(|b| (b, prefix.unwrap_or_default()))
}

fn scalar_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn strip_quotes(s: &str) -> String {
    s.trim().trim_matches(|c| c == '"' || c == '\'').to_string()
}

fn is_null_like(s: &str) -> bool {
    let t = s.trim();
    t.is_empty() || t == "~" || t.eq_ignore_ascii_case("null")
}

/// Strip leading and trailing slashes; a missing prefix is the empty string.
fn normalize_prefix(prefix: &str) -> String {
    prefix
        .trim()
        .trim_start_matches('/')
        .trim_end_matches('/')
        .to_string()
}
