use std::fs;
use std::path::Path;

use tempfile::tempdir;

use runpack_core::contract::{
    MetadataSource, MockMetadataAttacher, MockPackageBuilder, MockRunUploader,
};
use runpack_core::discover::{discover_runs, RunDirectory};
use runpack_core::metadata::MetadataOutcome;
use runpack_core::orchestrate::{
    run_pipeline, MetadataConfig, PipelineConfig, RunState, StageKind,
};
use runpack_core::upload::upload_run;

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        namespace: "genexomics".to_string(),
        registry: "s3://genexomics-quilt".to_string(),
        message: None,
        metadata: None,
        manifest_dir: None,
        fail_on_run_error: true,
    }
}

fn location_uploader(bucket: &str, prefix: &str) -> MockRunUploader {
    let bucket = bucket.to_string();
    let prefix = prefix.to_string();
    let mut uploader = MockRunUploader::new();
    uploader.expect_upload_file().returning(move |file: &Path| {
        let name = file
            .file_name()
            .expect("uploaded path has a file name")
            .to_string_lossy()
            .into_owned();
        Ok(format!("s3://{bucket}/{prefix}/{name}"))
    });
    uploader
}

#[tokio::test]
async fn run_is_uploaded_packaged_and_reported_done() {
    let tmp = tempdir().unwrap();
    let run_dir = tmp.path().join("run_001");
    fs::create_dir(&run_dir).unwrap();
    fs::write(run_dir.join("a.fastq.gz"), b"@read-a").unwrap();
    fs::write(run_dir.join("b.fastq.gz"), b"@read-b").unwrap();

    let uploader = location_uploader("genexomics-runs", "runs/run_001");

    let mut builder = MockPackageBuilder::new();
    builder
        .expect_build()
        .withf(|req| {
            req.bucket == "genexomics-runs"
                && req.prefix == "runs/run_001"
                && req.namespace == "genexomics"
                && req.package_base == "run_001"
                && req.registry == "s3://genexomics-quilt"
        })
        .returning(|_| {
            Ok("Listed 2 objects\nCreated package: genexomics/run_001@4a5b\n".to_string())
        });

    let attacher = MockMetadataAttacher::new();

    let mut cfg = pipeline_config();
    let manifest_dir = tmp.path().join("manifests");
    cfg.manifest_dir = Some(manifest_dir.clone());

    let runs = discover_runs(tmp.path()).unwrap();
    let report = run_pipeline(&cfg, &uploader, &builder, &attacher, runs).await;

    assert_eq!(report.runs.len(), 1);
    let run = &report.runs[0];
    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.objects, 2);
    assert_eq!(
        run.package.as_ref().unwrap().identifier,
        "genexomics/run_001@4a5b"
    );
    assert!(run.error.is_none());
    assert!(!report.any_failed());

    // Persisted manifest holds the sorted location set.
    let persisted = fs::read_to_string(manifest_dir.join("run_001.manifest")).unwrap();
    assert_eq!(
        persisted,
        "s3://genexomics-runs/runs/run_001/a.fastq.gz\ns3://genexomics-runs/runs/run_001/b.fastq.gz\n"
    );
}

#[tokio::test]
async fn manifest_is_sorted_and_deduplicated() {
    let tmp = tempdir().unwrap();
    let run_dir = tmp.path().join("run_007");
    fs::create_dir(&run_dir).unwrap();
    for name in ["z.fastq.gz", "a.fastq.gz", "m.fastq.gz"] {
        fs::write(run_dir.join(name), b"x").unwrap();
    }

    let uploader = location_uploader("genexomics-runs", "runs/run_007");
    let run = RunDirectory {
        name: "run_007".to_string(),
        path: run_dir,
    };
    let manifest = upload_run(&uploader, &run).await.unwrap();
    let locations = manifest.locations();
    assert_eq!(locations.len(), 3);
    let mut sorted = locations.to_vec();
    sorted.sort();
    assert_eq!(locations, sorted.as_slice(), "manifest order must be sorted");
}

#[tokio::test]
async fn duplicate_locations_are_absorbed_by_finalization() {
    let tmp = tempdir().unwrap();
    let run_dir = tmp.path().join("run_009");
    fs::create_dir(&run_dir).unwrap();
    fs::write(run_dir.join("a.fastq.gz"), b"x").unwrap();
    fs::write(run_dir.join("b.fastq.gz"), b"x").unwrap();

    // A retried uploader reporting the same resulting location twice.
    let mut uploader = MockRunUploader::new();
    uploader
        .expect_upload_file()
        .returning(|_| Ok("s3://genexomics-runs/runs/run_009/same.fastq.gz".to_string()));

    let run = RunDirectory {
        name: "run_009".to_string(),
        path: run_dir,
    };
    let manifest = upload_run(&uploader, &run).await.unwrap();
    assert_eq!(manifest.len(), 1);
}

#[tokio::test]
async fn empty_run_fails_alone_while_sibling_completes() {
    let tmp = tempdir().unwrap();
    fs::create_dir(tmp.path().join("run_000")).unwrap();
    let populated = tmp.path().join("run_001");
    fs::create_dir(&populated).unwrap();
    fs::write(populated.join("a.fastq.gz"), b"x").unwrap();

    let uploader = location_uploader("genexomics-runs", "runs/run_001");

    let mut builder = MockPackageBuilder::new();
    builder
        .expect_build()
        .times(1)
        .returning(|_| Ok("Created package: genexomics/run_001@aa11\n".to_string()));

    let attacher = MockMetadataAttacher::new();
    let cfg = pipeline_config();
    let runs = discover_runs(tmp.path()).unwrap();
    let report = run_pipeline(&cfg, &uploader, &builder, &attacher, runs).await;

    assert_eq!(report.runs.len(), 2);
    let empty = report.runs.iter().find(|r| r.run_name == "run_000").unwrap();
    assert_eq!(empty.state, RunState::Failed(StageKind::Package));
    assert!(empty.error.as_deref().unwrap().contains("no uploaded objects"));

    let ok = report.runs.iter().find(|r| r.run_name == "run_001").unwrap();
    assert_eq!(ok.state, RunState::Done);
    assert!(report.any_failed());
    assert_eq!(report.failed(), 1);
}

#[tokio::test]
async fn upload_failure_marks_only_that_run_failed() {
    let tmp = tempdir().unwrap();
    let broken = tmp.path().join("run_001");
    fs::create_dir(&broken).unwrap();
    fs::write(broken.join("a.fastq.gz"), b"x").unwrap();
    let healthy = tmp.path().join("run_002");
    fs::create_dir(&healthy).unwrap();
    fs::write(healthy.join("b.fastq.gz"), b"x").unwrap();

    let mut uploader = MockRunUploader::new();
    uploader.expect_upload_file().returning(|file: &Path| {
        if file.to_string_lossy().contains("run_001") {
            Err("connection reset".into())
        } else {
            Ok("s3://genexomics-runs/runs/run_002/b.fastq.gz".to_string())
        }
    });

    let mut builder = MockPackageBuilder::new();
    builder
        .expect_build()
        .times(1)
        .returning(|_| Ok("Created package: genexomics/run_002@bb22\n".to_string()));

    let attacher = MockMetadataAttacher::new();
    let cfg = pipeline_config();
    let runs = discover_runs(tmp.path()).unwrap();
    let report = run_pipeline(&cfg, &uploader, &builder, &attacher, runs).await;

    let failed = report.runs.iter().find(|r| r.run_name == "run_001").unwrap();
    assert_eq!(failed.state, RunState::Failed(StageKind::Upload));
    let ok = report.runs.iter().find(|r| r.run_name == "run_002").unwrap();
    assert_eq!(ok.state, RunState::Done);
}

#[tokio::test]
async fn missing_package_marker_fails_the_run() {
    let tmp = tempdir().unwrap();
    let run_dir = tmp.path().join("run_001");
    fs::create_dir(&run_dir).unwrap();
    fs::write(run_dir.join("a.fastq.gz"), b"x").unwrap();

    let uploader = location_uploader("genexomics-runs", "runs/run_001");

    let mut builder = MockPackageBuilder::new();
    builder
        .expect_build()
        .returning(|_| Ok("push complete, no marker emitted\n".to_string()));

    let attacher = MockMetadataAttacher::new();
    let cfg = pipeline_config();
    let runs = discover_runs(tmp.path()).unwrap();
    let report = run_pipeline(&cfg, &uploader, &builder, &attacher, runs).await;

    let run = &report.runs[0];
    assert_eq!(run.state, RunState::Failed(StageKind::Package));
    assert!(run.error.as_deref().unwrap().contains("marker"));
}

#[tokio::test]
async fn supported_metadata_source_is_attached() {
    let tmp = tempdir().unwrap();
    let run_dir = tmp.path().join("run_001");
    fs::create_dir(&run_dir).unwrap();
    fs::write(run_dir.join("a.fastq.gz"), b"x").unwrap();

    let uploader = location_uploader("genexomics-runs", "runs/run_001");

    let mut builder = MockPackageBuilder::new();
    builder
        .expect_build()
        .returning(|_| Ok("Created package: genexomics/run_001@cc33\n".to_string()));

    let mut attacher = MockMetadataAttacher::new();
    attacher
        .expect_attach()
        .withf(|req| {
            req.source == MetadataSource::Benchling
                && req.entity == "BE-abc123"
                && req.package_identifier == "genexomics/run_001@cc33"
        })
        .returning(|_| Ok(()));

    let mut cfg = pipeline_config();
    cfg.metadata = Some(MetadataConfig {
        source: MetadataSource::Benchling,
        entity: "BE-abc123".to_string(),
    });
    let runs = discover_runs(tmp.path()).unwrap();
    let report = run_pipeline(&cfg, &uploader, &builder, &attacher, runs).await;

    let run = &report.runs[0];
    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.metadata, Some(MetadataOutcome::Attached));
}

#[tokio::test]
async fn unsupported_metadata_source_still_reaches_done() {
    let tmp = tempdir().unwrap();
    let run_dir = tmp.path().join("run_001");
    fs::create_dir(&run_dir).unwrap();
    fs::write(run_dir.join("a.fastq.gz"), b"x").unwrap();

    let uploader = location_uploader("genexomics-runs", "runs/run_001");

    let mut builder = MockPackageBuilder::new();
    builder
        .expect_build()
        .returning(|_| Ok("Created package: genexomics/run_001@dd44\n".to_string()));

    // No expectations: the attacher must never be invoked for an
    // unsupported source.
    let attacher = MockMetadataAttacher::new();

    let mut cfg = pipeline_config();
    cfg.metadata = Some(MetadataConfig {
        source: MetadataSource::from("labkey"),
        entity: String::new(),
    });
    let runs = discover_runs(tmp.path()).unwrap();
    let report = run_pipeline(&cfg, &uploader, &builder, &attacher, runs).await;

    let run = &report.runs[0];
    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.metadata, Some(MetadataOutcome::Skipped));
    assert!(!report.any_failed());
}

#[tokio::test]
async fn failed_metadata_attachment_degrades_to_skipped() {
    let tmp = tempdir().unwrap();
    let run_dir = tmp.path().join("run_001");
    fs::create_dir(&run_dir).unwrap();
    fs::write(run_dir.join("a.fastq.gz"), b"x").unwrap();

    let uploader = location_uploader("genexomics-runs", "runs/run_001");

    let mut builder = MockPackageBuilder::new();
    builder
        .expect_build()
        .returning(|_| Ok("Created package: genexomics/run_001@ee55\n".to_string()));

    let mut attacher = MockMetadataAttacher::new();
    attacher
        .expect_attach()
        .returning(|_| Err("benchling API unreachable".into()));

    let mut cfg = pipeline_config();
    cfg.metadata = Some(MetadataConfig {
        source: MetadataSource::Benchling,
        entity: "BE-abc123".to_string(),
    });
    let runs = discover_runs(tmp.path()).unwrap();
    let report = run_pipeline(&cfg, &uploader, &builder, &attacher, runs).await;

    let run = &report.runs[0];
    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.metadata, Some(MetadataOutcome::Skipped));
}

#[test]
fn discovery_matches_convention_and_sorts() {
    let tmp = tempdir().unwrap();
    fs::create_dir(tmp.path().join("run_002")).unwrap();
    fs::create_dir(tmp.path().join("run_001")).unwrap();
    fs::create_dir(tmp.path().join("scratch")).unwrap();
    fs::write(tmp.path().join("run_999"), b"a file, not a run").unwrap();

    let runs = discover_runs(tmp.path()).unwrap();
    let names: Vec<&str> = runs.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["run_001", "run_002"]);
}
