//! Ingestion scenarios: idempotent registration, the tabular join, resume.

mod common;

use common::{ingest_sdf, pipeline, sdf_block};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stitcher::adapter::tabular::{JoinKey, TableSpec, TabularJoin};
use stitcher::{
    CurationGraph, CurationPipeline, CuratorConfig, ExtractorRegistry, IngestOutcome,
    IngestRequest, InputSet, KeyKind, KeyPolicy, Label, PropertyValue, SourceState,
};

fn status_join() -> TabularJoin {
    TabularJoin::new(
        "products",
        vec![
            TableSpec::new("Products.txt", JoinKey::Compound("ApplNo".into(), "ProductNo".into())),
            TableSpec::new("Status.txt", JoinKey::Primary("ApplNo".into())),
        ],
    )
    .with_policy(
        KeyPolicy::new()
            .with_id("ApplNo")
            .add(KeyKind::Code, "ApplNo")
            .add(KeyKind::Name, "DrugName"),
    )
}

const PRODUCTS: &str = "ApplNo\tProductNo\tDrugName\n\
                        A001\tP1\tASPIRIN\n\
                        A001\tP2\tASPIRIN\n\
                        A002\tP1\tHEPARIN\n";

#[test]
fn identical_bytes_register_once() {
    let pipeline = pipeline();
    let blocks = vec![sdf_block("aspirin", &[("CAS", "50-78-2")])];

    let first = ingest_sdf(&pipeline, "npc", &blocks);
    assert_eq!(first.outcome, IngestOutcome::Created);
    assert_eq!(first.entities_created, 1);

    // same content under another name is still the same data source
    let second = ingest_sdf(&pipeline, "npc-copy", &blocks);
    assert_eq!(second.outcome, IngestOutcome::AlreadyRegistered);
    assert_eq!(second.entities_created, 0);
    assert_eq!(second.source.name, "npc");

    let sources = pipeline.graph().sources().unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].instances, 1);
    assert_eq!(pipeline.graph().snapshot().unwrap().entities.len(), 1);
}

#[test]
fn status_file_reaches_every_product_of_a_known_application() {
    let mut extractors = ExtractorRegistry::new();
    extractors.register(Arc::new(status_join()));
    let graph = Arc::new(CurationGraph::in_memory().unwrap());
    let pipeline = CurationPipeline::new(graph, CuratorConfig::default()).with_extractors(extractors);

    let input = InputSet::memory([
        ("Products.txt", PRODUCTS.as_bytes().to_vec()),
        ("Status.txt", b"ApplNo\tStatus\nA001\tApproved\nZ999\tWithdrawn\n".to_vec()),
    ]);
    let report = pipeline
        .ingest(IngestRequest::new("fda", "products", input))
        .unwrap();
    assert_eq!(report.source.instances, 3);
    assert_eq!(report.rejected, 0);

    let snapshot = pipeline.graph().snapshot().unwrap();
    let status_of = |appl: &str| -> Vec<Option<PropertyValue>> {
        snapshot
            .entities
            .values()
            .filter(|e| e.source_key.as_deref() == Some(appl))
            .map(|e| e.properties.get("Status").cloned())
            .collect()
    };
    assert_eq!(
        status_of("A001"),
        vec![Some("Approved".into()), Some("Approved".into())]
    );
    assert_eq!(status_of("A002"), vec![None]);

    // both A001 products share I_CODE and N_Name
    let links = snapshot.link_counts();
    assert_eq!(links.get(&KeyKind::Code), Some(&1));
    assert_eq!(links.get(&KeyKind::Name), Some(&1));
}

/// The five Drugs@FDA tables, in archive order rather than join order
const DRUGS_AT_FDA_FILES: [(&str, &str); 5] = [
    ("Applications.txt", "ApplNo,ApplType,SponsorName\nA001,NDA,ACME\n"),
    (
        "ApplicationDocs.txt",
        "ApplicationDocsID,ApplicationDocsTypeID,ApplNo\n9001,2,A001\n",
    ),
    (
        "MarketingStatus.txt",
        "MarketingStatusID,ApplNo,ProductNo\n1,A001,P1\n3,A001,P2\n",
    ),
    (
        "Products.txt",
        "ApplNo,ProductNo,Form,DrugName,ActiveIngredient\n\
         A001,P1,\"TABLET, FILM COATED;ORAL\",ASPIRIN,ASPIRIN\n\
         A001,P2,CAPSULE,ASPIRIN,ASPIRIN;CAFFEINE\n",
    ),
    (
        "Submissions.txt",
        "ApplNo,SubmissionClassCodeID,SubmissionType\nA001,7,ORIG\nA001,99,SUPPL\n",
    ),
];

fn drugs_at_fda_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, text) in DRUGS_AT_FDA_FILES {
        fs::write(dir.path().join(name), text).unwrap();
    }
    dir
}

fn drugs_at_fda_zip(dir: &Path, skip: Option<&str>) -> PathBuf {
    let path = dir.join("drugsatfda.zip");
    let mut writer = zip::ZipWriter::new(fs::File::create(&path).unwrap());
    for (name, text) in DRUGS_AT_FDA_FILES {
        if Some(name) == skip {
            continue;
        }
        writer
            .start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(text.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
    path
}

#[test]
fn drugs_at_fda_directory_joins_all_five_files() {
    let dir = drugs_at_fda_dir();

    let pipeline = pipeline();
    let report = pipeline
        .ingest(IngestRequest::new("drugsatfda", "drugs-at-fda", InputSet::from_path(dir.path())))
        .unwrap();
    assert_eq!(report.outcome, IngestOutcome::Created);
    assert_eq!(report.source.instances, 2);
    // the out-of-range submission class code is skipped, not fatal
    assert_eq!(report.rejected, 1);

    let snapshot = pipeline.graph().snapshot().unwrap();
    let p1 = snapshot
        .entities
        .values()
        .find(|e| e.properties.get("MarketingStatus") == Some(&"Prescription".into()))
        .expect("P1 carries its own marketing status");
    assert_eq!(p1.properties.get("SponsorName"), Some(&"ACME".into()));
    assert_eq!(p1.properties.get("ApplicationDocsType"), Some(&"Label".into()));
    assert_eq!(p1.properties.get("SubmissionClass"), Some(&"TYPE 1".into()));
    assert!(p1.has_label(&Label::Source("drugsatfda".into())));
    assert_eq!(
        p1.properties.get("Form"),
        Some(&PropertyValue::List(vec!["TABLET, FILM COATED".into(), "ORAL".into()]))
    );

    let p2 = snapshot.entities.values().find(|e| e.id != p1.id).unwrap();
    assert_eq!(p2.properties.get("MarketingStatus"), Some(&"Discontinued".into()));
    assert_eq!(
        p2.properties.get("ActiveIngredient"),
        Some(&PropertyValue::List(vec!["ASPIRIN".into(), "CAFFEINE".into()]))
    );
}

#[test]
fn zipped_download_digests_like_the_unpacked_directory() {
    let dir = drugs_at_fda_dir();
    let from_dir = pipeline()
        .ingest(IngestRequest::new("fda-dir", "drugs-at-fda", InputSet::from_path(dir.path())))
        .unwrap();

    let archive_dir = tempfile::tempdir().unwrap();
    let archive = drugs_at_fda_zip(archive_dir.path(), None);
    let pipeline = pipeline();
    let from_zip = pipeline
        .ingest(IngestRequest::new("fda-zip", "drugs-at-fda", InputSet::from_path(&archive)))
        .unwrap();

    assert_eq!(from_zip.outcome, IngestOutcome::Created);
    assert_eq!(from_zip.source.id, from_dir.source.id);
    assert_eq!(from_zip.source.instances, 2);
    assert_eq!(from_zip.rejected, 1);
    assert_eq!(pipeline.graph().snapshot().unwrap().entities.len(), 2);
}

#[test]
fn zip_without_a_table_is_a_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let archive = drugs_at_fda_zip(dir.path(), Some("Submissions.txt"));

    let pipeline = pipeline();
    let err = pipeline
        .ingest(IngestRequest::new("fda", "drugs-at-fda", InputSet::from_path(&archive)))
        .unwrap_err();
    assert!(err.to_string().contains("Submissions.txt"), "{}", err);
    assert!(pipeline.graph().sources().unwrap().is_empty());
}

#[test]
fn missing_table_aborts_before_registration() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Products.txt"), PRODUCTS).unwrap();

    let pipeline = pipeline();
    let err = pipeline
        .ingest(IngestRequest::new("fda", "drugs-at-fda", InputSet::from_path(dir.path())))
        .unwrap_err();
    assert!(err.to_string().contains("MarketingStatus.txt"), "{}", err);
    assert!(pipeline.graph().sources().unwrap().is_empty());
}

#[test]
fn gzipped_sd_file_is_read_transparently() {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let blocks = [
        sdf_block("aspirin", &[("ID", "NPC1"), ("NAME", "Aspirin")]),
        sdf_block("caffeine", &[("ID", "NPC2"), ("NAME", "Caffeine")]),
    ];
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(&common::sdf(&blocks)).unwrap();
    let bytes = gz.finish().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("npc.sdf.gz");
    fs::write(&path, bytes).unwrap();

    let pipeline = pipeline();
    let report = pipeline
        .ingest(IngestRequest::new("npc", "sdf", InputSet::from_path(&path)).with_policy(common::sdf_policy()))
        .unwrap();
    assert_eq!(report.source.instances, 2);
    assert_eq!(report.source.state, SourceState::Complete);

    let keys: Vec<_> = pipeline
        .graph()
        .snapshot()
        .unwrap()
        .entities
        .values()
        .filter_map(|e| e.source_key.clone())
        .collect();
    assert_eq!(keys, vec!["NPC1", "NPC2"]);
}

#[test]
fn expected_digest_mismatch_creates_nothing() {
    let pipeline = pipeline();
    let input = InputSet::memory([("npc.sdf", common::sdf(&[sdf_block("x", &[])]))]);
    let err = pipeline
        .ingest(IngestRequest::new("npc", "sdf", input).with_expected_digest("0000000"))
        .unwrap_err();
    assert!(err.to_string().contains("Digest mismatch"), "{}", err);
    assert!(pipeline.graph().sources().unwrap().is_empty());
    assert!(pipeline.graph().snapshot().unwrap().entities.is_empty());
}
