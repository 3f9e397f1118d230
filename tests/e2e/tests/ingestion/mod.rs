//! End-to-end coverage of the ingestion pipeline (§4.8) driven through its
//! real entry point — `ingest::run` with the `DefaultMetadataReader` byte
//! parser — against a synthetic MIMIC-CXR-shaped directory tree, rather
//! than the fixture-reader path the pipeline's own unit tests use.

use medrag_core::embeddings::Embeddings;
use medrag_core::ingest::{self, DefaultMetadataReader, IngestOptions};
use medrag_core::store::DataStore;

/// A minimal explicit-VR little-endian DICOM byte stream carrying just the
/// tags `DefaultMetadataReader` reads: study date, modality, view position.
fn minimal_dicom_bytes(view_position: &str, modality: &str, study_date: &str) -> Vec<u8> {
    let mut bytes = vec![0u8; 128];
    bytes.extend_from_slice(b"DICM");

    fn push_element(bytes: &mut Vec<u8>, group: u16, element: u16, vr: &str, value: &str) {
        bytes.extend_from_slice(&group.to_le_bytes());
        bytes.extend_from_slice(&element.to_le_bytes());
        bytes.extend_from_slice(vr.as_bytes());
        let mut padded = value.as_bytes().to_vec();
        if padded.len() % 2 != 0 {
            padded.push(b' ');
        }
        bytes.extend_from_slice(&(padded.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&padded);
    }

    push_element(&mut bytes, 0x0008, 0x0020, "DA", study_date);
    push_element(&mut bytes, 0x0008, 0x0060, "CS", modality);
    push_element(&mut bytes, 0x0018, 0x5101, "CS", view_position);
    bytes
}

fn write_scenario_fixture(root: &std::path::Path) {
    let files = [
        ("files/p10/p10000032/s50000001/img_a.dcm", "PA", "20210101"),
        ("files/p10/p10000032/s50000001/img_b.dcm", "AP", "20210102"),
        ("files/p11/p11000100/s50000099/img_c.dcm", "LATERAL", "20210103"),
    ];
    for (rel, view, date) in files {
        let full = root.join(rel);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(&full, minimal_dicom_bytes(view, "CR", date)).unwrap();
    }
}

#[tokio::test]
async fn ingests_three_dicoms_in_batches_of_two_and_is_idempotent_on_rerun() {
    let source = tempfile::tempdir().unwrap();
    write_scenario_fixture(source.path());

    let store = DataStore::open_in_memory().unwrap();
    store.ensure_tables().unwrap();
    let embeddings = Embeddings::new("http://127.0.0.1:0");
    let reader = DefaultMetadataReader;

    let options = IngestOptions {
        source: source.path().to_path_buf(),
        batch_size: 2,
        limit: None,
        skip_existing: true,
        dry_run: false,
        create_fhir: false,
    };

    let first_report = ingest::run(&store, &embeddings, None, &reader, &options).await.unwrap();
    assert_eq!(first_report.discovered, 3);
    assert_eq!(first_report.inserted, 3);
    assert_eq!(first_report.errored, 0);
    assert_eq!(first_report.skipped_existing, 0);

    let img_a = store.get_image("img_a").unwrap().expect("img_a must be ingested");
    assert_eq!(img_a.subject_id, "p10000032");
    assert_eq!(img_a.study_id, "s50000001");
    let img_c = store.get_image("img_c").unwrap().expect("img_c must be ingested");
    assert_eq!(img_c.subject_id, "p11000100");
    assert_eq!(img_c.study_id, "s50000099");

    let checkpoint = ingest::Checkpoint::load(source.path()).unwrap();
    assert_eq!(checkpoint.len(), 3);
    for id in ["img_a", "img_b", "img_c"] {
        assert!(checkpoint.contains(id));
    }

    let second_report = ingest::run(&store, &embeddings, None, &reader, &options).await.unwrap();
    assert_eq!(second_report.discovered, 3);
    assert_eq!(second_report.inserted, 0);
    assert_eq!(second_report.skipped_existing, 3);
}

#[tokio::test]
async fn dry_run_discovers_without_writing_any_rows() {
    let source = tempfile::tempdir().unwrap();
    write_scenario_fixture(source.path());

    let store = DataStore::open_in_memory().unwrap();
    store.ensure_tables().unwrap();
    let embeddings = Embeddings::new("http://127.0.0.1:0");
    let reader = DefaultMetadataReader;

    let options = IngestOptions {
        source: source.path().to_path_buf(),
        batch_size: 2,
        limit: None,
        skip_existing: true,
        dry_run: true,
        create_fhir: false,
    };

    let report = ingest::run(&store, &embeddings, None, &reader, &options).await.unwrap();
    assert_eq!(report.discovered, 3);
    assert_eq!(report.inserted, 0);
    assert!(store.get_image("img_a").unwrap().is_none());
}

#[tokio::test]
async fn limit_caps_the_number_of_files_discovered() {
    let source = tempfile::tempdir().unwrap();
    write_scenario_fixture(source.path());

    let store = DataStore::open_in_memory().unwrap();
    store.ensure_tables().unwrap();
    let embeddings = Embeddings::new("http://127.0.0.1:0");
    let reader = DefaultMetadataReader;

    let options = IngestOptions {
        source: source.path().to_path_buf(),
        batch_size: 2,
        limit: Some(1),
        skip_existing: true,
        dry_run: false,
        create_fhir: false,
    };

    let report = ingest::run(&store, &embeddings, None, &reader, &options).await.unwrap();
    assert_eq!(report.discovered, 1);
    assert_eq!(report.inserted, 1);
}
