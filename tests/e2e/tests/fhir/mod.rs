//! End-to-end coverage of the FHIR Adapter (§4.3) in demo mode — no live
//! FHIR server is available in tests, so these exercise idempotent
//! ImagingStudy materialization and encounter matching against data held
//! in an in-memory store.

use chrono::{DateTime, Utc};
use medrag_core::fhir::{match_encounter, Encounter, FhirAdapter, ImagingStudyData, ResourceKind};
use medrag_core::models::{ImageRecord, MatchType, PatientMapping};
use medrag_core::store::DataStore;

fn imaging_study_data(id: &str, patient_id: &str) -> ImagingStudyData {
    ImagingStudyData {
        id: id.to_string(),
        patient_id: patient_id.to_string(),
        encounter_id: None,
        study_datetime: Utc::now(),
        modality: "CR".to_string(),
        description: "Chest X-ray, PA view".to_string(),
    }
}

#[tokio::test]
async fn materializing_the_same_imaging_study_twice_is_idempotent() {
    let fhir = FhirAdapter::demo("http://fhir.invalid");
    let data = imaging_study_data("study-s1", "patient-1");

    let first_id = fhir.materialize_imaging_study(&data).await.unwrap();
    let second_id = fhir.materialize_imaging_study(&data).await.unwrap();

    assert_eq!(first_id, data.id);
    assert_eq!(first_id, second_id);
}

#[tokio::test]
async fn linking_an_image_record_to_its_materialized_study_persists_the_reference() {
    let store = DataStore::open_in_memory().unwrap();
    store.ensure_tables().unwrap();
    let fhir = FhirAdapter::demo("http://fhir.invalid");

    store
        .insert_patient_mapping(&PatientMapping {
            subject_id: "p10000032".to_string(),
            fhir_patient_id: "patient-1".to_string(),
            fhir_patient_name: Some("Jane Doe".to_string()),
            match_confidence: 1.0,
            match_type: MatchType::RandomAssignment,
        })
        .unwrap();

    let record = ImageRecord {
        image_id: "img_a".to_string(),
        subject_id: "p10000032".to_string(),
        study_id: "s50000001".to_string(),
        view_position: "PA".to_string(),
        image_path: "files/p10/p10000032/s50000001/img_a.dcm".to_string(),
        embedding_model: "medrag-image-embed".to_string(),
        fhir_resource_id: None,
        created_at: Utc::now(),
    };
    store.upsert_image(&record, None).unwrap();

    let mapping = store.get_patient_mapping(&record.subject_id).unwrap().unwrap();
    let data = imaging_study_data("study-s50000001", &mapping.fhir_patient_id);
    let resource_id = fhir.materialize_imaging_study(&data).await.unwrap();
    store.update_image_fhir_resource(&record.image_id, &resource_id).unwrap();

    let updated = store.get_image(&record.image_id).unwrap().unwrap();
    assert_eq!(updated.fhir_resource_id.as_deref(), Some("study-s50000001"));

    let resource = fhir.build_imaging_study(&data);
    assert_eq!(resource["resourceType"], "ImagingStudy");
    assert_eq!(resource["subject"]["reference"], format!("Patient/{}", mapping.fhir_patient_id));
}

#[tokio::test]
async fn demo_mode_get_never_sees_a_real_resource() {
    let fhir = FhirAdapter::demo("http://fhir.invalid");
    assert!(fhir.demo_mode());
    let fetched = fhir.get(ResourceKind::ImagingStudy, "study-s1").await.unwrap();
    assert!(fetched.is_none());
}

fn encounter_at(id: &str, start: DateTime<Utc>, duration_minutes: i64) -> Encounter {
    Encounter { id: id.to_string(), start, end: start + chrono::Duration::minutes(duration_minutes) }
}

#[test]
fn an_imaging_study_matches_the_encounter_whose_window_contains_it() {
    let study_datetime = DateTime::parse_from_rfc3339("2021-03-01T08:00:00Z").unwrap().with_timezone(&Utc);

    let encounters = vec![
        encounter_at("enc-before", study_datetime - chrono::Duration::hours(48), 30),
        encounter_at("enc-same-day", study_datetime - chrono::Duration::minutes(15), 30),
        encounter_at("enc-after", study_datetime + chrono::Duration::hours(48), 30),
    ];

    let matched = match_encounter(&encounters, study_datetime, 24);
    assert_eq!(matched, Some("enc-same-day".to_string()));
}

#[test]
fn no_encounter_falling_in_the_window_yields_no_match() {
    let study_datetime = DateTime::parse_from_rfc3339("2021-03-01T08:00:00Z").unwrap().with_timezone(&Utc);
    let encounters = vec![encounter_at("enc-far", study_datetime + chrono::Duration::hours(72), 30)];

    assert_eq!(match_encounter(&encounters, study_datetime, 24), None);
}
