//! Ingestion Pipeline orchestration (§4.8).
//!
//! Drives discovery → dedup → batched embedding → upsert → optional FHIR
//! materialization → checkpointing → reporting. Single-threaded by default
//! (§5): batches run synchronously, one at a time.

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};

use crate::embeddings::Embeddings;
use crate::error::Result;
use crate::fhir::{FhirAdapter, ImagingStudyData};
use crate::models::ImageRecord;
use crate::store::DataStore;

use super::checkpoint::{Checkpoint, CHECKPOINT_INTERVAL};
use super::dicom::MetadataReader;
use super::discovery::find_dicom_files;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub source: PathBuf,
    pub batch_size: usize,
    pub limit: Option<usize>,
    pub skip_existing: bool,
    pub dry_run: bool,
    pub create_fhir: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            batch_size: 32,
            limit: None,
            skip_existing: true,
            dry_run: false,
            create_fhir: false,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IngestReport {
    pub discovered: usize,
    pub skipped_large: usize,
    pub skipped_existing: usize,
    pub inserted: usize,
    pub errored: usize,
    pub fhir_linked: usize,
    pub fhir_skipped: usize,
    pub fhir_errored: usize,
}

/// Runs the pipeline against `options`. `fhir` is only consulted when
/// `options.create_fhir` is set.
pub async fn run(
    store: &DataStore,
    embeddings: &Embeddings,
    fhir: Option<&FhirAdapter>,
    reader: &dyn MetadataReader,
    options: &IngestOptions,
) -> Result<IngestReport> {
    let discovery = find_dicom_files(&options.source, options.limit)?;
    let mut report = IngestReport {
        discovered: discovery.files.len(),
        skipped_large: discovery.skipped_large,
        ..Default::default()
    };

    let mut checkpoint = Checkpoint::load(&options.source)?;
    let mut candidates = Vec::new();
    for file in discovery.files {
        if checkpoint.contains(&file.image_id) {
            report.skipped_existing += 1;
            continue;
        }
        if options.skip_existing && store.image_exists(&file.image_id)? {
            report.skipped_existing += 1;
            checkpoint.insert(file.image_id.clone());
            continue;
        }
        candidates.push(file);
    }

    tracing::info!(
        total_candidates = candidates.len(),
        skipped_existing = report.skipped_existing,
        "starting ingestion batches"
    );

    let started = std::time::Instant::now();
    let mut processed_since_checkpoint = 0usize;

    for batch in candidates.chunks(options.batch_size.max(1)) {
        let mut batch_records: Vec<(ImageRecord, Vec<f32>, Option<String>)> = Vec::new();
        let mut prompts = Vec::new();
        let mut batch_meta = Vec::new();

        for file in batch {
            match reader.read(&file.file_path) {
                Ok(metadata) => {
                    prompts.push(format!("Chest X-ray {} view", metadata.view_position));
                    batch_meta.push((file, metadata));
                }
                Err(err) => {
                    tracing::warn!(image_id = %file.image_id, error = %err, "failed to read DICOM metadata");
                    report.errored += 1;
                }
            }
        }

        if prompts.is_empty() {
            continue;
        }

        let embeddings_out = embeddings.embed_image_batch(&prompts).await;
        for ((file, metadata), embedding) in batch_meta.into_iter().zip(embeddings_out) {
            let record = ImageRecord {
                image_id: file.image_id.clone(),
                subject_id: file.subject_id.clone(),
                study_id: file.study_id.clone(),
                view_position: metadata.view_position.clone(),
                image_path: file.file_path.to_string_lossy().to_string(),
                embedding_model: "medrag-image-embed".to_string(),
                fhir_resource_id: None,
                created_at: Utc::now(),
            };
            batch_records.push((record, embedding.vector, metadata.study_date));
        }

        if !options.dry_run {
            for (record, vector, _) in &batch_records {
                match store.upsert_image(record, Some(vector)) {
                    Ok(()) => {
                        report.inserted += 1;
                        checkpoint.insert(record.image_id.clone());
                    }
                    Err(err) => {
                        tracing::warn!(image_id = %record.image_id, error = %err, "failed to upsert image row");
                        report.errored += 1;
                    }
                }
            }

            if options.create_fhir {
                if let Some(fhir) = fhir {
                    for (record, _, study_date) in &batch_records {
                        match materialize_one(store, fhir, record, study_date.as_deref()).await {
                            Ok(MaterializeOutcome::Linked) => report.fhir_linked += 1,
                            Ok(MaterializeOutcome::SkippedNoPatient) => report.fhir_skipped += 1,
                            Err(err) => {
                                tracing::warn!(image_id = %record.image_id, error = %err, "FHIR materialization failed");
                                report.fhir_errored += 1;
                            }
                        }
                    }
                } else {
                    report.fhir_skipped += batch_records.len();
                }
            }
        }

        processed_since_checkpoint += batch.len();
        if processed_since_checkpoint >= CHECKPOINT_INTERVAL {
            checkpoint.persist()?;
            processed_since_checkpoint = 0;
        }

        let elapsed = started.elapsed().as_secs_f64().max(0.001);
        let processed_total = report.inserted + report.errored + report.skipped_existing;
        let rate = processed_total as f64 / elapsed;
        tracing::info!(
            processed = processed_total,
            total = report.discovered,
            rate_per_sec = rate,
            "batch complete"
        );
    }

    if !options.dry_run {
        checkpoint.persist()?;
        store.persist_indexes()?;
    }

    Ok(report)
}

enum MaterializeOutcome {
    Linked,
    SkippedNoPatient,
}

async fn materialize_one(
    store: &DataStore,
    fhir: &FhirAdapter,
    record: &ImageRecord,
    study_date: Option<&str>,
) -> Result<MaterializeOutcome> {
    let Some(mapping) = store.get_patient_mapping(&record.subject_id)? else {
        return Ok(MaterializeOutcome::SkippedNoPatient);
    };

    let study_datetime = study_date.and_then(parse_study_date).unwrap_or_else(Utc::now);
    let data = ImagingStudyData {
        id: format!("study-{}", record.study_id),
        patient_id: mapping.fhir_patient_id,
        encounter_id: None,
        study_datetime,
        modality: "CR".to_string(),
        description: format!("Chest X-ray, {} view", record.view_position),
    };
    let resource_id = fhir.materialize_imaging_study(&data).await?;
    store.update_image_fhir_resource(&record.image_id, &resource_id)?;
    Ok(MaterializeOutcome::Linked)
}

/// Parse a DICOM `YYYYMMDD` study date into a UTC midnight timestamp, for
/// FHIR `ImagingStudy.started` when a real study date was read.
fn parse_study_date(study_date: &str) -> Option<chrono::DateTime<Utc>> {
    if study_date.len() != 8 {
        return None;
    }
    let year: i32 = study_date[0..4].parse().ok()?;
    let month: u32 = study_date[4..6].parse().ok()?;
    let day: u32 = study_date[6..8].parse().ok()?;
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single()
}
