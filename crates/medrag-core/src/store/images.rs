//! Radiology images and MIMIC↔FHIR patient mapping (§4.2, §4.6, §4.8).

use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::error::Result;
use crate::models::{ImageRecord, MatchType, PatientMapping};

use super::{vector_to_blob, DataStore};

fn row_to_image(row: &rusqlite::Row) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        image_id: row.get("image_id")?,
        subject_id: row.get("subject_id")?,
        study_id: row.get("study_id")?,
        view_position: row.get("view_position")?,
        image_path: row.get("image_path")?,
        embedding_model: row.get("embedding_model")?,
        fhir_resource_id: row.get("fhir_resource_id")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_mapping(row: &rusqlite::Row) -> rusqlite::Result<PatientMapping> {
    let match_type: String = row.get("match_type")?;
    Ok(PatientMapping {
        subject_id: row.get("mimic_subject_id")?,
        fhir_patient_id: row.get("fhir_patient_id")?,
        fhir_patient_name: row.get("fhir_patient_name")?,
        match_confidence: row.get("match_confidence")?,
        match_type: match match_type.as_str() {
            "synthea_generated" => MatchType::SyntheaGenerated,
            _ => MatchType::RandomAssignment,
        },
    })
}

impl DataStore {
    /// Idempotent on `image_id` (§4.8 phase 6: a re-run of ingestion over
    /// an already-ingested file updates the row in place rather than
    /// duplicating it).
    pub fn upsert_image(&self, image: &ImageRecord, embedding: Option<&[f32]>) -> Result<()> {
        let blob = embedding.map(vector_to_blob);
        let now = Utc::now().to_rfc3339();
        self.writer().execute(
            "INSERT INTO mimic_cxr_images \
             (image_id, subject_id, study_id, view_position, image_path, vector, embedding_model, \
              fhir_resource_id, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) \
             ON CONFLICT(image_id) DO UPDATE SET \
             subject_id = excluded.subject_id, \
             study_id = excluded.study_id, \
             view_position = excluded.view_position, \
             image_path = excluded.image_path, \
             vector = excluded.vector, \
             embedding_model = excluded.embedding_model, \
             fhir_resource_id = excluded.fhir_resource_id, \
             updated_at = excluded.updated_at",
            rusqlite::params![
                image.image_id,
                image.subject_id,
                image.study_id,
                image.view_position,
                image.image_path,
                blob,
                image.embedding_model,
                image.fhir_resource_id,
                now,
            ],
        )?;
        if let Some(vector) = embedding {
            self.image_index
                .lock()
                .expect("image index lock poisoned")
                .upsert(&image.image_id, vector)?;
        }
        Ok(())
    }

    pub fn image_exists(&self, image_id: &str) -> Result<bool> {
        Ok(self
            .reader()
            .query_row(
                "SELECT 1 FROM mimic_cxr_images WHERE image_id = ?1",
                [image_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    pub fn get_image(&self, image_id: &str) -> Result<Option<ImageRecord>> {
        Ok(self
            .reader()
            .query_row(
                "SELECT * FROM mimic_cxr_images WHERE image_id = ?1",
                [image_id],
                row_to_image,
            )
            .optional()?)
    }

    pub fn update_image_fhir_resource(&self, image_id: &str, resource_id: &str) -> Result<()> {
        self.writer().execute(
            "UPDATE mimic_cxr_images SET fhir_resource_id = ?1, updated_at = ?2 WHERE image_id = ?3",
            rusqlite::params![resource_id, Utc::now().to_rfc3339(), image_id],
        )?;
        Ok(())
    }

    /// Semantic search over image embeddings (§4.6), optionally filtered
    /// by subject or view position.
    pub fn search_images_semantic(
        &self,
        query_vector: &[f32],
        limit: usize,
        subject_id: Option<&str>,
        view_position: Option<&str>,
    ) -> Result<Vec<(ImageRecord, f32)>> {
        let hits = {
            let index = self.image_index.lock().expect("image index lock poisoned");
            index.search(query_vector, limit * 4)?
        };
        let reader = self.reader();
        let mut results = Vec::new();
        for (image_id, score) in hits {
            let Some(image) = reader
                .query_row(
                    "SELECT * FROM mimic_cxr_images WHERE image_id = ?1",
                    [&image_id],
                    row_to_image,
                )
                .optional()?
            else {
                continue;
            };
            if let Some(subject) = subject_id {
                if image.subject_id != subject {
                    continue;
                }
            }
            if let Some(view) = view_position {
                if !image.view_position.eq_ignore_ascii_case(view) {
                    continue;
                }
            }
            results.push((image, score));
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    pub fn list_images(
        &self,
        subject_id: Option<&str>,
        study_id: Option<&str>,
    ) -> Result<Vec<ImageRecord>> {
        let reader = self.reader();
        let rows = match (subject_id, study_id) {
            (Some(subject), Some(study)) => {
                let mut stmt = reader.prepare(
                    "SELECT * FROM mimic_cxr_images WHERE subject_id = ?1 AND study_id = ?2 \
                     ORDER BY image_id",
                )?;
                stmt.query_map([subject, study], row_to_image)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            (Some(subject), None) => {
                let mut stmt = reader
                    .prepare("SELECT * FROM mimic_cxr_images WHERE subject_id = ?1 ORDER BY image_id")?;
                stmt.query_map([subject], row_to_image)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            (None, Some(study)) => {
                let mut stmt = reader
                    .prepare("SELECT * FROM mimic_cxr_images WHERE study_id = ?1 ORDER BY image_id")?;
                stmt.query_map([study], row_to_image)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            (None, None) => {
                let mut stmt = reader.prepare("SELECT * FROM mimic_cxr_images ORDER BY image_id")?;
                stmt.query_map([], row_to_image)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    pub fn get_patient_mapping(&self, subject_id: &str) -> Result<Option<PatientMapping>> {
        Ok(self
            .reader()
            .query_row(
                "SELECT * FROM patient_image_mapping WHERE mimic_subject_id = ?1",
                [subject_id],
                row_to_mapping,
            )
            .optional()?)
    }

    pub fn mapping_for_fhir_patient(&self, fhir_patient_id: &str) -> Result<Option<PatientMapping>> {
        Ok(self
            .reader()
            .query_row(
                "SELECT * FROM patient_image_mapping WHERE fhir_patient_id = ?1",
                [fhir_patient_id],
                row_to_mapping,
            )
            .optional()?)
    }

    /// Every mapped patient that has at least one image row, optionally
    /// filtered by a case-insensitive substring of the display name. Backs
    /// the `search_patients_with_imaging` tool (§4.9).
    pub fn patients_with_imaging(&self, name_query: Option<&str>) -> Result<Vec<PatientMapping>> {
        let reader = self.reader();
        let mut stmt = reader.prepare(
            "SELECT DISTINCT m.* FROM patient_image_mapping m \
             INNER JOIN mimic_cxr_images i ON i.subject_id = m.mimic_subject_id \
             ORDER BY m.mimic_subject_id",
        )?;
        let mappings = stmt
            .query_map([], row_to_mapping)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(match name_query {
            Some(q) => {
                let q = q.to_lowercase();
                mappings
                    .into_iter()
                    .filter(|m| {
                        m.fhir_patient_name
                            .as_deref()
                            .map(|name| name.to_lowercase().contains(&q))
                            .unwrap_or(false)
                    })
                    .collect()
            }
            None => mappings,
        })
    }

    /// Every image row whose `fhir_resource_id` matches the given
    /// ImagingStudy id. Backs the `get_encounter_imaging` tool (§4.9), which
    /// looks up ImagingStudies by encounter in FHIR first and then resolves
    /// them back to local image rows through this column.
    pub fn images_by_fhir_resource_id(&self, resource_id: &str) -> Result<Vec<ImageRecord>> {
        let reader = self.reader();
        let mut stmt = reader.prepare(
            "SELECT * FROM mimic_cxr_images WHERE fhir_resource_id = ?1 ORDER BY image_id",
        )?;
        Ok(stmt
            .query_map([resource_id], row_to_image)?
            .collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Idempotent on `mimic_subject_id` (§4.8 phase 2).
    pub fn insert_patient_mapping(&self, mapping: &PatientMapping) -> Result<()> {
        self.writer().execute(
            "INSERT INTO patient_image_mapping \
             (mimic_subject_id, fhir_patient_id, fhir_patient_name, match_confidence, match_type) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(mimic_subject_id) DO UPDATE SET \
             fhir_patient_id = excluded.fhir_patient_id, \
             fhir_patient_name = excluded.fhir_patient_name, \
             match_confidence = excluded.match_confidence, \
             match_type = excluded.match_type",
            rusqlite::params![
                mapping.subject_id,
                mapping.fhir_patient_id,
                mapping.fhir_patient_name,
                mapping.match_confidence,
                mapping.match_type.as_str(),
            ],
        )?;
        Ok(())
    }
}
