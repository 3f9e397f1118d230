//! Radiology Image Vector Search (§4.6).
//!
//! Embeds a text query or raw image bytes against the 1024-dim image
//! index, left-outer-joining the hit against Patient Mapping for a display
//! name.

use crate::embeddings::Embeddings;
use crate::error::Result;
use crate::models::ImageRecord;
use crate::store::DataStore;

pub const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ImageHit {
    pub image: ImageRecord,
    pub score: f32,
    pub patient_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageSearchFilters<'a> {
    pub subject_id: Option<&'a str>,
    pub view_position: Option<&'a str>,
}

pub enum ImageQuery<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
}

fn to_hit(store: &DataStore, image: ImageRecord, cos: f32) -> Result<ImageHit> {
    let patient_name = store
        .get_patient_mapping(&image.subject_id)?
        .and_then(|mapping| mapping.fhir_patient_name);
    Ok(ImageHit { image, score: (1.0 + cos) / 2.0, patient_name })
}

/// `search_medical_images` (§4.6, §4.9).
pub async fn search(
    store: &DataStore,
    embeddings: &Embeddings,
    query: ImageQuery<'_>,
    top_k: usize,
    filters: ImageSearchFilters<'_>,
) -> Result<Vec<ImageHit>> {
    let query_vector = match query {
        ImageQuery::Text(text) => {
            if text.trim().is_empty() {
                return Err(crate::error::MedRagError::InputError(
                    "query must not be empty".to_string(),
                ));
            }
            embeddings.embed_image(text.as_bytes()).await
        }
        ImageQuery::Bytes(bytes) => embeddings.embed_image(bytes).await,
    };

    let hits = store.search_images_semantic(
        &query_vector.vector,
        top_k,
        filters.subject_id,
        filters.view_position,
    )?;

    hits.into_iter().map(|(image, cos)| to_hit(store, image, cos)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn image(id: &str, subject: &str, view: &str) -> ImageRecord {
        ImageRecord {
            image_id: id.to_string(),
            subject_id: subject.to_string(),
            study_id: "s1".to_string(),
            view_position: view.to_string(),
            image_path: format!("/data/{id}.dcm"),
            embedding_model: "medrag-image-embed".to_string(),
            fhir_resource_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn attaches_patient_name_from_mapping() {
        let store = DataStore::open_in_memory().unwrap();
        store.ensure_tables().unwrap();
        let embeddings = Embeddings::new("http://127.0.0.1:0");

        let vector = embeddings.embed_image(b"pneumonia PA view").await;
        store.upsert_image(&image("i1", "p1", "PA"), Some(&vector.vector)).unwrap();
        store
            .insert_patient_mapping(&crate::models::PatientMapping {
                subject_id: "p1".to_string(),
                fhir_patient_id: "patient-1".to_string(),
                fhir_patient_name: Some("Jane Doe".to_string()),
                match_confidence: 0.9,
                match_type: crate::models::MatchType::SyntheaGenerated,
            })
            .unwrap();

        let hits = search(
            &store,
            &embeddings,
            ImageQuery::Text("pneumonia PA view"),
            10,
            ImageSearchFilters::default(),
        )
        .await
        .unwrap();

        assert_eq!(hits[0].image.image_id, "i1");
        assert_eq!(hits[0].patient_name.as_deref(), Some("Jane Doe"));
    }

    #[tokio::test]
    async fn view_position_filter_excludes_other_views() {
        let store = DataStore::open_in_memory().unwrap();
        store.ensure_tables().unwrap();
        let embeddings = Embeddings::new("http://127.0.0.1:0");

        let pa = embeddings.embed_image(b"chest PA view").await;
        let ap = embeddings.embed_image(b"chest AP view").await;
        store.upsert_image(&image("i1", "p1", "PA"), Some(&pa.vector)).unwrap();
        store.upsert_image(&image("i2", "p1", "AP"), Some(&ap.vector)).unwrap();

        let hits = search(
            &store,
            &embeddings,
            ImageQuery::Text("chest"),
            10,
            ImageSearchFilters { subject_id: None, view_position: Some("AP") },
        )
        .await
        .unwrap();

        assert!(hits.iter().all(|h| h.image.view_position == "AP"));
    }
}
