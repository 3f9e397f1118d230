//! FHIR Document Search (§4.4).
//!
//! Embeds the query and runs cosine search over [`crate::store::DataStore`],
//! falling back to a case-insensitive substring match when no document has a
//! populated embedding yet.

use crate::embeddings::Embeddings;
use crate::error::Result;
use crate::models::{Document, SearchMode};
use crate::store::DataStore;

pub const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Clone, serde::Serialize)]
pub struct DocumentHit {
    pub document_id: String,
    pub score: f32,
    pub snippet: String,
    pub resource_kind: String,
    pub patient_id: Option<String>,
    pub encounter_id: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DocumentSearchResult {
    pub hits: Vec<DocumentHit>,
    pub search_mode: SearchMode,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentSearchFilters<'a> {
    pub patient_id: Option<&'a str>,
}

fn snippet(text: &str) -> String {
    const MAX_LEN: usize = 240;
    if text.chars().count() <= MAX_LEN {
        text.to_string()
    } else {
        text.chars().take(MAX_LEN).collect::<String>() + "…"
    }
}

fn to_hit(document: Document, score: f32) -> DocumentHit {
    DocumentHit {
        document_id: document.document_id,
        score,
        snippet: snippet(&document.text),
        resource_kind: document.resource_kind,
        patient_id: document.patient_id,
        encounter_id: document.encounter_id,
    }
}

/// `search_fhir_documents` (§4.4, tool registry name in §4.9). Embeds
/// `query`, runs a cosine search, and maps scores to `[0,1]` by `(1 +
/// cos)/2`. Falls back to lexical search when no document embedding exists
/// yet.
pub async fn search(
    store: &DataStore,
    embeddings: &Embeddings,
    query: &str,
    top_k: usize,
    filters: DocumentSearchFilters<'_>,
) -> Result<DocumentSearchResult> {
    if query.trim().is_empty() {
        return Err(crate::error::MedRagError::InputError(
            "query must not be empty".to_string(),
        ));
    }

    if !store.has_document_vectors()? {
        let hits = store
            .search_documents_lexical(query, top_k, filters.patient_id)?
            .into_iter()
            .map(|doc| to_hit(doc, 1.0))
            .collect();
        return Ok(DocumentSearchResult {
            hits,
            search_mode: SearchMode::Lexical,
            fallback_reason: Some("no document embeddings populated yet".to_string()),
        });
    }

    let query_vector = embeddings.embed_query(query).await;
    let semantic_hits = store.search_documents_semantic(&query_vector.vector, top_k, filters.patient_id)?;

    if semantic_hits.is_empty() {
        let hits = store
            .search_documents_lexical(query, top_k, filters.patient_id)?
            .into_iter()
            .map(|doc| to_hit(doc, 1.0))
            .collect();
        return Ok(DocumentSearchResult {
            hits,
            search_mode: SearchMode::Lexical,
            fallback_reason: Some("semantic search returned no results".to_string()),
        });
    }

    let hits = semantic_hits
        .into_iter()
        .map(|(doc, cos)| to_hit(doc, (1.0 + cos) / 2.0))
        .collect();

    Ok(DocumentSearchResult {
        hits,
        search_mode: SearchMode::Semantic,
        fallback_reason: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use chrono::Utc;

    fn doc(id: &str, text: &str) -> Document {
        Document {
            document_id: id.to_string(),
            resource_kind: "DocumentReference".to_string(),
            text: text.to_string(),
            patient_id: Some("p1".to_string()),
            encounter_id: None,
            document_date: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn falls_back_to_lexical_when_no_vectors_populated() {
        let store = DataStore::open_in_memory().unwrap();
        store.ensure_tables().unwrap();
        store.insert_document(&doc("d1", "patient presents with chest pain"), None).unwrap();
        let embeddings = Embeddings::new("http://127.0.0.1:0");

        let result = search(&store, &embeddings, "chest pain", 10, DocumentSearchFilters::default())
            .await
            .unwrap();
        assert_eq!(result.search_mode, SearchMode::Lexical);
        assert!(result.fallback_reason.is_some());
        assert_eq!(result.hits.len(), 1);
    }

    #[tokio::test]
    async fn empty_query_is_an_input_error() {
        let store = DataStore::open_in_memory().unwrap();
        store.ensure_tables().unwrap();
        let embeddings = Embeddings::new("http://127.0.0.1:0");
        let err = search(&store, &embeddings, "  ", 10, DocumentSearchFilters::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "input_error");
    }

    #[tokio::test]
    async fn semantic_scores_land_in_zero_to_one_and_are_non_increasing() {
        let store = DataStore::open_in_memory().unwrap();
        store.ensure_tables().unwrap();
        let embeddings = Embeddings::new("http://127.0.0.1:0");

        for (id, text) in [("d1", "chest pain"), ("d2", "shortness of breath"), ("d3", "headache")] {
            let vector = embeddings.embed_text(text).await;
            store.insert_document(&doc(id, text), Some(&vector.vector)).unwrap();
        }

        let result = search(&store, &embeddings, "chest pain", 10, DocumentSearchFilters::default())
            .await
            .unwrap();
        assert_eq!(result.search_mode, SearchMode::Semantic);
        for hit in &result.hits {
            assert!(hit.score >= 0.0 && hit.score <= 1.0);
        }
        let scores: Vec<f32> = result.hits.iter().map(|h| h.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }
}
