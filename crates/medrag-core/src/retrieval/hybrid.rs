//! `hybrid_search` (§4.7, §4.9): fans the FHIR document search and
//! knowledge-graph search out concurrently (§5: "issues the FHIR and KG
//! sub-queries concurrently and joins before fusion"), then fuses by
//! reciprocal rank.

use crate::embeddings::Embeddings;
use crate::error::Result;
use crate::fusion::{reciprocal_rank_fusion, FusedResult, Source, SourceResult};
use crate::store::DataStore;

use super::fhir_search::{self, DocumentSearchFilters};
use super::kg_search;

pub const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Clone, serde::Serialize)]
pub struct HybridResult {
    pub fused: Vec<FusedResult>,
}

/// `hybrid_search(query, top_k)` (§4.7).
pub async fn hybrid_search(
    store: &DataStore,
    embeddings: &Embeddings,
    query: &str,
    top_k: usize,
) -> Result<HybridResult> {
    let (documents, entities) = tokio::join!(
        fhir_search::search(store, embeddings, query, top_k, DocumentSearchFilters::default()),
        kg_search::search(store, embeddings, query, top_k),
    );

    let fhir_results: Vec<SourceResult> = documents?
        .hits
        .into_iter()
        .map(|hit| SourceResult { id: hit.document_id, raw_score: hit.score, source: Source::Fhir })
        .collect();

    let kg_results: Vec<SourceResult> = entities?
        .into_iter()
        .map(|hit| SourceResult {
            // Join identity with FHIR documents via the entity's originating
            // resource id when it has one, so a result found by both sources
            // actually collides in `reciprocal_rank_fusion` (§4.7, §8
            // scenario 4). An entity with no resource link falls back to its
            // own id, which can never coincide with a document id.
            id: hit.entity.resource_id.clone().unwrap_or_else(|| hit.entity.id.to_string()),
            raw_score: hit.score,
            source: Source::Kg,
        })
        .collect();

    let fused = reciprocal_rank_fusion(&fhir_results, &kg_results);
    let fused = fused.into_iter().take(top_k.max(1)).collect();

    Ok(HybridResult { fused })
}
