//! Hybrid Fusion (§4.7).
//!
//! Merges FHIR document search and knowledge-graph search results by
//! reciprocal-rank fusion, generalized from the keyword/semantic RRF this
//! corpus already uses in its own hybrid search: here the two lists come
//! from different retrieval services rather than two scoring modes of the
//! same one, and each carries its own weight.

use std::collections::HashMap;

/// RRF dampening constant (§4.7).
pub const RRF_K: f32 = 60.0;
/// FHIR document search weight (§4.7).
pub const WEIGHT_FHIR: f32 = 1.0;
/// Knowledge-graph search weight (§4.7).
pub const WEIGHT_KG: f32 = 0.7;

/// One sub-result going into fusion: a document/entity id, its raw score
/// from that source, and which source produced it.
#[derive(Debug, Clone)]
pub struct SourceResult {
    pub id: String,
    pub raw_score: f32,
    pub source: Source,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Fhir,
    Kg,
}

impl Source {
    fn weight(self) -> f32 {
        match self {
            Source::Fhir => WEIGHT_FHIR,
            Source::Kg => WEIGHT_KG,
        }
    }
}

/// One fused result: the id, its fused RRF score, the provenance set of
/// sources it appeared in, and the highest raw cosine score it achieved in
/// any source (used only for tie-breaking).
#[derive(Debug, Clone, serde::Serialize)]
pub struct FusedResult {
    pub id: String,
    pub fused_score: f32,
    pub sources: Vec<Source>,
    pub best_raw_score: f32,
}

/// Fuse pre-ranked results from the FHIR and knowledge-graph retrieval
/// services (§4.7). Each input slice must already be ranked best-first by
/// its own source; rank within a source, not the raw score, drives the RRF
/// term. Ties broken by higher raw cosine, then ascending id.
pub fn reciprocal_rank_fusion(fhir: &[SourceResult], kg: &[SourceResult]) -> Vec<FusedResult> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut sources: HashMap<String, Vec<Source>> = HashMap::new();
    let mut best_raw: HashMap<String, f32> = HashMap::new();

    for results in [fhir, kg] {
        for (rank, result) in results.iter().enumerate() {
            let term = result.source.weight() / (RRF_K + rank as f32 + 1.0);
            *scores.entry(result.id.clone()).or_default() += term;
            sources.entry(result.id.clone()).or_default().push(result.source);
            best_raw
                .entry(result.id.clone())
                .and_modify(|current| *current = current.max(result.raw_score))
                .or_insert(result.raw_score);
        }
    }

    let mut fused: Vec<FusedResult> = scores
        .into_iter()
        .map(|(id, fused_score)| {
            let mut provenance = sources.remove(&id).unwrap_or_default();
            provenance.sort_by_key(|s| matches!(s, Source::Kg));
            provenance.dedup();
            FusedResult {
                best_raw_score: best_raw.get(&id).copied().unwrap_or(0.0),
                id,
                fused_score,
                sources: provenance,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.best_raw_score.partial_cmp(&a.best_raw_score).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.id.cmp(&b.id))
    });

    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, raw: f32, source: Source) -> SourceResult {
        SourceResult {
            id: id.to_string(),
            raw_score: raw,
            source,
        }
    }

    #[test]
    fn a_document_in_both_sources_outranks_either_alone() {
        let fhir = vec![result("shared", 0.9, Source::Fhir), result("fhir-only", 0.95, Source::Fhir)];
        let kg = vec![result("shared", 0.6, Source::Kg), result("kg-only", 0.8, Source::Kg)];

        let fused = reciprocal_rank_fusion(&fhir, &kg);
        let shared_rank = fused.iter().position(|r| r.id == "shared").unwrap();
        let fhir_only_rank = fused.iter().position(|r| r.id == "fhir-only").unwrap();
        let kg_only_rank = fused.iter().position(|r| r.id == "kg-only").unwrap();

        assert!(shared_rank < fhir_only_rank);
        assert!(shared_rank < kg_only_rank);
    }

    #[test]
    fn provenance_tracks_every_contributing_source() {
        let fhir = vec![result("doc-1", 0.9, Source::Fhir)];
        let kg = vec![result("doc-1", 0.7, Source::Kg)];

        let fused = reciprocal_rank_fusion(&fhir, &kg);
        assert_eq!(fused[0].sources.len(), 2);
        assert!(fused[0].sources.contains(&Source::Fhir));
        assert!(fused[0].sources.contains(&Source::Kg));
    }

    #[test]
    fn fusion_is_deterministic_across_repeated_calls() {
        let fhir = vec![result("a", 0.9, Source::Fhir), result("b", 0.9, Source::Fhir)];
        let kg = vec![result("b", 0.9, Source::Kg), result("a", 0.9, Source::Kg)];

        let first = reciprocal_rank_fusion(&fhir, &kg);
        let second = reciprocal_rank_fusion(&fhir, &kg);
        let first_ids: Vec<&str> = first.iter().map(|r| r.id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn ties_break_by_ascending_id() {
        // Contrive two ids whose fused scores land on the exact same
        // float: `z` at fhir rank 29 scores 1.0/90, `a` at kg rank 2
        // scores 0.7/63 == 1.0/90. Filler entries pad out the
        // intervening ranks so each lands at its required index.
        let mut fhir: Vec<SourceResult> = (0..29)
            .map(|i| result(&format!("filler-fhir-{i}"), 0.1, Source::Fhir))
            .collect();
        fhir.push(result("z", 0.5, Source::Fhir));

        let mut kg: Vec<SourceResult> = (0..2)
            .map(|i| result(&format!("filler-kg-{i}"), 0.1, Source::Kg))
            .collect();
        kg.push(result("a", 0.5, Source::Kg));

        let fused = reciprocal_rank_fusion(&fhir, &kg);
        let z_score = fused.iter().find(|r| r.id == "z").unwrap().fused_score;
        let a_score = fused.iter().find(|r| r.id == "a").unwrap().fused_score;
        assert!((z_score - a_score).abs() < 1e-6, "expected an exact tie to exercise the id tie-break");

        let z_rank = fused.iter().position(|r| r.id == "z").unwrap();
        let a_rank = fused.iter().position(|r| r.id == "a").unwrap();
        assert!(a_rank < z_rank, "on a tied score, ascending id must rank first");
    }
}
