//! End-to-end coverage of the retrieval engine against the seeded
//! knowledge graph and hand-inserted FHIR documents: knowledge-graph
//! ranking and traversal, and hybrid fusion across both sources.

use chrono::Utc;
use medrag_core::embeddings::Embeddings;
use medrag_core::models::Document;
use medrag_core::retrieval::{hybrid, kg_search};
use medrag_core::store::DataStore;

fn store() -> DataStore {
    let store = DataStore::open_in_memory().unwrap();
    store.ensure_tables().unwrap();
    store
}

#[tokio::test]
async fn diabetes_query_ranks_the_type_2_condition_first() {
    let store = store();
    let embeddings = Embeddings::new("http://127.0.0.1:0");

    let hits = kg_search::search(&store, &embeddings, "diabetes", 5).await.unwrap();

    assert!(!hits.is_empty());
    assert_eq!(hits[0].entity.text, "diabetes mellitus type 2");
    assert_eq!(hits[0].entity.entity_type.as_str(), "CONDITION");

    let mut previous = hits[0].score;
    for hit in &hits[1..] {
        assert!(hit.score >= 0.0 && hit.score <= 1.0);
        assert!(hit.score <= previous);
        previous = hit.score;
    }
}

#[tokio::test]
async fn diabetes_relationships_cover_the_expected_clinical_edges() {
    let store = store();
    let embeddings = Embeddings::new("http://127.0.0.1:0");

    let hits = kg_search::search(&store, &embeddings, "diabetes mellitus type 2", 1).await.unwrap();
    let diabetes = &hits[0].entity;
    let edges = kg_search::relationships_of(&store, diabetes.id).unwrap();
    let subgraph = kg_search::traverse(&store, diabetes.id, 2).unwrap();
    let label_of = |id: i64| subgraph.nodes.iter().find(|e| e.id == id).map(|e| e.text.as_str());

    let labeled: Vec<(String, &str)> = edges
        .iter()
        .map(|edge| {
            let other = if edge.source_entity_id == diabetes.id {
                edge.target_entity_id
            } else {
                edge.source_entity_id
            };
            (edge.relationship_type.clone(), label_of(other).unwrap_or(""))
        })
        .collect();

    for (relation, target) in [
        ("treated_by", "metformin"),
        ("presents_with", "polyuria"),
        ("affects", "pancreas"),
        ("diagnosed_by", "HbA1c test"),
        ("comorbid_with", "hypertension"),
    ] {
        assert!(
            labeled.iter().any(|(t, n)| t == relation && *n == target),
            "missing edge {relation}->{target} in {labeled:?}"
        );
    }
}

#[tokio::test]
async fn chest_pain_hybrid_search_fuses_fhir_and_kg_sources_deterministically() {
    let store = store();
    let embeddings = Embeddings::new("http://127.0.0.1:0");

    store
        .insert_document(
            &Document {
                document_id: "doc-chest-pain".to_string(),
                resource_kind: "DocumentReference".to_string(),
                text: "patient presents with chest pain, diabetes mellitus type 2 noted in history"
                    .to_string(),
                patient_id: Some("patient-1".to_string()),
                encounter_id: None,
                document_date: Some(Utc::now()),
            },
            None,
        )
        .unwrap();

    let first = hybrid::hybrid_search(&store, &embeddings, "chest pain", 3).await.unwrap();
    let second = hybrid::hybrid_search(&store, &embeddings, "chest pain", 3).await.unwrap();

    assert!(!first.fused.is_empty());
    let ids_first: Vec<&str> = first.fused.iter().map(|r| r.id.as_str()).collect();
    let ids_second: Vec<&str> = second.fused.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids_first, ids_second, "hybrid fusion must order identically across repeated calls");

    assert!(
        first.fused.iter().any(|r| r.sources.len() == 2),
        "expected at least one result found by both fhir and kg sources, got {:?}",
        first.fused
    );

    let mut previous_score = f32::MAX;
    for result in &first.fused {
        assert!(result.fused_score <= previous_score, "fused results must be sorted by descending score");
        previous_score = result.fused_score;
    }
}

#[test]
fn entity_statistics_report_the_seeded_graph() {
    let store = store();
    let stats = kg_search::entity_statistics(&store).unwrap();
    assert!(stats.total_entities > 0);
    assert!(stats.total_relationships > 0);
}
