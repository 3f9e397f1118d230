//! Knowledge-Graph Search (§4.5).
//!
//! `search` embeds the query and looks it up against entity-text
//! embeddings, falling back to substring match and lazily populating the
//! embedding column on the hit it returns (§9.1 decision (b)).
//! `traverse`, `relationships_of`, and `entity_statistics` pass straight
//! through to the data store.

use crate::embeddings::{Embeddings, MockMode};
use crate::error::Result;
use crate::models::{Entity, Relationship};
use crate::store::{DataStore, EntityStatistics, Subgraph};

pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Clone, serde::Serialize)]
pub struct EntityHit {
    pub entity: Entity,
    pub score: f32,
}

/// `search_knowledge_graph` (§4.5, §4.9). Semantic when embeddings exist,
/// substring fallback otherwise; a substring hit gets its embedding
/// populated so later queries become semantic over time.
pub async fn search(
    store: &DataStore,
    embeddings: &Embeddings,
    query: &str,
    limit: usize,
) -> Result<Vec<EntityHit>> {
    if query.trim().is_empty() {
        return Err(crate::error::MedRagError::InputError(
            "query must not be empty".to_string(),
        ));
    }

    let query_vector = embeddings.embed_query(query).await;
    let semantic_hits = store.search_entities_semantic(&query_vector.vector, limit)?;
    if !semantic_hits.is_empty() {
        return Ok(semantic_hits
            .into_iter()
            .map(|(entity, cos)| EntityHit { entity, score: (1.0 + cos) / 2.0 })
            .collect());
    }

    let substring_hits = store.search_entities_substring(query, limit)?;
    if embeddings.text_client().mode() != MockMode::Mock {
        for entity in &substring_hits {
            let vector = embeddings.embed_text(&entity.text).await;
            store.set_entity_embedding(entity.id, &vector.vector)?;
        }
    }

    Ok(substring_hits.into_iter().map(|entity| EntityHit { entity, score: 1.0 }).collect())
}

/// `get_entity_relationships` / graph-expansion half of traversal (§4.5,
/// §4.9).
pub fn traverse(store: &DataStore, entity_id: i64, depth: u32) -> Result<Subgraph> {
    store.traverse(entity_id, depth)
}

pub fn relationships_of(store: &DataStore, entity_id: i64) -> Result<Vec<Relationship>> {
    store.relationships_of(entity_id)
}

pub fn entity_statistics(store: &DataStore) -> Result<EntityStatistics> {
    store.entity_statistics()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn diabetes_ranks_first_over_the_seed_graph() {
        let store = DataStore::open_in_memory().unwrap();
        store.ensure_tables().unwrap();
        let embeddings = Embeddings::new("http://127.0.0.1:0");

        let hits = search(&store, &embeddings, "diabetes", 5).await.unwrap();
        assert_eq!(hits[0].entity.text, "diabetes mellitus type 2");
    }

    #[tokio::test]
    async fn relationships_cover_the_expected_diabetes_edges() {
        let store = DataStore::open_in_memory().unwrap();
        store.ensure_tables().unwrap();
        let embeddings = Embeddings::new("http://127.0.0.1:0");

        let hits = search(&store, &embeddings, "diabetes mellitus type 2", 1).await.unwrap();
        let diabetes = &hits[0].entity;
        let edges = relationships_of(&store, diabetes.id).unwrap();

        let subgraph = traverse(&store, diabetes.id, 1).unwrap();
        let by_id = |id: i64| subgraph.nodes.iter().find(|e| e.id == id).map(|e| e.text.as_str());

        let labeled: Vec<(String, &str)> = edges
            .iter()
            .map(|edge| {
                let other = if edge.source_entity_id == diabetes.id {
                    edge.target_entity_id
                } else {
                    edge.source_entity_id
                };
                (edge.relationship_type.clone(), by_id(other).unwrap_or(""))
            })
            .collect();

        assert!(labeled.iter().any(|(t, n)| t == "treated_by" && *n == "metformin"));
        assert!(labeled.iter().any(|(t, n)| t == "presents_with" && *n == "polyuria"));
        assert!(labeled.iter().any(|(t, n)| t == "affects" && *n == "pancreas"));
        assert!(labeled.iter().any(|(t, n)| t == "diagnosed_by" && *n == "HbA1c test"));
        assert!(labeled.iter().any(|(t, n)| t == "comorbid_with" && *n == "hypertension"));
    }

    #[test]
    fn entity_statistics_reports_the_seeded_counts() {
        let store = DataStore::open_in_memory().unwrap();
        store.ensure_tables().unwrap();
        let stats = entity_statistics(&store).unwrap();
        assert!(stats.total_entities > 0);
        assert!(stats.total_relationships > 0);
    }
}
