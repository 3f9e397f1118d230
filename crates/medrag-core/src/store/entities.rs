//! Knowledge Graph: entities and relationships (§4.2, §4.5).
//!
//! Two flat tables rather than a graph-native engine — the corpus has no
//! graph database dependency, and a BFS over an adjacency list built from
//! two indexed SQL tables is plenty for the depth-2, 200-node traversals
//! this system needs.

use std::collections::{HashSet, VecDeque};

use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::error::Result;
use crate::models::{Entity, EntityType, Relationship};

use super::{seed, vector_to_blob, DataStore};

/// Traversal cap (§4.5): BFS stops discovering new nodes past this count
/// even if the frontier is not yet exhausted.
const MAX_TRAVERSAL_NODES: usize = 200;
/// Maximum traversal depth (§4.5).
const MAX_TRAVERSAL_DEPTH: u32 = 2;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EntityStatistics {
    pub total_entities: i64,
    pub total_relationships: i64,
    pub entities_by_type: Vec<(String, i64)>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Subgraph {
    pub root: Entity,
    pub nodes: Vec<Entity>,
    pub edges: Vec<Relationship>,
}

fn row_to_entity(row: &rusqlite::Row) -> rusqlite::Result<Entity> {
    let entity_type: String = row.get("entity_type")?;
    Ok(Entity {
        id: row.get("entity_id")?,
        text: row.get("entity_text")?,
        entity_type: entity_type.parse().unwrap_or(EntityType::Condition),
        confidence: row.get("confidence")?,
        resource_id: row.get("resource_id")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_relationship(row: &rusqlite::Row) -> rusqlite::Result<Relationship> {
    Ok(Relationship {
        id: row.get("relationship_id")?,
        source_entity_id: row.get("source_entity_id")?,
        target_entity_id: row.get("target_entity_id")?,
        relationship_type: row.get("relationship_type")?,
        confidence: row.get("confidence")?,
        resource_id: row.get("resource_id")?,
        created_at: row.get("created_at")?,
    })
}

impl DataStore {
    /// `seed_graph()` (§9.2): populate the fixed clinical ontology fragment
    /// from [`seed::CONDITIONS`] / [`seed::COMORBIDITIES`]. Called only by
    /// `ensure_tables()` when `rag_entities` is empty, so re-seeding never
    /// duplicates rows an operator has since edited.
    pub(super) fn seed_graph(&self) -> Result<()> {
        let mut writer = self.writer();
        let tx = writer.transaction()?;

        for cluster in seed::CONDITIONS {
            let condition_id =
                insert_entity_tx(&tx, cluster.condition, EntityType::Condition, 0.9, None)?;
            for medication in cluster.medications {
                let medication_id =
                    insert_entity_tx(&tx, medication, EntityType::Medication, 0.85, None)?;
                insert_relationship_tx(&tx, condition_id, medication_id, "treated_by", 0.85, None)?;
            }
            for symptom in cluster.symptoms {
                let resource_id = seed::ENTITY_RESOURCE_LINKS
                    .iter()
                    .find(|(text, _)| text == symptom)
                    .map(|(_, resource_id)| *resource_id);
                let symptom_id =
                    insert_entity_tx(&tx, symptom, EntityType::Symptom, 0.8, resource_id)?;
                insert_relationship_tx(&tx, condition_id, symptom_id, "presents_with", 0.8, None)?;
            }
            for anatomy in cluster.anatomy {
                let anatomy_id = insert_entity_tx(&tx, anatomy, EntityType::Anatomy, 0.85, None)?;
                insert_relationship_tx(&tx, condition_id, anatomy_id, "affects", 0.85, None)?;
            }
            for procedure in cluster.procedures {
                let procedure_id =
                    insert_entity_tx(&tx, procedure, EntityType::Procedure, 0.8, None)?;
                insert_relationship_tx(&tx, condition_id, procedure_id, "diagnosed_by", 0.8, None)?;
            }
        }

        for (source, target, relationship_type) in seed::COMORBIDITIES {
            let source_id = insert_entity_tx(&tx, source, EntityType::Condition, 0.9, None)?;
            let target_id = insert_entity_tx(&tx, target, EntityType::Condition, 0.9, None)?;
            insert_relationship_tx(&tx, source_id, target_id, relationship_type, 0.75, None)?;
        }

        tx.commit()?;
        tracing::info!("seeded knowledge graph from clinical ontology fragment");
        Ok(())
    }

    /// Idempotent on `(entity_text, entity_type)` (§4.5): a second insert of
    /// the same pair returns the existing row's id rather than duplicating.
    pub fn insert_entity(
        &self,
        entity_text: &str,
        entity_type: EntityType,
        confidence: f64,
        resource_id: Option<&str>,
    ) -> Result<i64> {
        let writer = self.writer();
        Ok(insert_entity_tx(&writer, entity_text, entity_type, confidence, resource_id)?)
    }

    /// Idempotent on `(source, target, type)` (§4.5).
    pub fn insert_relationship(
        &self,
        source_entity_id: i64,
        target_entity_id: i64,
        relationship_type: &str,
        confidence: f64,
        resource_id: Option<&str>,
    ) -> Result<i64> {
        let writer = self.writer();
        Ok(insert_relationship_tx(
            &writer,
            source_entity_id,
            target_entity_id,
            relationship_type,
            confidence,
            resource_id,
        )?)
    }

    /// Lazily populate an entity's text embedding (decision (b), §9.1):
    /// called the first time a substring-fallback search resolves an
    /// entity whose `embedding` column is still null.
    pub fn set_entity_embedding(&self, entity_id: i64, embedding: &[f32]) -> Result<()> {
        self.writer().execute(
            "UPDATE rag_entities SET embedding = ?1 WHERE entity_id = ?2",
            rusqlite::params![vector_to_blob(embedding), entity_id],
        )?;
        self.text_index
            .lock()
            .expect("text index lock poisoned")
            .upsert(&format!("entity:{entity_id}"), embedding)?;
        Ok(())
    }

    pub fn get_entity(&self, entity_id: i64) -> Result<Option<Entity>> {
        Ok(self
            .reader()
            .query_row(
                "SELECT * FROM rag_entities WHERE entity_id = ?1",
                [entity_id],
                row_to_entity,
            )
            .optional()?)
    }

    /// Case-insensitive substring search over `entity_text`, the fallback
    /// path when no embedding is available yet for semantic search (§4.5).
    pub fn search_entities_substring(&self, query: &str, limit: usize) -> Result<Vec<Entity>> {
        let reader = self.reader();
        let mut stmt = reader.prepare(
            "SELECT * FROM rag_entities WHERE entity_text LIKE ?1 ESCAPE '\\' \
             ORDER BY confidence DESC LIMIT ?2",
        )?;
        let pattern = format!("%{}%", query.replace('\\', "\\\\").replace('%', "\\%"));
        let rows = stmt
            .query_map(rusqlite::params![pattern, limit as i64], row_to_entity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every entity of one type, most-confident first. Backs the
    /// `plot_symptom_frequency` and `plot_entity_distribution` tools
    /// (§4.9), which chart subsets of the graph by entity type.
    pub fn entities_by_type(&self, entity_type: EntityType, limit: usize) -> Result<Vec<Entity>> {
        let reader = self.reader();
        let mut stmt = reader.prepare(
            "SELECT * FROM rag_entities WHERE entity_type = ?1 ORDER BY confidence DESC LIMIT ?2",
        )?;
        Ok(stmt
            .query_map(rusqlite::params![entity_type.as_str(), limit as i64], row_to_entity)?
            .collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Semantic search restricted to entities with a populated embedding.
    pub fn search_entities_semantic(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<(Entity, f32)>> {
        let hits = {
            let index = self.text_index.lock().expect("text index lock poisoned");
            index.search(query_vector, limit * 4)?
        };
        let reader = self.reader();
        let mut results = Vec::new();
        for (key, score) in hits {
            let Some(entity_id) = key.strip_prefix("entity:").and_then(|s| s.parse::<i64>().ok())
            else {
                continue;
            };
            if let Some(entity) = reader
                .query_row(
                    "SELECT * FROM rag_entities WHERE entity_id = ?1",
                    [entity_id],
                    row_to_entity,
                )
                .optional()?
            {
                results.push((entity, score));
            }
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    /// Outgoing and incoming relationships of one entity (§4.5).
    pub fn relationships_of(&self, entity_id: i64) -> Result<Vec<Relationship>> {
        let reader = self.reader();
        let mut stmt = reader.prepare(
            "SELECT * FROM rag_entity_relationships \
             WHERE source_entity_id = ?1 OR target_entity_id = ?1 \
             ORDER BY confidence DESC, relationship_id ASC",
        )?;
        Ok(stmt
            .query_map([entity_id], row_to_relationship)?
            .collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// BFS out to `depth` hops (capped at [`MAX_TRAVERSAL_DEPTH`]),
    /// cycle-safe via a visited set, capped at [`MAX_TRAVERSAL_NODES`]
    /// discovered nodes (§4.5).
    pub fn traverse(&self, entity_id: i64, depth: u32) -> Result<Subgraph> {
        let depth = depth.min(MAX_TRAVERSAL_DEPTH);
        let Some(root) = self.get_entity(entity_id)? else {
            return Err(crate::error::MedRagError::InputError(format!(
                "no such entity: {entity_id}"
            )));
        };

        let mut visited: HashSet<i64> = HashSet::from([entity_id]);
        let mut nodes = vec![root.clone()];
        let mut edges = Vec::new();
        let mut frontier: VecDeque<(i64, u32)> = VecDeque::from([(entity_id, 0)]);

        while let Some((current, current_depth)) = frontier.pop_front() {
            if current_depth >= depth || nodes.len() >= MAX_TRAVERSAL_NODES {
                continue;
            }
            for relationship in self.relationships_of(current)? {
                let neighbor = if relationship.source_entity_id == current {
                    relationship.target_entity_id
                } else {
                    relationship.source_entity_id
                };
                edges.push(relationship);
                if visited.contains(&neighbor) {
                    continue;
                }
                if nodes.len() >= MAX_TRAVERSAL_NODES {
                    break;
                }
                visited.insert(neighbor);
                if let Some(entity) = self.get_entity(neighbor)? {
                    nodes.push(entity);
                }
                frontier.push_back((neighbor, current_depth + 1));
            }
        }

        Ok(Subgraph { root, nodes, edges })
    }

    pub fn entity_statistics(&self) -> Result<EntityStatistics> {
        let reader = self.reader();
        let total_entities: i64 =
            reader.query_row("SELECT COUNT(*) FROM rag_entities", [], |r| r.get(0))?;
        let total_relationships: i64 = reader.query_row(
            "SELECT COUNT(*) FROM rag_entity_relationships",
            [],
            |r| r.get(0),
        )?;
        let mut stmt =
            reader.prepare("SELECT entity_type, COUNT(*) FROM rag_entities GROUP BY entity_type")?;
        let entities_by_type = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(EntityStatistics {
            total_entities,
            total_relationships,
            entities_by_type,
        })
    }

    /// Row embeddings still unset, for the lazy-population pass (§9.1
    /// decision (b)).
    pub fn entities_missing_embedding(&self, limit: usize) -> Result<Vec<Entity>> {
        let reader = self.reader();
        let mut stmt = reader.prepare(
            "SELECT * FROM rag_entities WHERE embedding IS NULL ORDER BY entity_id LIMIT ?1",
        )?;
        Ok(stmt
            .query_map([limit as i64], row_to_entity)?
            .collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn insert_entity_tx(
    conn: &rusqlite::Connection,
    entity_text: &str,
    entity_type: EntityType,
    confidence: f64,
    resource_id: Option<&str>,
) -> rusqlite::Result<i64> {
    if let Some(id) = conn
        .query_row(
            "SELECT entity_id FROM rag_entities WHERE entity_text = ?1 AND entity_type = ?2",
            rusqlite::params![entity_text, entity_type.as_str()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
    {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO rag_entities(entity_text, entity_type, confidence, resource_id, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            entity_text,
            entity_type.as_str(),
            confidence,
            resource_id,
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_relationship_tx(
    conn: &rusqlite::Connection,
    source_entity_id: i64,
    target_entity_id: i64,
    relationship_type: &str,
    confidence: f64,
    resource_id: Option<&str>,
) -> rusqlite::Result<i64> {
    if let Some(id) = conn
        .query_row(
            "SELECT relationship_id FROM rag_entity_relationships \
             WHERE source_entity_id = ?1 AND target_entity_id = ?2 AND relationship_type = ?3",
            rusqlite::params![source_entity_id, target_entity_id, relationship_type],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
    {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO rag_entity_relationships \
         (source_entity_id, target_entity_id, relationship_type, confidence, resource_id, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            source_entity_id,
            target_entity_id,
            relationship_type,
            confidence,
            resource_id,
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}
