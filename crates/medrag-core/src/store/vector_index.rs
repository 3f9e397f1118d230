//! HNSW Vector Index
//!
//! A thin wrapper over [`usearch`]'s HNSW index (§4.2: "M=16,
//! efConstruction=100") keyed by the same string row identifiers the
//! relational tables use, so the ANN side and the SQL side never drift
//! apart. One instance per embedding dimension — the document/entity/memory
//! index at 384 dimensions and the image index at 1024 — since Open
//! Question (c) forbids assuming a uniform dimension across tables.

use std::collections::HashMap;
use std::path::Path;

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::{MedRagError, Result};

/// HNSW connectivity parameter from §4.2 (`M=16`).
pub const HNSW_CONNECTIVITY: usize = 16;
/// HNSW expansion-add parameter from §4.2 (`efConstruction=100`).
pub const HNSW_EXPANSION_ADD: usize = 100;
const HNSW_EXPANSION_SEARCH: usize = 64;

/// An HNSW index over cosine distance, keyed by string id.
pub struct VectorIndex {
    index: Index,
    dimensions: usize,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    next_id: u64,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Result<Self> {
        let options = IndexOptions {
            dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: HNSW_CONNECTIVITY,
            expansion_add: HNSW_EXPANSION_ADD,
            expansion_search: HNSW_EXPANSION_SEARCH,
            multi: false,
        };
        let index = Index::new(&options)
            .map_err(|e| MedRagError::InternalError(format!("hnsw index creation failed: {e}")))?;
        index
            .reserve(16)
            .map_err(|e| MedRagError::InternalError(format!("hnsw reserve failed: {e}")))?;
        Ok(Self {
            index,
            dimensions,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            next_id: 0,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.key_to_id.contains_key(key)
    }

    /// Insert or replace the vector stored under `key`.
    pub fn upsert(&mut self, key: &str, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(MedRagError::DataError(format!(
                "vector dimension mismatch: expected {}, got {}",
                self.dimensions,
                vector.len()
            )));
        }

        if let Some(&existing_id) = self.key_to_id.get(key) {
            let _ = self.index.remove(existing_id);
            self.reserve_for_one_more()?;
            self.index
                .add(existing_id, vector)
                .map_err(|e| MedRagError::InternalError(format!("hnsw add failed: {e}")))?;
            return Ok(());
        }

        self.reserve_for_one_more()?;
        let id = self.next_id;
        self.next_id += 1;
        self.index
            .add(id, vector)
            .map_err(|e| MedRagError::InternalError(format!("hnsw add failed: {e}")))?;
        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        Ok(())
    }

    fn reserve_for_one_more(&self) -> Result<()> {
        if self.index.size() >= self.index.capacity() {
            let new_capacity = std::cmp::max(self.index.capacity() * 2, 16);
            self.index
                .reserve(new_capacity)
                .map_err(|e| MedRagError::InternalError(format!("hnsw reserve failed: {e}")))?;
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &str) {
        if let Some(id) = self.key_to_id.remove(key) {
            self.id_to_key.remove(&id);
            let _ = self.index.remove(id);
        }
    }

    /// Nearest neighbors to `query` by cosine similarity, highest first.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(String, f32)>> {
        if query.len() != self.dimensions {
            return Err(MedRagError::DataError(format!(
                "vector dimension mismatch: expected {}, got {}",
                self.dimensions,
                query.len()
            )));
        }
        if self.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let matches = self
            .index
            .search(query, limit)
            .map_err(|e| MedRagError::InternalError(format!("hnsw search failed: {e}")))?;

        Ok(matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter_map(|(id, distance)| {
                self.id_to_key
                    .get(id)
                    .map(|key| (key.clone(), 1.0 - distance))
            })
            .collect())
    }

    /// Persist the index and its key mapping next to `path` (§4.2: the ANN
    /// side "persisted alongside the relational file").
    pub fn save(&self, path: &Path) -> Result<()> {
        let path_str = path
            .to_str()
            .ok_or_else(|| MedRagError::InternalError("non-utf8 index path".into()))?;
        self.index
            .save(path_str)
            .map_err(|e| MedRagError::InternalError(format!("hnsw save failed: {e}")))?;

        let mapping = serde_json::json!({ "key_to_id": self.key_to_id, "next_id": self.next_id });
        std::fs::write(
            path.with_extension("mappings.json"),
            serde_json::to_vec(&mapping)?,
        )?;
        Ok(())
    }

    /// Load a previously saved index, or construct an empty one if no file
    /// exists yet at `path` (first boot).
    pub fn load_or_new(path: &Path, dimensions: usize) -> Result<Self> {
        if !path.exists() {
            return Self::new(dimensions);
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| MedRagError::InternalError("non-utf8 index path".into()))?;

        let options = IndexOptions {
            dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: HNSW_CONNECTIVITY,
            expansion_add: HNSW_EXPANSION_ADD,
            expansion_search: HNSW_EXPANSION_SEARCH,
            multi: false,
        };
        let index = Index::new(&options)
            .map_err(|e| MedRagError::InternalError(format!("hnsw index creation failed: {e}")))?;
        index
            .load(path_str)
            .map_err(|e| MedRagError::InternalError(format!("hnsw load failed: {e}")))?;

        let mappings_path = path.with_extension("mappings.json");
        let (key_to_id, next_id) = if mappings_path.exists() {
            let raw = std::fs::read_to_string(&mappings_path)?;
            let parsed: serde_json::Value = serde_json::from_str(&raw)?;
            let key_to_id: HashMap<String, u64> =
                serde_json::from_value(parsed["key_to_id"].clone()).unwrap_or_default();
            let next_id = parsed["next_id"].as_u64().unwrap_or(0);
            (key_to_id, next_id)
        } else {
            (HashMap::new(), 0)
        };
        let id_to_key = key_to_id.iter().map(|(k, &v)| (v, k.clone())).collect();

        Ok(Self {
            index,
            dimensions,
            key_to_id,
            id_to_key,
            next_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(seed: f32, dims: usize) -> Vec<f32> {
        (0..dims).map(|i| ((i as f32 + seed) / dims as f32).sin()).collect()
    }

    #[test]
    fn upsert_and_search_returns_closest_first() {
        let mut index = VectorIndex::new(32).unwrap();
        index.upsert("a", &vector(1.0, 32)).unwrap();
        index.upsert("b", &vector(50.0, 32)).unwrap();

        let results = index.search(&vector(1.0, 32), 2).unwrap();
        assert_eq!(results[0].0, "a");
    }

    #[test]
    fn wrong_dimension_is_a_data_error() {
        let mut index = VectorIndex::new(32).unwrap();
        let err = index.upsert("a", &[1.0, 2.0]).unwrap_err();
        assert_eq!(err.kind(), "data_error");
    }

    #[test]
    fn remove_drops_key_from_results() {
        let mut index = VectorIndex::new(16).unwrap();
        index.upsert("a", &vector(1.0, 16)).unwrap();
        index.remove("a");
        assert!(!index.contains("a"));
    }
}
