//! Data Store Adapter
//!
//! A thin abstraction over an embedded relational engine (SQLite via
//! `rusqlite`) that also fronts a dedicated HNSW ANN index per embedding
//! dimension (§4.2). The relational side owns entities, relationships,
//! documents, images and patient mappings; the two
//! [`vector_index::VectorIndex`] instances are opened and persisted
//! alongside the same `data_dir` so they never drift out of sync across
//! restarts.
//!
//! Separate reader/writer connections mirror the pattern the corpus uses
//! for a `Send + Sync` store behind `&self` methods, so callers can share
//! one `Arc<DataStore>` instead of wrapping the whole adapter in a mutex.

mod documents;
mod entities;
mod images;
mod migrations;
mod seed;
mod vector_index;

pub use entities::{EntityStatistics, Subgraph};
pub use vector_index::VectorIndex;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::{MedRagError, Result};
use crate::models::{IMAGE_EMBEDDING_DIM, TEXT_EMBEDDING_DIM};

/// The data store adapter (§4.2). Construct once per process with
/// [`DataStore::open`] and share behind an `Arc`.
pub struct DataStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    pub(crate) text_index: Mutex<VectorIndex>,
    pub(crate) image_index: Mutex<VectorIndex>,
    data_dir: PathBuf,
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
}

/// Serialize an embedding to a little-endian `f32` blob for storage
/// alongside the row it belongs to. The HNSW index, not this blob, is the
/// fast-path for similarity search; the blob exists so the index can be
/// rebuilt from the relational table after a crash or a fresh checkout.
pub(crate) fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub(crate) fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

impl DataStore {
    /// Open (creating if absent) the database file and HNSW indexes under
    /// `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("medrag.db");
        let writer = Connection::open(&db_path)?;
        configure_connection(&writer)?;
        let reader = Connection::open(&db_path)?;
        configure_connection(&reader)?;

        let text_index = VectorIndex::load_or_new(&data_dir.join("text.index"), TEXT_EMBEDDING_DIM)?;
        let image_index = VectorIndex::load_or_new(&data_dir.join("image.index"), IMAGE_EMBEDDING_DIM)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            text_index: Mutex::new(text_index),
            image_index: Mutex::new(image_index),
            data_dir: data_dir.to_path_buf(),
        })
    }

    /// An in-memory store for tests: no file persistence, fresh schema
    /// every time.
    pub fn open_in_memory() -> Result<Self> {
        let writer = Connection::open_in_memory()?;
        configure_connection(&writer)?;
        let reader = Connection::open_in_memory()?;
        configure_connection(&reader)?;
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            text_index: Mutex::new(VectorIndex::new(TEXT_EMBEDDING_DIM)?),
            image_index: Mutex::new(VectorIndex::new(IMAGE_EMBEDDING_DIM)?),
            data_dir: PathBuf::new(),
        })
    }

    fn writer(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.writer.lock().expect("writer connection lock poisoned")
    }

    fn reader(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.reader.lock().expect("reader connection lock poisoned")
    }

    /// Create schemas, tables, scalar indexes, and seed the knowledge graph
    /// if empty (§4.2, §9.2). Idempotent: existing objects are left in
    /// place.
    pub fn ensure_tables(&self) -> Result<()> {
        {
            let writer = self.writer();
            migrations::apply_migrations(&writer)?;
        }
        self.load_vectors_into_indexes()?;
        if self.entity_statistics()?.total_entities == 0 {
            self.seed_graph()?;
        }
        Ok(())
    }

    fn load_vectors_into_indexes(&self) -> Result<()> {
        {
            let reader = self.reader();
            let mut stmt = reader
                .prepare("SELECT entity_id, embedding FROM rag_entities WHERE embedding IS NOT NULL")?;
            let rows: Vec<(i64, Vec<u8>)> = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .filter_map(|r| r.ok())
                .collect();
            drop(stmt);
            let mut index = self.text_index.lock().expect("text index lock poisoned");
            for (id, blob) in rows {
                let _ = index.upsert(&format!("entity:{id}"), &blob_to_vector(&blob));
            }
        }
        {
            let reader = self.reader();
            let mut stmt = reader.prepare(
                "SELECT document_id, notes_vector FROM docref_vectors WHERE notes_vector IS NOT NULL",
            )?;
            let rows: Vec<(String, Vec<u8>)> = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .filter_map(|r| r.ok())
                .collect();
            drop(stmt);
            let mut index = self.text_index.lock().expect("text index lock poisoned");
            for (id, blob) in rows {
                let _ = index.upsert(&format!("document:{id}"), &blob_to_vector(&blob));
            }
        }
        {
            let reader = self.reader();
            let mut stmt =
                reader.prepare("SELECT image_id, vector FROM mimic_cxr_images WHERE vector IS NOT NULL")?;
            let rows: Vec<(String, Vec<u8>)> = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .filter_map(|r| r.ok())
                .collect();
            drop(stmt);
            let mut index = self.image_index.lock().expect("image index lock poisoned");
            for (id, blob) in rows {
                let _ = index.upsert(&id, &blob_to_vector(&blob));
            }
        }
        Ok(())
    }

    /// Persist the HNSW indexes to disk. A no-op for [`DataStore::open_in_memory`].
    pub fn persist_indexes(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Ok(());
        }
        self.text_index
            .lock()
            .expect("text index lock poisoned")
            .save(&self.data_dir.join("text.index"))?;
        self.image_index
            .lock()
            .expect("image index lock poisoned")
            .save(&self.data_dir.join("image.index"))?;
        Ok(())
    }

    /// A raw parameterized write, for callers (e.g. the checkpoint or
    /// ingestion code) that need one-off SQL rather than a typed accessor
    /// (§4.2: `execute(sql, params)`).
    pub fn execute(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<usize> {
        Ok(self.writer().execute(sql, params)?)
    }

    pub(crate) fn map_sqlite_err(err: rusqlite::Error) -> MedRagError {
        MedRagError::from(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_tables_twice_is_a_no_op() {
        let store = DataStore::open_in_memory().unwrap();
        store.ensure_tables().unwrap();
        let stats_first = store.entity_statistics().unwrap();
        store.ensure_tables().unwrap();
        let stats_second = store.entity_statistics().unwrap();
        assert_eq!(stats_first.total_entities, stats_second.total_entities);
    }

    #[test]
    fn ensure_tables_seeds_the_diabetes_cluster() {
        let store = DataStore::open_in_memory().unwrap();
        store.ensure_tables().unwrap();
        let stats = store.entity_statistics().unwrap();
        assert!(stats.total_entities > 0);
        assert!(stats.total_relationships > 0);
    }
}
