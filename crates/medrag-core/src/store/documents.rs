//! FHIR clinical document vectors (§4.2, §4.4).
//!
//! `docref_vectors` holds a 384-dim text embedding alongside the document's
//! raw text so lexical (substring/keyword) search and semantic search can
//! both run against the same row.

use rusqlite::OptionalExtension;

use crate::error::Result;
use crate::models::Document;

use super::{blob_to_vector, vector_to_blob, DataStore};

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let document_date: Option<String> = row.get("document_date")?;
    Ok(Document {
        document_id: row.get("document_id")?,
        resource_kind: row.get("resource_kind")?,
        text: row.get("notes_text")?,
        patient_id: row.get("patient_id")?,
        encounter_id: row.get("encounter_id")?,
        document_date: document_date.and_then(|d| chrono::DateTime::parse_from_rfc3339(&d).ok())
            .map(|d| d.with_timezone(&chrono::Utc)),
    })
}

impl DataStore {
    /// Upsert one document and its embedding (§4.4). `document_id` is the
    /// key shared with the text HNSW index.
    pub fn insert_document(&self, document: &Document, embedding: Option<&[f32]>) -> Result<()> {
        let blob = embedding.map(vector_to_blob);
        self.writer().execute(
            "INSERT INTO docref_vectors \
             (document_id, resource_kind, notes_text, notes_vector, patient_id, encounter_id, document_date, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(document_id) DO UPDATE SET \
             resource_kind = excluded.resource_kind, \
             notes_text = excluded.notes_text, \
             notes_vector = excluded.notes_vector, \
             patient_id = excluded.patient_id, \
             encounter_id = excluded.encounter_id, \
             document_date = excluded.document_date",
            rusqlite::params![
                document.document_id,
                document.resource_kind,
                document.text,
                blob,
                document.patient_id,
                document.encounter_id,
                document.document_date.map(|d| d.to_rfc3339()),
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        if let Some(vector) = embedding {
            self.text_index
                .lock()
                .expect("text index lock poisoned")
                .upsert(&format!("document:{}", document.document_id), vector)?;
        }
        Ok(())
    }

    pub fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        Ok(self
            .reader()
            .query_row(
                "SELECT * FROM docref_vectors WHERE document_id = ?1",
                [document_id],
                row_to_document,
            )
            .optional()?)
    }

    /// Whether any document row has a populated embedding — callers use
    /// this to decide whether semantic search is viable or whether to fall
    /// straight back to lexical search (§4.4).
    pub fn has_document_vectors(&self) -> Result<bool> {
        let count: i64 = self.reader().query_row(
            "SELECT COUNT(*) FROM docref_vectors WHERE notes_vector IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// Semantic search over document embeddings, optionally scoped to a
    /// patient.
    pub fn search_documents_semantic(
        &self,
        query_vector: &[f32],
        limit: usize,
        patient_id: Option<&str>,
    ) -> Result<Vec<(Document, f32)>> {
        let hits = {
            let index = self.text_index.lock().expect("text index lock poisoned");
            index.search(query_vector, limit * 4)?
        };
        let reader = self.reader();
        let mut results = Vec::new();
        for (key, score) in hits {
            let Some(document_id) = key.strip_prefix("document:") else {
                continue;
            };
            let Some(document) = reader
                .query_row(
                    "SELECT * FROM docref_vectors WHERE document_id = ?1",
                    [document_id],
                    row_to_document,
                )
                .optional()?
            else {
                continue;
            };
            if let Some(patient) = patient_id {
                if document.patient_id.as_deref() != Some(patient) {
                    continue;
                }
            }
            results.push((document, score));
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    /// Case-insensitive keyword search over document text, the fallback
    /// when no embeddings are populated (§4.4).
    pub fn search_documents_lexical(
        &self,
        query: &str,
        limit: usize,
        patient_id: Option<&str>,
    ) -> Result<Vec<Document>> {
        let reader = self.reader();
        let pattern = format!("%{}%", query.replace('\\', "\\\\").replace('%', "\\%"));
        let rows = if let Some(patient) = patient_id {
            let mut stmt = reader.prepare(
                "SELECT * FROM docref_vectors WHERE notes_text LIKE ?1 ESCAPE '\\' \
                 AND patient_id = ?2 ORDER BY document_date DESC LIMIT ?3",
            )?;
            stmt.query_map(rusqlite::params![pattern, patient, limit as i64], row_to_document)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let mut stmt = reader.prepare(
                "SELECT * FROM docref_vectors WHERE notes_text LIKE ?1 ESCAPE '\\' \
                 ORDER BY document_date DESC LIMIT ?2",
            )?;
            stmt.query_map(rusqlite::params![pattern, limit as i64], row_to_document)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
    }

    /// Documents of a given FHIR resource kind (e.g. `DiagnosticReport` for
    /// the `get_radiology_reports` tool, §4.9), optionally scoped to a
    /// patient.
    pub fn documents_by_resource_kind(
        &self,
        resource_kind: &str,
        patient_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Document>> {
        let reader = self.reader();
        let rows = if let Some(patient) = patient_id {
            let mut stmt = reader.prepare(
                "SELECT * FROM docref_vectors WHERE resource_kind = ?1 AND patient_id = ?2 \
                 ORDER BY document_date DESC LIMIT ?3",
            )?;
            stmt.query_map(rusqlite::params![resource_kind, patient, limit as i64], row_to_document)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let mut stmt = reader.prepare(
                "SELECT * FROM docref_vectors WHERE resource_kind = ?1 \
                 ORDER BY document_date DESC LIMIT ?2",
            )?;
            stmt.query_map(rusqlite::params![resource_kind, limit as i64], row_to_document)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
    }

    /// Row embeddings still unset, mirroring [`DataStore::entities_missing_embedding`]
    /// for the document side of the lazy-population pass.
    pub fn documents_missing_embedding(&self, limit: usize) -> Result<Vec<Document>> {
        let reader = self.reader();
        let mut stmt = reader.prepare(
            "SELECT * FROM docref_vectors WHERE notes_vector IS NULL ORDER BY document_id LIMIT ?1",
        )?;
        Ok(stmt
            .query_map([limit as i64], row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?)
    }

    #[allow(dead_code)]
    pub(crate) fn document_embedding(&self, document_id: &str) -> Result<Option<Vec<f32>>> {
        Ok(self
            .reader()
            .query_row(
                "SELECT notes_vector FROM docref_vectors WHERE document_id = ?1",
                [document_id],
                |row| row.get::<_, Option<Vec<u8>>>(0),
            )
            .optional()?
            .flatten()
            .map(|blob| blob_to_vector(&blob)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(id: &str, text: &str, patient: &str) -> Document {
        Document {
            document_id: id.to_string(),
            resource_kind: "DocumentReference".to_string(),
            text: text.to_string(),
            patient_id: Some(patient.to_string()),
            encounter_id: None,
            document_date: Some(Utc::now()),
        }
    }

    #[test]
    fn insert_then_get_roundtrips() {
        let store = DataStore::open_in_memory().unwrap();
        store.ensure_tables().unwrap();
        store.insert_document(&doc("d1", "patient reports chest pain", "p1"), None).unwrap();
        let fetched = store.get_document("d1").unwrap().unwrap();
        assert_eq!(fetched.text, "patient reports chest pain");
    }

    #[test]
    fn lexical_search_is_scoped_to_patient() {
        let store = DataStore::open_in_memory().unwrap();
        store.ensure_tables().unwrap();
        store.insert_document(&doc("d1", "chest pain and dyspnea", "p1"), None).unwrap();
        store.insert_document(&doc("d2", "chest pain on exertion", "p2"), None).unwrap();

        let hits = store.search_documents_lexical("chest pain", 10, Some("p1")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "d1");
    }

    #[test]
    fn insert_upserts_on_conflict() {
        let store = DataStore::open_in_memory().unwrap();
        store.ensure_tables().unwrap();
        store.insert_document(&doc("d1", "first version", "p1"), None).unwrap();
        store.insert_document(&doc("d1", "second version", "p1"), None).unwrap();
        let fetched = store.get_document("d1").unwrap().unwrap();
        assert_eq!(fetched.text, "second version");
    }
}
