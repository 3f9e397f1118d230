//! Schema Bootstrap
//!
//! `ensure_tables()` (§4.2) creates the schemas, tables and scalar indexes
//! named in §6's logical DB schema if they are absent, and is idempotent:
//! re-running it against an already-bootstrapped database is a no-op.

use rusqlite::Connection;

/// One versioned batch of DDL, applied in order and tracked in
/// `schema_version` so `ensure_tables()` only ever does work once per
/// version per database file.
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "RAG entities/relationships, vector search tables, patient mapping, memory items",
    up: SCHEMA_V1,
}];

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS rag_entities (
    entity_id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_text TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.8,
    resource_id TEXT,
    created_at TEXT NOT NULL,
    embedding BLOB,
    UNIQUE(entity_text, entity_type)
);
CREATE INDEX IF NOT EXISTS idx_entities_text ON rag_entities(entity_text);
CREATE INDEX IF NOT EXISTS idx_entities_type ON rag_entities(entity_type);

CREATE TABLE IF NOT EXISTS rag_entity_relationships (
    relationship_id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_entity_id INTEGER NOT NULL REFERENCES rag_entities(entity_id),
    target_entity_id INTEGER NOT NULL REFERENCES rag_entities(entity_id),
    relationship_type TEXT NOT NULL DEFAULT 'related',
    confidence REAL NOT NULL DEFAULT 0.7,
    resource_id TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(source_entity_id, target_entity_id, relationship_type)
);
CREATE INDEX IF NOT EXISTS idx_rel_source ON rag_entity_relationships(source_entity_id);
CREATE INDEX IF NOT EXISTS idx_rel_target ON rag_entity_relationships(target_entity_id);
CREATE INDEX IF NOT EXISTS idx_rel_type ON rag_entity_relationships(relationship_type);

-- VectorSearch.DocRefVectors: FHIR clinical documents with a 384-dim
-- text embedding (§6).
CREATE TABLE IF NOT EXISTS docref_vectors (
    document_id TEXT PRIMARY KEY,
    resource_kind TEXT NOT NULL,
    notes_text TEXT NOT NULL,
    notes_vector BLOB,
    patient_id TEXT,
    encounter_id TEXT,
    document_date TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_docref_patient ON docref_vectors(patient_id);
CREATE INDEX IF NOT EXISTS idx_docref_date ON docref_vectors(document_date);

-- VectorSearch.MIMICCXRImages: radiology images with a 1024-dim image
-- embedding (§6).
CREATE TABLE IF NOT EXISTS mimic_cxr_images (
    image_id TEXT PRIMARY KEY,
    subject_id TEXT NOT NULL,
    study_id TEXT NOT NULL,
    view_position TEXT NOT NULL,
    image_path TEXT NOT NULL,
    vector BLOB,
    embedding_model TEXT NOT NULL,
    fhir_resource_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_images_subject ON mimic_cxr_images(subject_id);
CREATE INDEX IF NOT EXISTS idx_images_study ON mimic_cxr_images(study_id);
CREATE INDEX IF NOT EXISTS idx_images_view ON mimic_cxr_images(view_position);
CREATE INDEX IF NOT EXISTS idx_images_fhir ON mimic_cxr_images(fhir_resource_id);

-- VectorSearch.PatientImageMapping: MIMIC subject <-> FHIR patient (§6).
CREATE TABLE IF NOT EXISTS patient_image_mapping (
    mimic_subject_id TEXT PRIMARY KEY,
    fhir_patient_id TEXT NOT NULL,
    fhir_patient_name TEXT,
    match_confidence REAL NOT NULL,
    match_type TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);
"#;

fn current_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply every migration newer than the database's current version.
/// Existing objects are left in place (`CREATE TABLE IF NOT EXISTS`): a
/// second call against an already-bootstrapped database applies nothing.
pub fn apply_migrations(conn: &Connection) -> rusqlite::Result<u32> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);")?;
    let current = current_version(conn)?;
    let mut applied = 0;
    for migration in MIGRATIONS {
        if migration.version > current {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying schema migration"
            );
            conn.execute_batch(migration.up)?;
            conn.execute(
                "INSERT INTO schema_version(version) VALUES (?1)",
                [migration.version],
            )?;
            applied += 1;
        }
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applying_twice_is_a_no_op_the_second_time() {
        let conn = Connection::open_in_memory().unwrap();
        let first = apply_migrations(&conn).unwrap();
        let second = apply_migrations(&conn).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[test]
    fn bootstrapped_database_has_the_expected_tables() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name='rag_entities'")
            .unwrap();
        assert!(stmt.exists([]).unwrap());
    }
}
