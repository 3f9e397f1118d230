//! Data model
//!
//! Semantic entities shared across the retrieval services, the data store
//! adapter, and the ingestion pipeline (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dense vector dimension for FHIR document / entity-text / memory-item
/// embeddings. Kept distinct from [`IMAGE_EMBEDDING_DIM`] per Open Question
/// (c): text and image embeddings are never assumed to share a dimension.
pub const TEXT_EMBEDDING_DIM: usize = 384;

/// Dense vector dimension for radiology image embeddings.
pub const IMAGE_EMBEDDING_DIM: usize = 1024;

/// A FHIR clinical document indexed for search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub resource_kind: String,
    pub text: String,
    pub patient_id: Option<String>,
    pub encounter_id: Option<String>,
    pub document_date: Option<DateTime<Utc>>,
}

/// A knowledge-graph entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Condition,
    Symptom,
    Medication,
    Anatomy,
    Procedure,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Condition => "CONDITION",
            EntityType::Symptom => "SYMPTOM",
            EntityType::Medication => "MEDICATION",
            EntityType::Anatomy => "ANATOMY",
            EntityType::Procedure => "PROCEDURE",
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CONDITION" => Ok(EntityType::Condition),
            "SYMPTOM" => Ok(EntityType::Symptom),
            "MEDICATION" => Ok(EntityType::Medication),
            "ANATOMY" => Ok(EntityType::Anatomy),
            "PROCEDURE" => Ok(EntityType::Procedure),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

/// A knowledge-graph node. `(text, entity_type)` is unique (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub text: String,
    pub entity_type: EntityType,
    pub confidence: f64,
    pub resource_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A directed typed edge between two entities. `(source, target, type)` is
/// unique (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub source_entity_id: i64,
    pub target_entity_id: i64,
    pub relationship_type: String,
    pub confidence: f64,
    pub resource_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A radiology image row, written by the ingestion pipeline and read by
/// image vector search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub image_id: String,
    pub subject_id: String,
    pub study_id: String,
    pub view_position: String,
    pub image_path: String,
    pub embedding_model: String,
    pub fhir_resource_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// How a MIMIC subject id was matched to a FHIR patient id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    RandomAssignment,
    SyntheaGenerated,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::RandomAssignment => "random_assignment",
            MatchType::SyntheaGenerated => "synthea_generated",
        }
    }
}

/// MIMIC subject id <-> FHIR patient id, with a confidence and a match
/// provenance. `subject_id` is unique (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientMapping {
    pub subject_id: String,
    pub fhir_patient_id: String,
    pub fhir_patient_name: Option<String>,
    pub match_confidence: f64,
    pub match_type: MatchType,
}

/// A single recalled-or-remembered fact in the session-scoped vector
/// memory (§4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub session_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Which retrieval path produced a search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Semantic,
    Lexical,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Semantic => "semantic",
            SearchMode::Lexical => "lexical",
        }
    }
}
