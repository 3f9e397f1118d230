//! Retrieval Services (§4.4-§4.7): FHIR document search, knowledge-graph
//! search and traversal, radiology image vector search, and the hybrid
//! fusion of the first two.

pub mod fhir_search;
pub mod hybrid;
pub mod image_search;
pub mod kg_search;

pub use fhir_search::{DocumentHit, DocumentSearchFilters, DocumentSearchResult};
pub use hybrid::{hybrid_search, HybridResult};
pub use image_search::{ImageHit, ImageQuery, ImageSearchFilters};
pub use kg_search::EntityHit;
