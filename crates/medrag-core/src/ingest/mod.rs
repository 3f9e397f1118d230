//! Ingestion Pipeline (§4.8).
//!
//! Discovery, checkpointed dedup, batched embedding, upsert, and optional
//! FHIR materialization, wired together in [`pipeline::run`].

mod checkpoint;
mod dicom;
mod discovery;
mod pipeline;

pub use checkpoint::{Checkpoint, CHECKPOINT_INTERVAL};
pub use dicom::{DefaultMetadataReader, DicomMetadata, FixtureMetadataReader, MetadataReader};
pub use discovery::{find_dicom_files, parse_path_metadata, DiscoveredFile, DiscoveryReport, MAX_FILE_SIZE_MB};
pub use pipeline::{run, IngestOptions, IngestReport};
