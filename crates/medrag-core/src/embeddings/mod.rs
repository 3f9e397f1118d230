//! Embedding Client
//!
//! Unlike a locally-hosted model, embeddings here come from a remote HTTP
//! service (§4.1): the service that runs IRIS's FHIR store and the
//! embedding model live on the same deployment, so there is no local ONNX
//! inference path to fall back to. What the client keeps from that kind of
//! design is the shape: a small vector type, a cosine similarity helper,
//! and a service object that is either ready or explicitly in mock mode.

mod client;

pub use client::{EmbeddingClient, InputType, MockMode};

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::models::{IMAGE_EMBEDDING_DIM, TEXT_EMBEDDING_DIM};

/// Query embeddings are re-requested constantly (every knowledge-graph
/// search, every hybrid search, every memory recall); cache capacity is
/// sized for one busy session's worth of distinct queries, not the whole
/// corpus.
const QUERY_CACHE_CAPACITY: usize = 100;

/// The single process-wide handle to the remote embedding service (§4.1,
/// §5: "process-wide singletons, internally synchronized"), split into the
/// two dimension-tagged operations Open Question (c) requires: a caller can
/// never accidentally compare a 384-dim document embedding against a
/// 1024-dim image embedding because they come from distinct clients with
/// distinct types.
pub struct Embeddings {
    text: EmbeddingClient,
    image: EmbeddingClient,
    query_cache: Mutex<LruCache<String, Embedding>>,
}

impl Embeddings {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            text: EmbeddingClient::new(base_url.clone(), "medrag-text-embed", TEXT_EMBEDDING_DIM),
            image: EmbeddingClient::new(base_url, "medrag-image-embed", IMAGE_EMBEDDING_DIM),
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_CAPACITY).expect("cache capacity is a nonzero constant"),
            )),
        }
    }

    /// `embed_text(s) -> vec[384]` (§4.1), for document/entity/memory
    /// passages going into the index.
    pub async fn embed_text(&self, text: &str) -> Embedding {
        self.text.embed(text, InputType::Passage).await
    }

    /// The query-time counterpart of [`Embeddings::embed_text`] — same
    /// client, `input_type:"query"` per §6. Repeated queries within the
    /// cache window skip the network round trip entirely.
    pub async fn embed_query(&self, text: &str) -> Embedding {
        if let Some(cached) = self.query_cache.lock().expect("query cache lock poisoned").get(text) {
            return cached.clone();
        }
        let embedding = self.text.embed(text, InputType::Query).await;
        self.query_cache
            .lock()
            .expect("query cache lock poisoned")
            .put(text.to_string(), embedding.clone());
        embedding
    }

    /// `embed_batch(list) -> list[vec]` over the text client (§4.1), used
    /// by the ingestion pipeline's batched embedding phase for the text
    /// prompts it constructs per image, and by knowledge-graph lazy
    /// embedding population.
    pub async fn embed_text_batch(&self, texts: &[String]) -> Vec<Embedding> {
        self.text.embed_batch(texts, InputType::Passage).await
    }

    /// `embed_image(bytes) -> vec[1024]` (§4.1). The embedding service's
    /// wire contract (§6) only accepts string input, so raw bytes are
    /// hex-encoded before being sent — the service is expected to
    /// recognize the image-tagged model and decode accordingly.
    pub async fn embed_image(&self, bytes: &[u8]) -> Embedding {
        let encoded = hex_encode(bytes);
        self.image.embed(&encoded, InputType::Passage).await
    }

    /// Batched `embed_image` over text prompts (e.g. `"Chest X-ray PA
    /// view"`), the shape the ingestion pipeline actually uses (§4.8 phase
    /// 3): MIMIC-CXR ingestion never has pixel bytes in scope, only a
    /// constructed description per image, embedded by the 1024-dim image
    /// model.
    pub async fn embed_image_batch(&self, texts: &[String]) -> Vec<Embedding> {
        self.image.embed_batch(texts, InputType::Passage).await
    }

    pub fn text_client(&self) -> &EmbeddingClient {
        &self.text
    }

    pub fn image_client(&self) -> &EmbeddingClient {
        &self.image
    }

    pub async fn health_check(&self) -> bool {
        self.text.health_check().await && self.image.health_check().await
    }
}

/// A dense embedding vector tagged with its dimensionality, so a document
/// embedding can never be silently compared against an image embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub dimensions: usize,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        let dimensions = vector.len();
        Self { vector, dimensions }
    }

    /// L2-normalize in place. The embedding service is contracted to return
    /// unit vectors already (§4.1); this is a defensive re-normalization so
    /// a client-side bug or a mock vector can never silently violate that
    /// contract for downstream cosine-similarity math.
    pub fn normalized(mut self) -> Self {
        let norm = self.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut self.vector {
                *x /= norm;
            }
        }
        self
    }

    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.dimensions != other.dimensions {
            return 0.0;
        }
        cosine_similarity(&self.vector, &other.vector)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Cosine similarity between two equal-length vectors. Returns 0.0 for
/// mismatched lengths or zero-norm vectors rather than panicking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
