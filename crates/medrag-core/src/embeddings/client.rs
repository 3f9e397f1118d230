use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::embeddings::Embedding;
use crate::error::{MedRagError, Result};
use crate::retry::RetryPolicy;

/// Whether the client talks to a real embedding service or has downgraded
/// to deterministic placeholder vectors after exhausting its retry policy
/// (§4.1, §7: dependency failures downgrade rather than abort a query).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMode {
    Live,
    Mock,
}

/// Whether the request embeds a document/passage for indexing or a query
/// for search, per the embedding service contract in §6
/// (`input_type:"passage"|"query"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Passage,
    Query,
}

impl InputType {
    fn as_str(&self) -> &'static str {
        match self {
            InputType::Passage => "passage",
            InputType::Query => "query",
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    input_type: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponseItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedResponseItem>,
}

/// Thin HTTP/JSON client over a pooled connection to the embedding
/// service. Holds no model weights and does no local inference.
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
    retry: RetryPolicy,
    mode: std::sync::atomic::AtomicU8,
}

const LIVE: u8 = 0;
const MOCK: u8 = 1;

impl EmbeddingClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            dimensions,
            retry: RetryPolicy::embedding(),
            mode: std::sync::atomic::AtomicU8::new(LIVE),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn mode(&self) -> MockMode {
        match self.mode.load(std::sync::atomic::Ordering::Relaxed) {
            MOCK => MockMode::Mock,
            _ => MockMode::Live,
        }
    }

    /// Embed a single piece of text. Never fails: after exhausting the
    /// retry policy it downgrades to a deterministic mock vector derived
    /// from a hash of the text, so a caller can always proceed in
    /// degraded (lexical-dominant) mode rather than erroring the query.
    pub async fn embed(&self, text: &str, input_type: InputType) -> Embedding {
        self.embed_batch(std::slice::from_ref(&text.to_string()), input_type)
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| self.mock_embedding(text))
    }

    /// Embed a batch of texts in one request where possible.
    pub async fn embed_batch(&self, texts: &[String], input_type: InputType) -> Vec<Embedding> {
        if texts.is_empty() {
            return Vec::new();
        }
        if self.mode() == MockMode::Mock {
            return texts.iter().map(|t| self.mock_embedding(t)).collect();
        }

        let result = self
            .retry
            .run(|| self.embed_batch_once(texts, input_type))
            .await;

        match result {
            Ok(embeddings) => embeddings,
            Err(err) => {
                tracing::warn!("embedding service unavailable, downgrading to mock mode: {err}");
                self.mode.store(MOCK, std::sync::atomic::Ordering::Relaxed);
                texts.iter().map(|t| self.mock_embedding(t)).collect()
            }
        }
    }

    /// Health check (§4.1): a trivial `embed_text("test")` whose resulting
    /// dimension must match this client's configured dimension. A failure
    /// downgrades the client to mock mode, the same sticky flag
    /// [`EmbeddingClient::embed_batch`] sets on retry exhaustion, so a
    /// caller polling [`EmbeddingClient::mode`] afterward observes it.
    pub async fn health_check(&self) -> bool {
        if self.mode() == MockMode::Mock {
            return false;
        }
        match self.embed_batch_once(&["test".to_string()], InputType::Query).await {
            Ok(embeddings) if embeddings.first().map(|e| e.dimensions) == Some(self.dimensions) => true,
            _ => {
                self.mode.store(MOCK, std::sync::atomic::Ordering::Relaxed);
                false
            }
        }
    }

    async fn embed_batch_once(&self, texts: &[String], input_type: InputType) -> Result<Vec<Embedding>> {
        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url.trim_end_matches('/')))
            .json(&json!(EmbedRequest {
                model: &self.model,
                input: texts,
                input_type: input_type.as_str(),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MedRagError::DependencyUnavailable(format!(
                "embedding service returned {}",
                response.status()
            )));
        }

        let mut parsed: EmbedResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(MedRagError::DataError(format!(
                "embedding response size mismatch: expected {}, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed
            .data
            .into_iter()
            .map(|item| Embedding::new(item.embedding).normalized())
            .collect())
    }

    /// A stable, content-derived vector used only when the embedding
    /// service is unreachable. Not semantically meaningful beyond giving
    /// lexical search something consistent to rank against.
    fn mock_embedding(&self, text: &str) -> Embedding {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        let mut vector = Vec::with_capacity(self.dimensions);
        let mut state = seed;
        for _ in 0..self.dimensions {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let value = ((state >> 33) as u32 as f32 / u32::MAX as f32) * 2.0 - 1.0;
            vector.push(value);
        }
        Embedding::new(vector).normalized()
    }
}
