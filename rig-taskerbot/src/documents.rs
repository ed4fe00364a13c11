//! Document context for the ChatBot
//!
//! Uploaded text is split into chunks, embedded and kept in memory. Each turn
//! the chunks closest to the user's message are added to the system prompt.
//!
//! ```rust,ignore
//! let embedder = config.embedder()?;
//! let mut bot = ChatBot::new(llm, registry, "You answer questions about our policies.")
//!     .with_embedder(embedder);
//! bot.process_file(&std::fs::read_to_string("refunds.md")?).await?;
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::TaskerError;

/// Characters per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Chunks retrieved per query
pub const DEFAULT_TOP_K: usize = 4;

const SEPARATOR: &str = "\n\n";

/// Produces one vector per input text, in input order
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, TaskerError>;
}

/// Any Rig embedding model as an [`Embedder`]
pub struct RigEmbedder<M> {
    model: M,
}

impl<M> RigEmbedder<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M> Embedder for RigEmbedder<M>
where
    M: rig::embeddings::EmbeddingModel + Send + Sync,
{
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, TaskerError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(M::MAX_DOCUMENTS.max(1)) {
            let embeddings = self
                .model
                .embed_texts(batch.to_vec())
                .await
                .map_err(|e| TaskerError::LlmError(format!("embedding failed: {e}")))?;
            vectors.extend(
                embeddings
                    .into_iter()
                    .map(|e| e.vec.into_iter().map(|x| x as f32).collect::<Vec<f32>>()),
            );
        }
        Ok(vectors)
    }
}

/// Split `text` on blank lines and pack the pieces into chunks of at most
/// `chunk_size` characters. A single piece longer than `chunk_size` becomes
/// its own chunk.
pub fn split_text(text: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for piece in text.split(SEPARATOR).map(str::trim).filter(|p| !p.is_empty()) {
        let joined = current.chars().count() + SEPARATOR.len() + piece.chars().count();
        if !current.is_empty() && joined > chunk_size {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str(SEPARATOR);
        }
        current.push_str(piece);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

struct Chunk {
    text: String,
    vector: Vec<f32>,
}

/// In-memory similarity index over document chunks
pub struct DocumentIndex {
    embedder: Arc<dyn Embedder>,
    chunk_size: usize,
    chunks: Vec<Chunk>,
}

impl DocumentIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunks: Vec::new(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Chunk, embed and index `text`. Returns the number of chunks added.
    pub async fn add_text(&mut self, text: &str) -> Result<usize, TaskerError> {
        let pieces = split_text(text, self.chunk_size);
        if pieces.is_empty() {
            return Ok(0);
        }

        let vectors = self.embedder.embed(&pieces).await?;
        if vectors.len() != pieces.len() {
            return Err(TaskerError::LlmError(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                pieces.len()
            )));
        }

        let added = pieces.len();
        self.chunks.extend(
            pieces
                .into_iter()
                .zip(vectors)
                .map(|(text, vector)| Chunk { text, vector }),
        );
        debug!(added, total = self.chunks.len(), "Document indexed");
        Ok(added)
    }

    /// The `k` chunks most similar to `query`, best first
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<String>, TaskerError> {
        if self.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TaskerError::LlmError("embedder returned no vector".into()))?;

        let mut scored: Vec<(f32, &Chunk)> = self
            .chunks
            .iter()
            .map(|c| (cosine_similarity(&query_vector, &c.vector), c))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored.into_iter().take(k).map(|(_, c)| c.text.clone()).collect())
    }

    /// Joined text of the best `k` chunks, empty when nothing is indexed
    pub async fn context_for(&self, query: &str, k: usize) -> Result<String, TaskerError> {
        Ok(self.search(query, k).await?.join("\n"))
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl std::fmt::Debug for DocumentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIndex")
            .field("chunk_size", &self.chunk_size)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

/// Deterministic bag-of-keywords embedder for tests
#[cfg(test)]
pub(crate) struct KeywordEmbedder {
    pub keywords: Vec<&'static str>,
}

#[cfg(test)]
#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, TaskerError> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                self.keywords
                    .iter()
                    .map(|k| lower.matches(k).count() as f32)
                    .collect()
            })
            .collect())
    }
}
