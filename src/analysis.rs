//! Chunking and embedding statistics for context corpora.

use crate::error::{Result, ValidatorError};
use crate::llm::LlmClient;
use crate::model::ContextDocument;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration for text chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ValidatorError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ValidatorError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A chunk of text with its character span in the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source_id: String,
    pub text: String,
    /// Start character position in original document.
    pub start_pos: usize,
    /// End character position in original document (exclusive).
    pub end_pos: usize,
    pub index: usize,
}

/// Characters scanned backwards from a window end looking for a sentence break.
const SENTENCE_LOOKBACK: usize = 100;

/// Split text into overlapping character windows.
///
/// A window that would cut mid-text is shortened to end just after the last
/// `.`, `!` or `?` within its final 100 characters. Whitespace-only windows
/// are dropped and every step advances by at least one character.
pub fn chunk_text(source_id: &str, text: &str, config: &ChunkConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let text_len = chars.len();
    let size = config.chunk_size.max(1);

    let mut start = 0;
    while start < text_len {
        let end = (start + size).min(text_len);

        let mut final_end = end;
        if end < text_len {
            let search_start = end.saturating_sub(SENTENCE_LOOKBACK).max(start);
            if let Some(pos) = chars[search_start..end]
                .iter()
                .rposition(|c| matches!(c, '.' | '!' | '?'))
            {
                let candidate = search_start + pos + 1;
                if candidate > start {
                    final_end = candidate;
                }
            }
        }

        let window: String = chars[start..final_end].iter().collect();
        if !window.trim().is_empty() {
            chunks.push(Chunk {
                source_id: source_id.to_string(),
                text: window.trim().to_string(),
                start_pos: start,
                end_pos: final_end,
                index: chunks.len(),
            });
        }

        if final_end >= text_len {
            break;
        }

        let next_start = final_end.saturating_sub(config.chunk_overlap);
        start = if next_start <= start { start + 1 } else { next_start };
    }

    chunks
}

/// Chunk every document, preserving document order.
pub fn chunk_documents(documents: &[ContextDocument], config: &ChunkConfig) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| chunk_text(&doc.source_id, &doc.text, config))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkStats {
    pub count: usize,
    pub mean_chars: f64,
    pub min_chars: usize,
    pub max_chars: usize,
}

impl ChunkStats {
    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        let lengths: Vec<usize> = chunks.iter().map(|c| c.text.chars().count()).collect();
        if lengths.is_empty() {
            return Self {
                count: 0,
                mean_chars: 0.0,
                min_chars: 0,
                max_chars: 0,
            };
        }
        Self {
            count: lengths.len(),
            mean_chars: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
            min_chars: lengths.iter().copied().min().unwrap_or(0),
            max_chars: lengths.iter().copied().max().unwrap_or(0),
        }
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Dominant direction of variation across a set of embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrincipalComponent {
    /// Unit vector.
    pub direction: Vec<f64>,
    /// Variance along `direction`.
    pub eigenvalue: f64,
    /// `eigenvalue` divided by total variance.
    pub explained_variance_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingStats {
    pub count: usize,
    pub dimension: usize,
    /// Per-dimension mean.
    pub mean: Vec<f64>,
    /// Per-dimension population variance.
    pub variance: Vec<f64>,
    pub mean_norm: f64,
    /// Pairwise cosine similarity; `None` with fewer than two vectors.
    pub cosine: Option<SimilarityStats>,
    /// `None` when the vectors have no variance at all.
    pub principal: Option<PrincipalComponent>,
}

impl EmbeddingStats {
    pub fn total_variance(&self) -> f64 {
        self.variance.iter().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Power-method iterations for the principal direction.
    pub power_iterations: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self { power_iterations: 1 }
    }
}

fn normalize(v: &mut [f64]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    v.iter_mut().for_each(|x| *x /= norm);
    true
}

/// Multiply the (population) covariance matrix by `v` without materializing it.
fn covariance_times(centered: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    let n = centered.len() as f64;
    let mut out = vec![0.0; v.len()];
    for row in centered {
        let projection: f64 = row.iter().zip(v).map(|(x, y)| x * y).sum();
        for (o, x) in out.iter_mut().zip(row) {
            *o += x * projection / n;
        }
    }
    out
}

fn principal_component(
    centered: &[Vec<f64>],
    variance: &[f64],
    iterations: usize,
) -> Option<PrincipalComponent> {
    let total: f64 = variance.iter().sum();
    if total <= 0.0 {
        return None;
    }

    // Seed: the first centered row of largest norm. A data row always has a
    // positive Rayleigh quotient, so the seed is never in the null space.
    let squared_norm = |row: &Vec<f64>| row.iter().map(|x| x * x).sum::<f64>();
    let mut seed = centered.first()?;
    for row in centered {
        if squared_norm(row) > squared_norm(seed) {
            seed = row;
        }
    }
    let mut direction = seed.clone();
    if !normalize(&mut direction) {
        return None;
    }

    for _ in 0..iterations {
        let mut next = covariance_times(centered, &direction);
        if !normalize(&mut next) {
            break;
        }
        direction = next;
    }

    let projected = covariance_times(centered, &direction);
    let eigenvalue: f64 = projected.iter().zip(&direction).map(|(x, y)| x * y).sum();

    Some(PrincipalComponent {
        direction,
        eigenvalue,
        explained_variance_ratio: (eigenvalue / total).clamp(0.0, 1.0),
    })
}

/// Summary statistics over a set of equally-sized embedding vectors.
pub fn embedding_stats(embeddings: &[Vec<f32>], options: &AnalysisOptions) -> Result<EmbeddingStats> {
    let Some(first) = embeddings.first() else {
        return Err(ValidatorError::InvalidInput("no embeddings to analyze".to_string()));
    };
    let dimension = first.len();
    if dimension == 0 {
        return Err(ValidatorError::InvalidInput("embeddings are empty vectors".to_string()));
    }
    if let Some((i, v)) = embeddings.iter().enumerate().find(|(_, v)| v.len() != dimension) {
        return Err(ValidatorError::InvalidInput(format!(
            "embedding {} has dimension {}, expected {}",
            i,
            v.len(),
            dimension
        )));
    }

    let n = embeddings.len() as f64;
    let mut mean = vec![0.0; dimension];
    for v in embeddings {
        for (m, x) in mean.iter_mut().zip(v) {
            *m += *x as f64 / n;
        }
    }

    let centered: Vec<Vec<f64>> = embeddings
        .iter()
        .map(|v| v.iter().zip(&mean).map(|(x, m)| *x as f64 - m).collect())
        .collect();

    let mut variance = vec![0.0; dimension];
    for row in &centered {
        for (var, x) in variance.iter_mut().zip(row) {
            *var += x * x / n;
        }
    }

    let mean_norm = embeddings
        .iter()
        .map(|v| v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt())
        .sum::<f64>()
        / n;

    let mut similarities = Vec::new();
    for i in 0..embeddings.len() {
        for j in (i + 1)..embeddings.len() {
            similarities.push(cosine_similarity(&embeddings[i], &embeddings[j]) as f64);
        }
    }
    let cosine = if similarities.is_empty() {
        None
    } else {
        Some(SimilarityStats {
            mean: similarities.iter().sum::<f64>() / similarities.len() as f64,
            min: similarities.iter().copied().fold(f64::INFINITY, f64::min),
            max: similarities.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    };

    let principal = principal_component(&centered, &variance, options.power_iterations);

    debug!(count = embeddings.len(), dimension, "computed embedding statistics");

    Ok(EmbeddingStats {
        count: embeddings.len(),
        dimension,
        mean,
        variance,
        mean_norm,
        cosine,
        principal,
    })
}

/// Embeds chunks through an OpenAI-compatible embeddings endpoint.
pub struct EmbeddingAnalyzer {
    client: LlmClient,
    model: String,
    batch_size: usize,
}

impl EmbeddingAnalyzer {
    pub fn new(client: LlmClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            batch_size: 32,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Embed every chunk, in order.
    pub async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            embeddings.extend(self.client.embed(&self.model, &texts).await?);
        }
        Ok(embeddings)
    }

    /// Chunk, embed and summarize a set of documents.
    pub async fn analyze(
        &self,
        documents: &[ContextDocument],
        chunking: &ChunkConfig,
        options: &AnalysisOptions,
    ) -> Result<(ChunkStats, EmbeddingStats)> {
        chunking.validate()?;
        let chunks = chunk_documents(documents, chunking);
        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            model = %self.model,
            "embedding chunks"
        );
        let embeddings = self.embed_chunks(&chunks).await?;
        let stats = embedding_stats(&embeddings, options)?;
        Ok((ChunkStats::from_chunks(&chunks), stats))
    }
}
