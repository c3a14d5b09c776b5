//! Embedding model handle and vector utilities.
//!
//! Defines the [`QueryEmbedder`] seam the search engine talks to, a
//! fastembed-backed implementation behind the `local-embeddings` feature,
//! and the [`EmbeddingMatrix`] binary codec shared by the cache and the
//! precomputed-bundle loader:
//!
//! ```text
//! u32 rows (LE) | u32 dims (LE) | rows × dims × f32 (LE)
//! ```
//!
//! An embedder is only ever used for query-side encoding at search time and
//! batch encoding when a catalog's matrix has to be rebuilt; load failure is
//! not fatal anywhere — callers degrade to the lexical scorer.

use anyhow::{bail, Context, Result};

/// One fixed-length vector per catalog entry, aligned by index position.
///
/// The row count must equal the owning catalog's entry count; any mismatch
/// is treated as corrupt data and the matrix is discarded by its consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    data: Vec<f32>,
    dims: usize,
}

impl EmbeddingMatrix {
    /// Build a matrix from per-entry rows. All rows must share one width.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Ok(Self {
                data: Vec::new(),
                dims: 0,
            });
        };
        let dims = first.len();
        if dims == 0 {
            bail!("embedding rows must not be empty");
        }

        let mut data = Vec::with_capacity(rows.len() * dims);
        for row in &rows {
            if row.len() != dims {
                bail!(
                    "ragged embedding matrix: expected {} dims, found {}",
                    dims,
                    row.len()
                );
            }
            data.extend_from_slice(row);
        }
        Ok(Self { data, dims })
    }

    pub fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dims..(i + 1) * self.dims]
    }

    /// Encode as little-endian bytes with a `rows, dims` header.
    pub fn to_blob(&self) -> Vec<u8> {
        let rows = self.len() as u32;
        let mut bytes = Vec::with_capacity(8 + self.data.len() * 4);
        bytes.extend_from_slice(&rows.to_le_bytes());
        bytes.extend_from_slice(&(self.dims as u32).to_le_bytes());
        for &v in &self.data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    /// Decode a blob produced by [`to_blob`](Self::to_blob).
    ///
    /// Fails on any structural inconsistency (short header, payload length
    /// not matching `rows × dims`), which consumers treat as corruption.
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        if blob.len() < 8 {
            bail!("embedding blob too short for header: {} bytes", blob.len());
        }
        let rows = u32::from_le_bytes([blob[0], blob[1], blob[2], blob[3]]) as usize;
        let dims = u32::from_le_bytes([blob[4], blob[5], blob[6], blob[7]]) as usize;
        let payload = &blob[8..];

        let expected = rows
            .checked_mul(dims)
            .and_then(|n| n.checked_mul(4))
            .context("embedding blob header overflow")?;
        if payload.len() != expected {
            bail!(
                "embedding blob payload mismatch: header says {}x{}, found {} bytes",
                rows,
                dims,
                payload.len()
            );
        }
        if rows > 0 && dims == 0 {
            bail!("embedding blob has rows but zero dims");
        }

        let data: Vec<f32> = payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { data, dims })
    }
}

/// Cosine similarity between two vectors.
///
/// Returns `0.0` for empty vectors, mismatched lengths, or zero norms.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Interface to the embedding model.
///
/// Implementations embed free text into the same vector space as the catalog
/// matrix. The model identifier participates in content hashing so matrices
/// computed with one model are never reused with another.
pub trait QueryEmbedder: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Load the configured embedding model.
///
/// Downloads model files into `models_dir` on first use. Errors here mean
/// "no semantic search this process" — callers fall back to the lexical
/// scorer rather than propagating.
#[cfg(feature = "local-embeddings")]
pub fn load_embedder(
    model_name: &str,
    models_dir: &std::path::Path,
) -> Result<Box<dyn QueryEmbedder>> {
    Ok(Box::new(fastembed_impl::FastembedEmbedder::new(
        model_name, models_dir,
    )?))
}

#[cfg(not(feature = "local-embeddings"))]
pub fn load_embedder(
    _model_name: &str,
    _models_dir: &std::path::Path,
) -> Result<Box<dyn QueryEmbedder>> {
    bail!("built without local embedding support (feature `local-embeddings`)")
}

#[cfg(feature = "local-embeddings")]
mod fastembed_impl {
    use std::path::Path;
    use std::sync::Mutex;

    use anyhow::{bail, Context, Result};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use tracing::info;

    use super::QueryEmbedder;

    /// fastembed wrapper. The `Mutex` exists because `TextEmbedding::embed`
    /// takes `&mut self`.
    pub struct FastembedEmbedder {
        model: Mutex<TextEmbedding>,
        model_name: String,
        dims: usize,
    }

    fn parse_model_name(name: &str) -> Result<EmbeddingModel> {
        match name {
            "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "all-MiniLM-L12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
            "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            other => bail!("unsupported embedding model: {}", other),
        }
    }

    impl FastembedEmbedder {
        pub fn new(model_name: &str, models_dir: &Path) -> Result<Self> {
            let which = parse_model_name(model_name)?;

            std::fs::create_dir_all(models_dir)
                .with_context(|| format!("failed to create {}", models_dir.display()))?;

            info!(model = model_name, "loading embedding model");
            let options = InitOptions::new(which).with_cache_dir(models_dir.to_path_buf());
            let mut model = TextEmbedding::try_new(options)
                .with_context(|| format!("failed to initialize model {}", model_name))?;

            // Probe the dimensionality with a throwaway embedding.
            let probe = model
                .embed(vec!["probe"], None)
                .context("model probe embedding failed")?;
            let dims = probe
                .first()
                .map(|v| v.len())
                .context("model returned no probe embedding")?;

            Ok(Self {
                model: Mutex::new(model),
                model_name: model_name.to_string(),
                dims,
            })
        }
    }

    impl QueryEmbedder for FastembedEmbedder {
        fn model_name(&self) -> &str {
            &self.model_name
        }

        fn dims(&self) -> usize {
            self.dims
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut model = self
                .model
                .lock()
                .map_err(|_| anyhow::anyhow!("embedding model lock poisoned"))?;
            let mut vectors = model.embed(vec![text], None)?;
            if vectors.is_empty() {
                bail!("model returned no embedding");
            }
            Ok(vectors.remove(0))
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let mut model = self
                .model
                .lock()
                .map_err(|_| anyhow::anyhow!("embedding model lock poisoned"))?;
            Ok(model.embed(texts.to_vec(), None)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_blob_roundtrip() {
        let m = EmbeddingMatrix::from_rows(vec![
            vec![1.0, -2.5, 3.125],
            vec![0.0, 0.5, -0.001],
        ])
        .unwrap();
        let blob = m.to_blob();
        let back = EmbeddingMatrix::from_blob(&blob).unwrap();
        assert_eq!(m, back);
        assert_eq!(back.len(), 2);
        assert_eq!(back.dims(), 3);
        assert_eq!(back.row(1), &[0.0, 0.5, -0.001]);
    }

    #[test]
    fn empty_matrix_roundtrip() {
        let m = EmbeddingMatrix::from_rows(Vec::new()).unwrap();
        assert!(m.is_empty());
        let back = EmbeddingMatrix::from_blob(&m.to_blob()).unwrap();
        assert_eq!(back.len(), 0);
    }

    #[test]
    fn ragged_rows_rejected() {
        let result = EmbeddingMatrix::from_rows(vec![vec![1.0, 2.0], vec![1.0]]);
        assert!(result.is_err());
    }

    #[test]
    fn truncated_blob_rejected() {
        let m = EmbeddingMatrix::from_rows(vec![vec![1.0, 2.0, 3.0]]).unwrap();
        let mut blob = m.to_blob();
        blob.pop();
        assert!(EmbeddingMatrix::from_blob(&blob).is_err());
        assert!(EmbeddingMatrix::from_blob(&blob[..5]).is_err());
    }

    #[test]
    fn header_payload_mismatch_rejected() {
        // Header claims 3 rows of 2 dims but carries only one row.
        let mut blob = Vec::new();
        blob.extend_from_slice(&3u32.to_le_bytes());
        blob.extend_from_slice(&2u32.to_le_bytes());
        blob.extend_from_slice(&1.0f32.to_le_bytes());
        blob.extend_from_slice(&2.0f32.to_le_bytes());
        assert!(EmbeddingMatrix::from_blob(&blob).is_err());
    }

    #[test]
    fn cosine_identical_and_orthogonal() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);

        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
