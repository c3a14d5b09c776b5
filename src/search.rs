//! Semantic search over the catalog with a deterministic lexical fallback.
//!
//! The engine holds one catalog and, when available, its index-aligned
//! embedding matrix plus a query-side embedding model. Both are fixed at
//! construction and read-only afterwards, so searching needs no locking.
//!
//! Degradation order: no matrix or no model means lexical scoring for the
//! engine's lifetime; a per-query embedding failure also answers that query
//! lexically rather than failing it.

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::embedder::{cosine_similarity, EmbeddingMatrix, QueryEmbedder};
use crate::models::{Catalog, SearchHit, ServerEntry};

pub struct SearchEngine {
    catalog: Catalog,
    matrix: Option<EmbeddingMatrix>,
    embedder: Option<Box<dyn QueryEmbedder>>,
    similarity_threshold: f32,
}

impl SearchEngine {
    /// Build an engine over `catalog`.
    ///
    /// Rejects a matrix whose row count differs from the entry count (the
    /// alignment invariant) and an embedder whose dimensionality differs
    /// from the matrix's. Callers that want graceful degradation drop the
    /// offending component and construct again.
    pub fn new(
        catalog: Catalog,
        matrix: Option<EmbeddingMatrix>,
        embedder: Option<Box<dyn QueryEmbedder>>,
        similarity_threshold: f32,
    ) -> Result<Self> {
        if let Some(ref m) = matrix {
            if m.len() != catalog.entry_count() {
                bail!(
                    "embedding matrix has {} rows for {} catalog entries",
                    m.len(),
                    catalog.entry_count()
                );
            }
            if let Some(ref e) = embedder {
                if !m.is_empty() && e.dims() != m.dims() {
                    bail!(
                        "embedding model produces {}-dim vectors but matrix rows are {}-dim",
                        e.dims(),
                        m.dims()
                    );
                }
            }
        }

        Ok(Self {
            catalog,
            matrix,
            embedder,
            similarity_threshold,
        })
    }

    /// Engine without semantic data: lexical scoring only.
    pub fn lexical_only(catalog: Catalog) -> Self {
        Self {
            catalog,
            matrix: None,
            embedder: None,
            similarity_threshold: 0.0,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Whether queries are answered by vector similarity.
    pub fn is_semantic(&self) -> bool {
        self.matrix.is_some() && self.embedder.is_some()
    }

    /// Rank catalog entries against a free-text query.
    ///
    /// Deterministic: for an unchanged catalog, identical queries return
    /// identical ranked output. Ties break by original catalog order.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        if query.trim().is_empty() || top_k == 0 {
            return Vec::new();
        }

        if let (Some(matrix), Some(embedder)) = (&self.matrix, &self.embedder) {
            match embedder.embed(query) {
                Ok(query_vec) => {
                    return self.rank_semantic(matrix, &query_vec, top_k);
                }
                Err(e) => {
                    warn!(error = %e, "query embedding failed, using lexical scorer");
                }
            }
        }

        self.lexical_search(query, top_k)
    }

    fn rank_semantic(
        &self,
        matrix: &EmbeddingMatrix,
        query_vec: &[f32],
        top_k: usize,
    ) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = (0..matrix.len())
            .map(|i| (i, cosine_similarity(query_vec, matrix.row(i))))
            .filter(|&(_, score)| score >= self.similarity_threshold)
            .collect();

        // Stable on the original index: equal scores keep catalog order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(i, score)| SearchHit {
                entry: self.catalog.entries[i].clone(),
                score,
            })
            .collect()
    }

    /// Deterministic lexical scorer, used whenever the embedding path is
    /// unavailable. Zero-score entries are never returned.
    pub fn lexical_search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        let query_lower = query.to_lowercase();
        let query_words: BTreeSet<&str> = query_lower.split_whitespace().collect();

        let mut scored: Vec<(usize, f32)> = self
            .catalog
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, relevance_score(entry, &query_lower, &query_words)))
            .filter(|&(_, score)| score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        debug!(hits = scored.len(), "lexical search");
        scored
            .into_iter()
            .map(|(i, score)| SearchHit {
                entry: self.catalog.entries[i].clone(),
                score,
            })
            .collect()
    }
}

/// Lexical relevance of one entry.
///
/// Tiers, additive: exact name match 100, name substring 50, description
/// substring 30; whole-word hits in the name 20 and in the description 10;
/// fuzzy (substring either way, both words at least three chars) 5 in the
/// name and 2 in the description. Words are compared as sets: a repeated
/// word scores once, so repetition never outranks a single mention. The
/// category bonus applies only on top of a positive base score so it can
/// never promote an entry with no content match at all.
fn relevance_score(
    entry: &ServerEntry,
    query_lower: &str,
    query_words: &BTreeSet<&str>,
) -> f32 {
    let mut score = 0.0f32;

    let name_lower = entry.name.to_lowercase();
    let desc_lower = entry.description.to_lowercase();

    if query_lower == name_lower {
        score += 100.0;
    } else if name_lower.contains(query_lower) {
        score += 50.0;
    }

    if desc_lower.contains(query_lower) {
        score += 30.0;
    }

    let name_words: BTreeSet<&str> = name_lower.split_whitespace().collect();
    let desc_words: BTreeSet<&str> = desc_lower.split_whitespace().collect();

    for qw in query_words {
        if name_words.contains(qw) {
            score += 20.0;
        }
        if desc_words.contains(qw) {
            score += 10.0;
        }
    }

    for qw in query_words.iter().filter(|w| w.len() >= 3) {
        for nw in name_words.iter().filter(|w| w.len() >= 3) {
            if nw.contains(*qw) || qw.contains(*nw) {
                score += 5.0;
            }
        }
        for dw in desc_words.iter().filter(|w| w.len() >= 3) {
            if dw.contains(*qw) || qw.contains(*dw) {
                score += 2.0;
            }
        }
    }

    if score > 0.0 {
        match entry.category.as_str() {
            "reference" => score += 5.0,
            "official" => score += 3.0,
            _ => {}
        }
    }

    score
}

/// Presentation-layer re-rank: promote a documented near-tie to primary.
///
/// `has_docs` is index-aligned with `hits` (callers probe documentation for
/// at most the first `window` candidates). If the nominal top match lacks
/// documentation and a candidate within `margin` of its score has some, that
/// candidate moves to the front. A dominant match is never displaced, and
/// relevance order among the rest is preserved.
pub fn promote_documented(
    hits: &mut Vec<SearchHit>,
    has_docs: &[bool],
    window: usize,
    margin: f32,
) {
    if hits.is_empty() || has_docs.first().copied().unwrap_or(false) {
        return;
    }

    let top_score = hits[0].score;
    let window = window.min(hits.len()).min(has_docs.len());

    for i in 1..window {
        if has_docs[i] && top_score - hits[i].score <= margin {
            let promoted = hits.remove(i);
            hits.insert(0, promoted);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::EmbeddingMatrix;
    use crate::schema::CURRENT_SCHEMA_VERSION;

    fn entry(name: &str, desc: &str, category: &str) -> ServerEntry {
        ServerEntry {
            name: name.to_string(),
            description: desc.to_string(),
            url: format!("https://github.com/example/{}", name),
            category: category.to_string(),
            source: "official".to_string(),
        }
    }

    fn weather_catalog() -> Catalog {
        Catalog::new(
            vec![
                entry("postgres-mcp", "Query PostgreSQL databases", "community"),
                entry(
                    "mcp-weather",
                    "Weather API integration for forecast data",
                    "community",
                ),
                entry("fs-server", "Secure file operations", "reference"),
            ],
            CURRENT_SCHEMA_VERSION,
        )
    }

    struct StubEmbedder {
        dims: usize,
    }

    impl QueryEmbedder for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0; self.dims])
        }
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0; self.dims]).collect())
        }
    }

    #[test]
    fn construction_rejects_misaligned_matrix() {
        let matrix = EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0]]).unwrap();
        let result = SearchEngine::new(weather_catalog(), Some(matrix), None, 0.1);
        assert!(result.is_err());
    }

    #[test]
    fn construction_rejects_dims_mismatch() {
        let matrix = EmbeddingMatrix::from_rows(vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 1.0],
        ])
        .unwrap();
        let embedder = Box::new(StubEmbedder { dims: 3 });
        let result = SearchEngine::new(weather_catalog(), Some(matrix), Some(embedder), 0.1);
        assert!(result.is_err());
    }

    #[test]
    fn semantic_ranking_sorts_by_similarity() {
        // Query embeds to [1, 1]; middle row is closest in direction.
        let matrix = EmbeddingMatrix::from_rows(vec![
            vec![1.0, 0.0],
            vec![0.7, 0.7],
            vec![-1.0, -1.0],
        ])
        .unwrap();
        let embedder = Box::new(StubEmbedder { dims: 2 });
        let engine =
            SearchEngine::new(weather_catalog(), Some(matrix), Some(embedder), 0.1).unwrap();
        assert!(engine.is_semantic());

        let hits = engine.search("anything", 3);
        assert_eq!(hits[0].entry.name, "mcp-weather");
        // The negative row falls below the threshold.
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn lexical_finds_weather_entry_first() {
        let engine = SearchEngine::lexical_only(weather_catalog());
        let hits = engine.search("weather forecast", 3);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].entry.name, "mcp-weather");
    }

    #[test]
    fn lexical_search_is_deterministic() {
        let engine = SearchEngine::lexical_only(weather_catalog());
        let first = engine.search("weather forecast", 3);
        let second = engine.search("weather forecast", 3);
        let names = |hits: &[SearchHit]| {
            hits.iter()
                .map(|h| (h.entry.name.clone(), h.score))
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&first), names(&second));
    }

    #[test]
    fn lexical_never_returns_zero_score() {
        let engine = SearchEngine::lexical_only(weather_catalog());
        let hits = engine.search("zzzzz qqqqq", 10);
        assert!(hits.is_empty());
    }

    #[test]
    fn category_bonus_requires_content_match() {
        // "reference" category alone must not produce a hit.
        let catalog = Catalog::new(
            vec![entry("unrelated", "nothing in common", "reference")],
            CURRENT_SCHEMA_VERSION,
        );
        let engine = SearchEngine::lexical_only(catalog);
        assert!(engine.search("weather", 5).is_empty());
    }

    #[test]
    fn category_bonus_breaks_content_ties() {
        let catalog = Catalog::new(
            vec![
                entry("alpha", "weather data", "community"),
                entry("beta", "weather data", "reference"),
            ],
            CURRENT_SCHEMA_VERSION,
        );
        let engine = SearchEngine::lexical_only(catalog);
        let hits = engine.search("weather", 2);
        assert_eq!(hits[0].entry.name, "beta");
    }

    #[test]
    fn repeated_words_score_no_higher_than_one_mention() {
        let catalog = Catalog::new(
            vec![
                entry("alpha", "weather data", "community"),
                entry("beta", "weather weather weather data", "community"),
            ],
            CURRENT_SCHEMA_VERSION,
        );
        let engine = SearchEngine::lexical_only(catalog);
        let hits = engine.search("weather", 2);
        assert_eq!(hits.len(), 2);
        // Word repetition must not break the tie; catalog order does.
        assert_eq!(hits[0].score, hits[1].score);
        assert_eq!(hits[0].entry.name, "alpha");
    }

    #[test]
    fn ties_keep_catalog_order() {
        let catalog = Catalog::new(
            vec![
                entry("first", "weather data", "community"),
                entry("second", "weather data", "community"),
            ],
            CURRENT_SCHEMA_VERSION,
        );
        let engine = SearchEngine::lexical_only(catalog);
        let hits = engine.search("weather", 2);
        assert_eq!(hits[0].entry.name, "first");
        assert_eq!(hits[1].entry.name, "second");
    }

    #[test]
    fn empty_query_returns_nothing() {
        let engine = SearchEngine::lexical_only(weather_catalog());
        assert!(engine.search("   ", 5).is_empty());
        assert!(engine.search("weather", 0).is_empty());
    }

    // ============ Promotion ============

    fn hit(name: &str, score: f32) -> SearchHit {
        SearchHit {
            entry: entry(name, "desc", "community"),
            score,
        }
    }

    #[test]
    fn promotes_documented_near_tie() {
        let mut hits = vec![hit("a", 0.90), hit("b", 0.88), hit("c", 0.5)];
        promote_documented(&mut hits, &[false, true, true], 4, 0.1);
        assert_eq!(hits[0].entry.name, "b");
        assert_eq!(hits[1].entry.name, "a");
        assert_eq!(hits[2].entry.name, "c");
    }

    #[test]
    fn documented_top_is_left_alone() {
        let mut hits = vec![hit("a", 0.90), hit("b", 0.89)];
        promote_documented(&mut hits, &[true, true], 4, 0.1);
        assert_eq!(hits[0].entry.name, "a");
    }

    #[test]
    fn dominant_match_is_never_displaced() {
        let mut hits = vec![hit("a", 0.95), hit("b", 0.5)];
        promote_documented(&mut hits, &[false, true], 4, 0.1);
        assert_eq!(hits[0].entry.name, "a");
    }

    #[test]
    fn promotion_respects_window() {
        let mut hits = vec![
            hit("a", 0.90),
            hit("b", 0.89),
            hit("c", 0.88),
            hit("d", 0.87),
            hit("e", 0.87),
        ];
        // Only "e" has docs but it sits outside the 4-wide window.
        promote_documented(&mut hits, &[false, false, false, false, true], 4, 0.1);
        assert_eq!(hits[0].entry.name, "a");
    }

    #[test]
    fn promotion_handles_empty_hits() {
        let mut hits: Vec<SearchHit> = Vec::new();
        promote_documented(&mut hits, &[], 4, 0.1);
        assert!(hits.is_empty());
    }
}
