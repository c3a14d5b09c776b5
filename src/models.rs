//! Core data models for the discovery index.
//!
//! These types represent the server descriptors that flow from the listing
//! parsers through aggregation, caching, and search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::schema::SchemaVersion;

/// One discoverable MCP server descriptor.
///
/// Produced by a listing parser, possibly merged with same-URL entries from
/// other sources by the aggregator, and held immutably for the lifetime of
/// a search index. The `url` is the dedup key; `source` is a provenance
/// label that becomes a `"a+b"` composite after a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub description: String,
    pub url: String,
    pub category: String,
    #[serde(default = "unknown_source")]
    pub source: String,
}

fn unknown_source() -> String {
    "unknown".to_string()
}

impl ServerEntry {
    /// Text representation used for embedding and content hashing.
    pub fn embedding_text(&self) -> String {
        format!(
            "{}. {}. Category: {}",
            self.name, self.description, self.category
        )
    }
}

/// The deduplicated, ordered collection of entries at a point in time.
///
/// Owned by the [`Database`](crate::database::Database) for the process
/// lifetime; replaced wholesale on refresh, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub entries: Vec<ServerEntry>,
    pub retrieved_at: DateTime<Utc>,
    pub schema_version: SchemaVersion,
}

/// Format tag mixed into the content hash. Bump when the embedding text or
/// hash layout changes so stale cached matrices stop matching.
pub const EMBEDDINGS_VERSION: &str = "v1";

impl Catalog {
    pub fn new(entries: Vec<ServerEntry>, schema_version: SchemaVersion) -> Self {
        Self {
            entries,
            retrieved_at: Utc::now(),
            schema_version,
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Stable hash of entry content (not provenance), keyed by the embedding
    /// model. Used to name cached embedding matrices: two runs over the same
    /// catalog content and model share one cache file regardless of elapsed
    /// time or entry order on disk.
    pub fn content_hash(&self, model_name: &str) -> String {
        let mut lines: Vec<String> = self
            .entries
            .iter()
            .map(|e| {
                format!(
                    "{}\x1f{}\x1f{}\x1f{}",
                    e.name, e.description, e.url, e.category
                )
            })
            .collect();
        lines.sort();

        let mut hasher = Sha256::new();
        hasher.update(EMBEDDINGS_VERSION.as_bytes());
        hasher.update(b":");
        hasher.update(model_name.as_bytes());
        hasher.update(b":");
        for line in &lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\x1e");
        }

        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        hex[..16].to_string()
    }
}

/// A ranked search result: one catalog entry with its relevance score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub entry: ServerEntry,
    pub score: f32,
}
