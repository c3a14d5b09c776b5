//! On-disk persistence of the catalog and embedding matrices.
//!
//! Layout under the cache root (`$MCP_SCOUT_CACHE_DIR`, then
//! `$XDG_CACHE_HOME/mcp-scout`, then `~/.cache/mcp-scout`):
//!
//! ```text
//! catalog/catalog.json              TTL-governed catalog snapshot
//! embeddings/embeddings_<hash>.bin  content-hash keyed matrices
//! models/                           embedding model files (fastembed)
//! ```
//!
//! The two namespaces have independent invalidation policies: the catalog
//! expires after a fixed TTL (but stays usable as a stale last resort),
//! while matrices are keyed purely by the catalog content hash and never
//! expire. Any read that fails structural validation is a miss; the
//! offending file is deleted rather than propagated.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embedder::EmbeddingMatrix;
use crate::models::{Catalog, ServerEntry};
use crate::schema::{self, SchemaVersion};

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "MCP_SCOUT_CACHE_DIR";

/// Catalog freshness window: three hours.
pub const CATALOG_TTL: Duration = Duration::from_secs(3 * 60 * 60);

/// How many embedding matrices to keep around.
const KEEP_MATRICES: usize = 5;

/// On-disk shape of the catalog snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogRecord {
    schema_version: SchemaVersion,
    created_at: DateTime<Utc>,
    entries: Vec<ServerEntry>,
}

/// Result of a catalog cache read.
#[derive(Debug)]
pub enum CachedCatalog {
    Fresh(Catalog),
    /// Past its TTL; usable only as a last-resort fallback.
    Stale(Catalog),
    Miss,
}

pub struct CacheManager {
    root: PathBuf,
}

impl CacheManager {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve the cache root: explicit config, then the override env var,
    /// then XDG conventions.
    pub fn from_env(configured: Option<&Path>) -> Self {
        if let Some(dir) = configured {
            return Self::new(dir.to_path_buf());
        }
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            if !dir.is_empty() {
                return Self::new(PathBuf::from(dir));
            }
        }
        let base = std::env::var("XDG_CACHE_HOME")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".cache")))
            .unwrap_or_else(|| PathBuf::from(".cache"));
        Self::new(base.join("mcp-scout"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for embedding model files.
    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root.join("catalog").join("catalog.json")
    }

    pub fn matrix_path(&self, content_hash: &str) -> PathBuf {
        self.root
            .join("embeddings")
            .join(format!("embeddings_{}.bin", content_hash))
    }

    // ============ Catalog cache ============

    /// Read the cached catalog, classifying it by age.
    ///
    /// Corruption (unreadable JSON, schema the client cannot consume) is
    /// reported as a miss and the file is removed.
    pub fn load_catalog(&self, ttl: Duration) -> CachedCatalog {
        let path = self.catalog_path();
        if !path.exists() {
            return CachedCatalog::Miss;
        }

        let record: CatalogRecord = match std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str(&text).map_err(anyhow::Error::from))
        {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt catalog cache, discarding");
                let _ = std::fs::remove_file(&path);
                return CachedCatalog::Miss;
            }
        };

        if !schema::is_compatible(record.schema_version) {
            warn!(
                version = %record.schema_version,
                "cached catalog schema not usable by this build, discarding"
            );
            let _ = std::fs::remove_file(&path);
            return CachedCatalog::Miss;
        }

        let age = Utc::now().signed_duration_since(record.created_at);
        let catalog = Catalog {
            entries: record.entries,
            retrieved_at: record.created_at,
            schema_version: record.schema_version,
        };

        if age.to_std().map(|a| a > ttl).unwrap_or(false) {
            debug!(age_secs = age.num_seconds(), "catalog cache is stale");
            CachedCatalog::Stale(catalog)
        } else {
            debug!(
                age_secs = age.num_seconds(),
                entries = catalog.entry_count(),
                "catalog cache hit"
            );
            CachedCatalog::Fresh(catalog)
        }
    }

    /// Persist the catalog snapshot, superseding any previous one.
    pub fn store_catalog(&self, catalog: &Catalog) -> Result<()> {
        let path = self.catalog_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let record = CatalogRecord {
            schema_version: catalog.schema_version,
            created_at: catalog.retrieved_at,
            entries: catalog.entries.clone(),
        };
        let text = serde_json::to_string(&record)?;
        std::fs::write(&path, text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        debug!(entries = catalog.entry_count(), path = %path.display(), "stored catalog cache");
        Ok(())
    }

    // ============ Embedding matrix cache ============

    /// Load the matrix for the given catalog content hash, if present and
    /// structurally valid.
    pub fn load_matrix(&self, content_hash: &str) -> Option<EmbeddingMatrix> {
        let path = self.matrix_path(content_hash);
        if !path.exists() {
            return None;
        }

        match std::fs::read(&path)
            .map_err(anyhow::Error::from)
            .and_then(|blob| EmbeddingMatrix::from_blob(&blob))
        {
            Ok(matrix) => {
                debug!(hash = content_hash, rows = matrix.len(), "embedding cache hit");
                Some(matrix)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt embedding cache, discarding");
                let _ = std::fs::remove_file(&path);
                None
            }
        }
    }

    /// Persist a matrix keyed by content hash, then prune old snapshots.
    pub fn store_matrix(&self, content_hash: &str, matrix: &EmbeddingMatrix) -> Result<()> {
        let path = self.matrix_path(content_hash);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, matrix.to_blob())
            .with_context(|| format!("failed to write {}", path.display()))?;
        debug!(hash = content_hash, rows = matrix.len(), "stored embedding cache");
        self.prune_matrices(KEEP_MATRICES);
        Ok(())
    }

    /// Keep only the most recently modified matrix files.
    fn prune_matrices(&self, keep: usize) {
        let dir = self.root.join("embeddings");
        let Ok(read_dir) = std::fs::read_dir(&dir) else {
            return;
        };

        let mut files: Vec<(PathBuf, std::time::SystemTime)> = read_dir
            .flatten()
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("embeddings_")
            })
            .filter_map(|e| {
                let modified = e.metadata().and_then(|m| m.modified()).ok()?;
                Some((e.path(), modified))
            })
            .collect();

        if files.len() <= keep {
            return;
        }
        files.sort_by_key(|(_, modified)| *modified);
        let excess = files.len() - keep;
        for (path, _) in files.into_iter().take(excess) {
            debug!(path = %path.display(), "pruning old embedding cache file");
            let _ = std::fs::remove_file(path);
        }
    }

    // ============ Introspection ============

    /// Status summary for the `scout info` command.
    pub fn info(&self, ttl: Duration) -> serde_json::Value {
        let path = self.catalog_path();
        let catalog = match std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<CatalogRecord>(&text).ok())
        {
            Some(record) => {
                let age = Utc::now().signed_duration_since(record.created_at);
                serde_json::json!({
                    "exists": true,
                    "path": path.display().to_string(),
                    "entries": record.entries.len(),
                    "age_seconds": age.num_seconds(),
                    "fresh": age.to_std().map(|a| a <= ttl).unwrap_or(true),
                    "schema_version": record.schema_version.to_string(),
                })
            }
            None => serde_json::json!({
                "exists": false,
                "path": path.display().to_string(),
            }),
        };

        let matrices = std::fs::read_dir(self.root.join("embeddings"))
            .map(|d| {
                d.flatten()
                    .filter(|e| e.file_name().to_string_lossy().starts_with("embeddings_"))
                    .count()
            })
            .unwrap_or(0);

        serde_json::json!({
            "root": self.root.display().to_string(),
            "catalog": catalog,
            "embedding_matrices": matrices,
            "ttl_seconds": ttl.as_secs(),
        })
    }
}

/// Convenience for writing a freshly assembled catalog plus its matrix.
pub fn prime(
    cache: &CacheManager,
    catalog: &Catalog,
    matrix: Option<(&str, &EmbeddingMatrix)>,
) -> Result<()> {
    cache.store_catalog(catalog)?;
    if let Some((hash, matrix)) = matrix {
        cache.store_matrix(hash, matrix)?;
    }
    Ok(())
}
