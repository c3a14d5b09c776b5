//! Publisher-built data bundle download.
//!
//! The fastest startup tier: a versioned release location hosts three
//! co-located files — `catalog.json`, `embeddings.bin`, `data_info.json` —
//! built by `scout build-data` and published as a rolling "latest" release.
//! Fetching them spares every client a full aggregation and embedding run.
//!
//! Everything here collapses to [`Precomputed::Unavailable`]: an HTTP
//! failure, a metadata document missing required fields, a schema version
//! this build cannot consume, or an embedding payload that does not line up
//! with the catalog. The caller just moves on to the next fallback tier.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cache::{self, CacheManager};
use crate::config::PrecomputedConfig;
use crate::embedder::EmbeddingMatrix;
use crate::models::{Catalog, ServerEntry};
use crate::schema::{self, SchemaVersion};

/// Metadata descriptor published next to the payloads.
///
/// Deserialization enforces the required fields; a descriptor missing any
/// of them is invalid and the whole bundle is skipped.
#[derive(Debug, Clone, Deserialize)]
pub struct DataInfo {
    pub schema_version: SchemaVersion,
    pub entry_count: usize,
    pub model: String,
    #[allow(dead_code)]
    pub build_timestamp: String,
}

/// Outcome of a bundle load attempt.
#[derive(Debug)]
pub enum Precomputed {
    Loaded {
        catalog: Catalog,
        /// Present only when aligned with the catalog.
        matrix: Option<EmbeddingMatrix>,
        model: String,
    },
    Unavailable,
}

/// Try to load the precomputed bundle.
///
/// On success the catalog (and matrix, when usable) are written into the
/// cache so later tiers and future runs are primed. Never returns an error;
/// every failure is logged and becomes `Unavailable`.
pub async fn load(
    config: &PrecomputedConfig,
    client: &reqwest::Client,
    cache: &CacheManager,
) -> Precomputed {
    if !config.enabled {
        debug!("precomputed data disabled by configuration");
        return Precomputed::Unavailable;
    }

    let info = match fetch_data_info(config, client).await {
        Ok(info) => info,
        Err(e) => {
            debug!(error = %e, "precomputed metadata unavailable");
            return Precomputed::Unavailable;
        }
    };

    if !schema::is_compatible(info.schema_version) {
        info!(
            version = %info.schema_version,
            "precomputed data schema incompatible, falling back to live sources"
        );
        return Precomputed::Unavailable;
    }

    let catalog = match fetch_catalog(config, client, info.schema_version).await {
        Ok(catalog) => catalog,
        Err(e) => {
            debug!(error = %e, "precomputed catalog unavailable");
            return Precomputed::Unavailable;
        }
    };

    if catalog.entries.is_empty() {
        warn!("precomputed catalog contained no valid entries, falling back");
        return Precomputed::Unavailable;
    }

    // The matrix is optional: a misaligned or unreadable payload discards
    // the matrix but keeps the catalog usable for this tier.
    let matrix = match fetch_matrix(config, client).await {
        Ok(matrix) => {
            if matrix.len() == catalog.entry_count() && matrix.len() == info.entry_count {
                Some(matrix)
            } else {
                warn!(
                    rows = matrix.len(),
                    entries = catalog.entry_count(),
                    declared = info.entry_count,
                    "precomputed embeddings misaligned with catalog, discarding matrix"
                );
                None
            }
        }
        Err(e) => {
            debug!(error = %e, "precomputed embeddings unavailable");
            None
        }
    };

    info!(
        entries = catalog.entry_count(),
        schema = %info.schema_version,
        with_matrix = matrix.is_some(),
        "loaded precomputed data bundle"
    );

    // Prime the cache for subsequent tiers and future runs.
    let keyed = matrix
        .as_ref()
        .map(|m| (catalog.content_hash(&info.model), m));
    if let Err(e) = cache::prime(
        cache,
        &catalog,
        keyed.as_ref().map(|(h, m)| (h.as_str(), *m)),
    ) {
        warn!(error = %e, "failed to prime cache with precomputed data");
    }

    Precomputed::Loaded {
        catalog,
        matrix,
        model: info.model,
    }
}

async fn fetch_data_info(
    config: &PrecomputedConfig,
    client: &reqwest::Client,
) -> Result<DataInfo> {
    let url = format!("{}/data_info.json", config.base_url);
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("failed to fetch {}", url))?
        .error_for_status()?;
    let info: DataInfo = response
        .json()
        .await
        .context("invalid precomputed metadata document")?;
    Ok(info)
}

async fn fetch_catalog(
    config: &PrecomputedConfig,
    client: &reqwest::Client,
    schema_version: SchemaVersion,
) -> Result<Catalog> {
    let url = format!("{}/catalog.json", config.base_url);
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("failed to fetch {}", url))?
        .error_for_status()?;

    // Per-row recoverable: one malformed entry must not break the bundle.
    let raw: Vec<serde_json::Value> = response
        .json()
        .await
        .context("precomputed catalog is not a JSON array")?;

    let mut entries = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;
    for value in raw {
        match serde_json::from_value::<ServerEntry>(value) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                skipped += 1;
                debug!(error = %e, "skipping malformed precomputed entry");
            }
        }
    }
    if skipped > 0 {
        warn!(skipped, "skipped malformed precomputed entries");
    }

    Ok(Catalog::new(entries, schema_version))
}

async fn fetch_matrix(
    config: &PrecomputedConfig,
    client: &reqwest::Client,
) -> Result<EmbeddingMatrix> {
    let url = format!("{}/embeddings.bin", config.base_url);
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("failed to fetch {}", url))?
        .error_for_status()?;
    let blob = response.bytes().await?;
    EmbeddingMatrix::from_blob(&blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CachedCatalog, CATALOG_TTL};
    use axum::{routing::get, Router};
    use tempfile::TempDir;

    /// Serve an in-memory bundle on an ephemeral local port. Routes for
    /// absent files are simply not registered, so fetches 404.
    async fn serve_bundle(
        info: Option<serde_json::Value>,
        catalog: Option<serde_json::Value>,
        blob: Option<Vec<u8>>,
    ) -> String {
        let mut app = Router::new();
        if let Some(body) = info {
            let body = body.to_string();
            app = app.route("/data_info.json", get(move || async move { body }));
        }
        if let Some(body) = catalog {
            let body = body.to_string();
            app = app.route("/catalog.json", get(move || async move { body }));
        }
        if let Some(body) = blob {
            app = app.route("/embeddings.bin", get(move || async move { body }));
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn bundle_config(base_url: String) -> PrecomputedConfig {
        PrecomputedConfig {
            enabled: true,
            base_url,
        }
    }

    fn data_info(entry_count: usize, schema: &str) -> serde_json::Value {
        serde_json::json!({
            "schema_version": schema,
            "entry_count": entry_count,
            "model": "all-MiniLM-L6-v2",
            "build_timestamp": "2026-08-01T00:00:00Z",
        })
    }

    fn entry_json(name: &str) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "description": format!("{} description", name),
            "url": format!("https://github.com/example/{}", name),
            "category": "community",
            "source": "official",
        })
    }

    fn matrix_blob(rows: usize) -> Vec<u8> {
        let rows = (0..rows).map(|i| vec![i as f32, 1.0, 0.5]).collect();
        EmbeddingMatrix::from_rows(rows).unwrap().to_blob()
    }

    #[tokio::test]
    async fn disabled_config_is_unavailable_without_network() {
        let tmp = TempDir::new().unwrap();
        let cache = CacheManager::new(tmp.path().to_path_buf());
        let config = PrecomputedConfig {
            enabled: false,
            // Unroutable on purpose: a disabled loader must never fetch.
            base_url: "http://127.0.0.1:1".to_string(),
        };
        let result = load(&config, &reqwest::Client::new(), &cache).await;
        assert!(matches!(result, Precomputed::Unavailable));
    }

    #[tokio::test]
    async fn incompatible_schema_is_unavailable() {
        let base = serve_bundle(
            Some(data_info(1, "9.0")),
            Some(serde_json::json!([entry_json("a")])),
            Some(matrix_blob(1)),
        )
        .await;
        let tmp = TempDir::new().unwrap();
        let cache = CacheManager::new(tmp.path().to_path_buf());

        let result = load(&bundle_config(base), &reqwest::Client::new(), &cache).await;
        assert!(matches!(result, Precomputed::Unavailable));
        // Nothing primed from an unusable bundle.
        assert!(matches!(cache.load_catalog(CATALOG_TTL), CachedCatalog::Miss));
    }

    #[tokio::test]
    async fn malformed_catalog_rows_are_skipped_per_entry() {
        let catalog = serde_json::json!([
            entry_json("good"),
            { "bogus": true },
            entry_json("also-good"),
        ]);
        let base = serve_bundle(Some(data_info(2, "1.0")), Some(catalog), None).await;
        let tmp = TempDir::new().unwrap();
        let cache = CacheManager::new(tmp.path().to_path_buf());

        match load(&bundle_config(base), &reqwest::Client::new(), &cache).await {
            Precomputed::Loaded { catalog, matrix, .. } => {
                assert_eq!(catalog.entry_count(), 2);
                assert_eq!(catalog.entries[0].name, "good");
                assert_eq!(catalog.entries[1].name, "also-good");
                // No embeddings published: catalog-only load.
                assert!(matrix.is_none());
            }
            other => panic!("expected loaded bundle, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_catalog_is_unavailable() {
        let base = serve_bundle(
            Some(data_info(0, "1.0")),
            Some(serde_json::json!([])),
            None,
        )
        .await;
        let tmp = TempDir::new().unwrap();
        let cache = CacheManager::new(tmp.path().to_path_buf());

        let result = load(&bundle_config(base), &reqwest::Client::new(), &cache).await;
        assert!(matches!(result, Precomputed::Unavailable));
    }

    #[tokio::test]
    async fn misaligned_matrix_is_discarded_but_catalog_kept() {
        let catalog = serde_json::json!([entry_json("a"), entry_json("b")]);
        let base = serve_bundle(
            Some(data_info(2, "1.0")),
            Some(catalog),
            Some(matrix_blob(1)),
        )
        .await;
        let tmp = TempDir::new().unwrap();
        let cache = CacheManager::new(tmp.path().to_path_buf());

        match load(&bundle_config(base), &reqwest::Client::new(), &cache).await {
            Precomputed::Loaded { catalog, matrix, .. } => {
                assert_eq!(catalog.entry_count(), 2);
                assert!(matrix.is_none());
            }
            other => panic!("expected loaded bundle, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn aligned_bundle_loads_and_primes_cache() {
        let catalog = serde_json::json!([entry_json("a"), entry_json("b")]);
        let base = serve_bundle(
            Some(data_info(2, "1.0")),
            Some(catalog),
            Some(matrix_blob(2)),
        )
        .await;
        let tmp = TempDir::new().unwrap();
        let cache = CacheManager::new(tmp.path().to_path_buf());

        let loaded = load(&bundle_config(base), &reqwest::Client::new(), &cache).await;
        let (catalog, matrix, model) = match loaded {
            Precomputed::Loaded {
                catalog,
                matrix,
                model,
            } => (catalog, matrix, model),
            other => panic!("expected loaded bundle, got {:?}", other),
        };

        assert_eq!(catalog.entry_count(), 2);
        let matrix = matrix.expect("aligned matrix should be kept");
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.dims(), 3);

        // Cache primed for later tiers and future runs.
        match cache.load_catalog(CATALOG_TTL) {
            CachedCatalog::Fresh(c) => assert_eq!(c.entry_count(), 2),
            other => panic!("expected primed fresh catalog, got {:?}", other),
        }
        assert!(cache.load_matrix(&catalog.content_hash(&model)).is_some());
    }

    #[tokio::test]
    async fn missing_metadata_is_unavailable() {
        let base = serve_bundle(None, Some(serde_json::json!([entry_json("a")])), None).await;
        let tmp = TempDir::new().unwrap();
        let cache = CacheManager::new(tmp.path().to_path_buf());

        let result = load(&bundle_config(base), &reqwest::Client::new(), &cache).await;
        assert!(matches!(result, Precomputed::Unavailable));
    }

    #[test]
    fn data_info_requires_all_fields() {
        let full = serde_json::json!({
            "schema_version": "1.0",
            "entry_count": 42,
            "model": "all-MiniLM-L6-v2",
            "build_timestamp": "2026-08-01T00:00:00Z",
        });
        let info: DataInfo = serde_json::from_value(full).unwrap();
        assert_eq!(info.schema_version, SchemaVersion::new(1, 0));
        assert_eq!(info.entry_count, 42);

        for missing in ["schema_version", "entry_count", "model", "build_timestamp"] {
            let mut partial = serde_json::json!({
                "schema_version": "1.0",
                "entry_count": 42,
                "model": "all-MiniLM-L6-v2",
                "build_timestamp": "2026-08-01T00:00:00Z",
            });
            partial.as_object_mut().unwrap().remove(missing);
            assert!(
                serde_json::from_value::<DataInfo>(partial).is_err(),
                "expected missing {} to be rejected",
                missing
            );
        }
    }

    #[test]
    fn data_info_rejects_malformed_schema_version() {
        let bad = serde_json::json!({
            "schema_version": "not-a-version",
            "entry_count": 1,
            "model": "m",
            "build_timestamp": "t",
        });
        assert!(serde_json::from_value::<DataInfo>(bad).is_err());
    }
}
